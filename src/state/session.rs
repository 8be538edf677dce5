//! Session data owned by the orchestrator
//!
//! The value types here (utterances, responses, permission and mode) are
//! shared with every component, but only the orchestrator mutates a
//! [`Session`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DialogueError;
use crate::events::StateEvent;

/// The four mutually exclusive modes of the dialogue loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Resting state, waiting for the user
    #[default]
    Idle,
    /// A capture session is open
    Listening,
    /// Waiting for the resolver to settle
    Processing,
    /// A response is being played back
    Speaking,
}

impl Mode {
    /// Whether `self -> next` is an edge of the dialogue state machine
    pub fn can_transition_to(self, next: Mode) -> bool {
        matches!(
            (self, next),
            (Mode::Idle, Mode::Listening)
                | (Mode::Idle, Mode::Speaking)
                | (Mode::Listening, Mode::Processing)
                | (Mode::Listening, Mode::Idle)
                | (Mode::Processing, Mode::Speaking)
                | (Mode::Speaking, Mode::Idle)
        )
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => write!(f, "Idle"),
            Mode::Listening => write!(f, "Listening"),
            Mode::Processing => write!(f, "Processing"),
            Mode::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Microphone permission as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Prompt,
    Granted,
    Denied,
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Prompt => write!(f, "prompt"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Denied => write!(f, "denied"),
        }
    }
}

/// One completed speech-to-text result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Handle to a playable audio resource: a URL or a local file path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(String);

impl AudioRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AudioRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Backend,
    Fallback,
}

/// A reply ready for playback. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResponseFields")]
pub struct Response {
    text: String,
    audio_ref: Option<AudioRef>,
    origin: Origin,
}

/// Wire form of [`Response`], checked before it becomes one
#[derive(Deserialize)]
struct ResponseFields {
    text: String,
    audio_ref: Option<AudioRef>,
    origin: Origin,
}

impl TryFrom<ResponseFields> for Response {
    type Error = &'static str;

    fn try_from(fields: ResponseFields) -> Result<Self, Self::Error> {
        if fields.text.trim().is_empty() {
            return Err("response text must not be empty");
        }
        Ok(Self {
            text: fields.text,
            audio_ref: fields.audio_ref,
            origin: fields.origin,
        })
    }
}

impl Response {
    /// Build a response from text the caller has already checked is non-empty
    pub(crate) fn from_parts(text: String, audio_ref: Option<AudioRef>, origin: Origin) -> Self {
        debug_assert!(!text.trim().is_empty(), "response text must not be empty");
        Self {
            text,
            audio_ref,
            origin,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn audio_ref(&self) -> Option<&AudioRef> {
        self.audio_ref.as_ref()
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }
}

/// Process-wide dialogue state
#[derive(Debug, Default)]
pub struct Session {
    pub mode: Mode,
    pub last_transcript: Option<Utterance>,
    pub last_response: Option<Response>,
    pub last_error: Option<DialogueError>,
    pub permission: PermissionState,
}

impl Session {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode,
            last_transcript: self.last_transcript.as_ref().map(|u| u.text.clone()),
            last_response: self.last_response.clone(),
            last_error: self.last_error.as_ref().map(ErrorView::from),
            permission: self.permission,
        }
    }
}

/// A surfaced error together with its user-facing text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorView {
    pub error: DialogueError,
    pub message: String,
}

impl From<&DialogueError> for ErrorView {
    fn from(error: &DialogueError) -> Self {
        Self {
            error: error.clone(),
            message: error.user_message().to_string(),
        }
    }
}

/// Serializable view of a [`Session`] for the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub last_transcript: Option<String>,
    pub last_response: Option<Response>,
    pub last_error: Option<ErrorView>,
    pub permission: PermissionState,
}

impl SessionSnapshot {
    /// Fold a published state event into this view
    pub fn apply(&mut self, event: &StateEvent) {
        match event {
            StateEvent::ModeChanged { to, .. } => self.mode = *to,
            StateEvent::TranscriptUpdated { text } => self.last_transcript = text.clone(),
            StateEvent::ResponseUpdated { response } => {
                self.last_response = Some(response.clone());
            }
            StateEvent::ErrorRaised { error, message } => {
                self.last_error = Some(ErrorView {
                    error: error.clone(),
                    message: message.clone(),
                });
            }
            StateEvent::ErrorCleared => self.last_error = None,
            StateEvent::PermissionChanged { state } => self.permission = *state,
        }
    }
}
