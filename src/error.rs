//! Error taxonomy for the dialogue loop
//!
//! Only [`DialogueError`] ever reaches the user. Resolution and playback
//! failures are absorbed by their fallback paths and only show up in logs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a capture session could not produce an utterance
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CaptureFailure {
    /// The session ended without any recognized speech
    #[error("no speech detected")]
    NoSpeech,

    /// A previous session is still winding down
    #[error("a capture session is already active")]
    AlreadyActive,

    /// The recognizer reported a generic failure
    #[error("recognition failed: {0}")]
    Failed(String),
}

/// User-visible errors surfaced by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DialogueError {
    /// Microphone access was denied or is unavailable
    #[error("microphone permission denied")]
    Permission,

    /// The platform offers no speech recognition
    #[error("speech recognition is not supported")]
    CaptureUnsupported,

    /// Capture ran but produced no utterance
    #[error("capture error: {0}")]
    Capture(CaptureFailure),
}

impl DialogueError {
    /// Text shown to the user for this error
    pub fn user_message(&self) -> &'static str {
        match self {
            DialogueError::Permission => {
                "माइक्रोफोनची परवानगी नाकारली गेली. कृपया सेटिंग्जमध्ये माइक्रोफोनची परवानगी द्या."
            }
            DialogueError::CaptureUnsupported => "आवाज ओळखण्याचे समर्थन उपलब्ध नाही.",
            DialogueError::Capture(CaptureFailure::NoSpeech) => {
                "कोणताही आवाज ऐकू आला नाही. कृपया पुन्हा प्रयत्न करा."
            }
            DialogueError::Capture(CaptureFailure::AlreadyActive) => {
                "आवाज ओळखणे सुरू करण्यात समस्या आली."
            }
            DialogueError::Capture(CaptureFailure::Failed(_)) => {
                "आवाज ओळखण्यात समस्या आली. कृपया पुन्हा प्रयत्न करा."
            }
        }
    }
}

/// Remote resolution failed; recovered with a local reply
#[derive(Debug, Error)]
pub enum ResolutionFailure {
    /// Connection refused, DNS failure, reset, ...
    #[error("backend unreachable: {0}")]
    Transport(String),

    /// No answer within the configured bound
    #[error("backend timed out")]
    Timeout,

    /// Non-2xx status
    #[error("backend returned status {0}")]
    Status(u16),

    /// Body was not a valid reply payload
    #[error("malformed backend reply: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ResolutionFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ResolutionFailure::Timeout
        } else {
            ResolutionFailure::Transport(e.to_string())
        }
    }
}

/// Playback path failed; the asset path recovers through synthesis
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackFailure {
    /// Delivered audio could not be loaded or played
    #[error("audio asset unplayable: {0}")]
    Asset(String),

    /// Speech synthesis reported an error
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// No synthesis capability on this platform
    #[error("speech synthesis unavailable")]
    Unavailable,
}

/// Failures reported by platform capability providers
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("access denied: {0}")]
    Denied(String),

    #[error("process exited with {0}")]
    Exited(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
