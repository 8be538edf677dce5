//! Events flowing into and out of the orchestrator
//!
//! [`DialogueEvent`]s are the orchestrator's single ordered inbox: user
//! intents, capture session events, access results, resolver and playback
//! completions. [`StateEvent`]s are what it publishes after every change to
//! the session.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::DialogueError;
use crate::playback::PlaybackOutcome;
use crate::state::{Mode, PermissionState, Response};

/// Sending half of the orchestrator inbox
pub type EventSink = mpsc::UnboundedSender<DialogueEvent>;

/// Events emitted by a single capture session, in this order:
/// `Started`, one terminal event, `Ended`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started,
    Recognized(String),
    NoSpeech,
    PermissionDenied,
    Failed(String),
    Ended,
}

impl CaptureEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureEvent::Recognized(_)
                | CaptureEvent::NoSpeech
                | CaptureEvent::PermissionDenied
                | CaptureEvent::Failed(_)
        )
    }
}

/// Everything the orchestrator reacts to
#[derive(Debug, Clone)]
pub enum DialogueEvent {
    /// User wants to talk
    StartTalk,
    /// User is done talking
    StopTalk,
    /// User wants playback to stop
    StopSpeaking,
    /// An event from capture session `session`
    Capture { session: u64, event: CaptureEvent },
    /// An explicit access request settled
    AccessResolved(PermissionState),
    /// The platform reported a permission change
    PermissionChanged(PermissionState),
    /// The resolver settled for turn `turn`
    Resolved { turn: u64, response: Response },
    /// Playback `playback` finished, failed or was cancelled
    PlaybackFinished { playback: u64, outcome: PlaybackOutcome },
}

/// Published by the orchestrator on every session change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    ModeChanged {
        from: Mode,
        to: Mode,
        /// Time spent in `from`, in milliseconds
        duration_ms: u64,
    },
    TranscriptUpdated {
        text: Option<String>,
    },
    ResponseUpdated {
        response: Response,
    },
    ErrorRaised {
        error: DialogueError,
        message: String,
    },
    ErrorCleared,
    PermissionChanged {
        state: PermissionState,
    },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::ModeChanged { from, to, duration_ms } => {
                write!(f, "MODE_CHANGED {} -> {} ({}ms)", from, to, duration_ms)
            }
            StateEvent::TranscriptUpdated { .. } => write!(f, "TRANSCRIPT_UPDATED"),
            StateEvent::ResponseUpdated { .. } => write!(f, "RESPONSE_UPDATED"),
            StateEvent::ErrorRaised { error, .. } => write!(f, "ERROR_RAISED ({})", error),
            StateEvent::ErrorCleared => write!(f, "ERROR_CLEARED"),
            StateEvent::PermissionChanged { state } => {
                write!(f, "PERMISSION_CHANGED ({})", state)
            }
        }
    }
}
