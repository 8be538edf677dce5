//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::{DialogueEvent, StateEvent};
use crate::state::SessionSnapshot;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// The user pressed "talk"
    StartTalk,

    /// The user pressed "stop" while listening
    StopTalk,

    /// The user wants playback to stop
    StopSpeaking,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to state change notifications
    Subscribe,
}

impl Request {
    /// The orchestrator intent carried by this request, if any
    pub fn intent(&self) -> Option<DialogueEvent> {
        match self {
            Request::StartTalk => Some(DialogueEvent::StartTalk),
            Request::StopTalk => Some(DialogueEvent::StopTalk),
            Request::StopSpeaking => Some(DialogueEvent::StopSpeaking),
            Request::GetStatus | Request::Ping | Request::Subscribe => None,
        }
    }
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Intent handed to the orchestrator
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The orchestrator published a state change
    StateChanged { event: StateEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Dialogue session as last published
    pub session: SessionSnapshot,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            session: SessionSnapshot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Mode;

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_string(&Request::StartTalk).unwrap();
        assert_eq!(json, r#"{"type":"start_talk"}"#);

        let req: Request = serde_json::from_str(r#"{"type":"stop_speaking"}"#).unwrap();
        assert!(matches!(req.intent(), Some(DialogueEvent::StopSpeaking)));
        assert!(Request::Ping.intent().is_none());
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("idle"));
    }

    #[test]
    fn test_notification_keeps_event_tag() {
        let notification = Notification::StateChanged {
            event: StateEvent::ModeChanged {
                from: Mode::Idle,
                to: Mode::Listening,
                duration_ms: 3,
            },
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["event"]["type"], "mode_changed");
        assert_eq!(json["event"]["to"], "listening");
    }
}
