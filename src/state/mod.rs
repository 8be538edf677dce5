//! Dialogue state
//!
//! The session data model and the orchestrator that owns it. The
//! orchestrator moves between four modes:
//! - Idle: resting, waiting for the user
//! - Listening: one capture session is open
//! - Processing: waiting for the resolver
//! - Speaking: a response is playing

mod machine;
mod session;

pub use machine::DialogueOrchestrator;
pub use session::{
    AudioRef, Mode, Origin, PermissionState, Response, SessionSnapshot, Utterance,
};
