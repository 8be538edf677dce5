//! Single-utterance speech capture
//!
//! Wraps the platform recognizer in sessions that report
//! `Started`, exactly one terminal event, then `Ended`.

mod controller;

pub use controller::{CaptureController, CaptureStartError};
