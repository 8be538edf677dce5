//! Response playback
//!
//! Plays the delivered audio asset when there is one and falls back to
//! speech synthesis of the response text.

mod controller;

pub use controller::{PlaybackController, PlaybackOutcome};
