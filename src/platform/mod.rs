//! Platform capability contracts
//!
//! Recognition, synthesis, media playback and microphone permission are
//! provided by the host. The controllers only talk to these traits; the
//! daemon plugs in the command and device backed providers below.

mod command;
mod device;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::PlatformError;
use crate::state::{AudioRef, PermissionState};

pub use command::{CommandPlayer, CommandRecognizer, CommandSynthesizer};
pub use device::DevicePermission;

/// Recognition settings for a single-utterance session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub lang: &'static str,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            lang: "mr-IN",
            continuous: false,
            interim_results: false,
        }
    }
}

/// Terminal failures of a recognition session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    #[error("microphone access not allowed")]
    NotAllowed,

    #[error("no speech detected")]
    NoSpeech,

    #[error("{0}")]
    Failed(String),
}

/// Single-utterance speech recognition
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen for one utterance.
    ///
    /// When `stop` is cancelled the recognizer finishes gracefully and
    /// returns whatever it has, `Ok(None)` if nothing was heard.
    async fn recognize(
        &self,
        options: &RecognitionOptions,
        stop: CancellationToken,
    ) -> Result<Option<String>, RecognitionError>;
}

/// One utterance queued for synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechUtterance {
    pub text: String,
    pub lang: &'static str,
    /// 0.0 to 2.0, 1.0 is the voice's normal pitch
    pub pitch: f32,
    /// 1.0 is normal speed
    pub rate: f32,
    /// 0.0 to 1.0
    pub volume: f32,
}

impl SpeechUtterance {
    /// The assistant's persona voice: higher pitch, slightly slower
    pub fn persona(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: "mr-IN",
            pitch: 1.5,
            rate: 0.9,
            volume: 1.0,
        }
    }
}

/// Text-to-speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak until done; resolves early with `Ok` if cancelled
    async fn speak(&self, utterance: &SpeechUtterance) -> Result<(), PlatformError>;

    /// Drop whatever is queued or speaking
    async fn cancel(&self);
}

/// Media-element style audio playback
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Load and play `source` to the end
    async fn play(&self, source: &AudioRef) -> Result<(), PlatformError>;

    /// Halt the current playback
    async fn stop(&self);
}

/// An acquired capture stream
pub trait CaptureStream: Send {
    fn release(self: Box<Self>);
}

/// Microphone permission query and acquisition
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Current permission as seen by the platform
    async fn query(&self) -> Result<PermissionState, PlatformError>;

    /// Try to open a capture stream
    async fn open_capture(&self) -> Result<Box<dyn CaptureStream>, PlatformError>;
}
