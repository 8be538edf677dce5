//! In-memory capability providers for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::PlatformError;
use crate::state::{AudioRef, PermissionState};

use super::{
    CaptureStream, MediaPlayer, PermissionProvider, RecognitionError, RecognitionOptions,
    SpeechRecognizer, SpeechSynthesizer, SpeechUtterance,
};

/// What the scripted recognizer does for one session
#[derive(Debug, Clone)]
pub enum Script {
    Reply(Result<Option<String>, RecognitionError>),
    /// Hear nothing until stopped
    UntilStopped,
}

#[derive(Default)]
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn hearing(text: &str) -> Arc<Self> {
        Self::new([Script::Reply(Ok(Some(text.to_string())))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        _options: &RecognitionOptions,
        stop: CancellationToken,
    ) -> Result<Option<String>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Reply(reply)) => reply,
            Some(Script::UntilStopped) | None => {
                stop.cancelled().await;
                Ok(None)
            }
        }
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<SpeechUtterance>>,
    fail: AtomicBool,
    hang: AtomicBool,
    cancels: AtomicUsize,
    halt: Notify,
}

impl RecordingSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let synthesizer = Self::default();
        synthesizer.fail.store(true, Ordering::SeqCst);
        Arc::new(synthesizer)
    }

    /// Keep speaking until cancelled
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn utterances(&self) -> Vec<SpeechUtterance> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn speak(&self, utterance: &SpeechUtterance) -> Result<(), PlatformError> {
        let halted = self.halt.notified();
        self.spoken.lock().unwrap().push(utterance.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::Exited("synthesis error".to_string()));
        }
        if self.hang.load(Ordering::SeqCst) {
            halted.await;
        }
        Ok(())
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.halt.notify_waiters();
    }
}

/// Media player that records what it was asked to play
#[derive(Default)]
pub struct RecordingPlayer {
    played: Mutex<Vec<AudioRef>>,
    fail: AtomicBool,
    hang: AtomicBool,
    stops: AtomicUsize,
    halt: Notify,
}

impl RecordingPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let player = Self::default();
        player.fail.store(true, Ordering::SeqCst);
        Arc::new(player)
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.as_str().to_string())
            .collect()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPlayer for RecordingPlayer {
    async fn play(&self, source: &AudioRef) -> Result<(), PlatformError> {
        let halted = self.halt.notified();
        self.played.lock().unwrap().push(source.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::Exited("decode error".to_string()));
        }
        if self.hang.load(Ordering::SeqCst) {
            halted.await;
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.halt.notify_waiters();
    }
}

/// Permission provider with a fixed platform answer
pub struct FakePermission {
    reported: Mutex<Result<PermissionState, String>>,
    grants: AtomicBool,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl FakePermission {
    pub fn new(reported: PermissionState, grants: bool) -> Arc<Self> {
        Arc::new(Self {
            reported: Mutex::new(Ok(reported)),
            grants: AtomicBool::new(grants),
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// A platform without a permission query
    pub fn unsupported(grants: bool) -> Arc<Self> {
        let provider = Self::new(PermissionState::Unknown, grants);
        *provider.reported.lock().unwrap() = Err("permission api missing".to_string());
        provider
    }

    pub fn report(&self, state: PermissionState) {
        *self.reported.lock().unwrap() = Ok(state);
    }

    pub fn set_grants(&self, grants: bool) {
        self.grants.store(grants, Ordering::SeqCst);
    }

    /// Capture streams attempted
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct FakeStream(Arc<AtomicUsize>);

impl CaptureStream for FakeStream {
    fn release(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionProvider for FakePermission {
    async fn query(&self) -> Result<PermissionState, PlatformError> {
        self.reported
            .lock()
            .unwrap()
            .clone()
            .map_err(PlatformError::Unavailable)
    }

    async fn open_capture(&self) -> Result<Box<dyn CaptureStream>, PlatformError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.grants.load(Ordering::SeqCst) {
            Ok(Box::new(FakeStream(Arc::clone(&self.released))))
        } else {
            Err(PlatformError::Denied("user dismissed the prompt".to_string()))
        }
    }
}
