//! Capture session lifecycle

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::{CaptureEvent, DialogueEvent, EventSink};
use crate::platform::{RecognitionError, RecognitionOptions, SpeechRecognizer};

/// Why a capture session could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureStartError {
    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("speech recognition is not supported on this platform")]
    Unsupported,
}

struct ActiveSession {
    id: u64,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Opens at most one recognition session at a time
///
/// Session events go to the orchestrator inbox tagged with the session id
/// returned by [`CaptureController::start`].
pub struct CaptureController {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    options: RecognitionOptions,
    events: EventSink,
    next_session: u64,
    active: Option<ActiveSession>,
}

impl CaptureController {
    /// `recognizer` is `None` on platforms without speech recognition
    pub fn new(recognizer: Option<Arc<dyn SpeechRecognizer>>, events: EventSink) -> Self {
        Self {
            recognizer,
            options: RecognitionOptions::default(),
            events,
            next_session: 0,
            active: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Whether a session is open and has not emitted `Ended` yet
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// Open a new session and return its id
    pub fn start(&mut self) -> Result<u64, CaptureStartError> {
        if self.is_active() {
            return Err(CaptureStartError::AlreadyActive);
        }
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(CaptureStartError::Unsupported)?;

        self.next_session += 1;
        let id = self.next_session;
        let stop = CancellationToken::new();
        let task = tokio::spawn(run_session(
            id,
            Arc::clone(recognizer),
            self.options.clone(),
            stop.clone(),
            self.events.clone(),
        ));

        info!(session = id, lang = self.options.lang, "capture session opened");
        self.active = Some(ActiveSession { id, stop, task });
        Ok(id)
    }

    /// Ask the open session to finish
    ///
    /// The session still reports a terminal event, usually `NoSpeech`.
    pub fn stop(&mut self) {
        match &self.active {
            Some(session) if !session.task.is_finished() => {
                debug!(session = session.id, "stopping capture session");
                session.stop.cancel();
            }
            _ => debug!("no active capture session to stop"),
        }
    }
}

async fn run_session(
    id: u64,
    recognizer: Arc<dyn SpeechRecognizer>,
    options: RecognitionOptions,
    stop: CancellationToken,
    events: EventSink,
) {
    let emit = |event: CaptureEvent| {
        let _ = events.send(DialogueEvent::Capture { session: id, event });
    };

    emit(CaptureEvent::Started);

    let terminal = match recognizer.recognize(&options, stop).await {
        Ok(Some(text)) if !text.trim().is_empty() => CaptureEvent::Recognized(text),
        Ok(_) | Err(RecognitionError::NoSpeech) => CaptureEvent::NoSpeech,
        Err(RecognitionError::NotAllowed) => CaptureEvent::PermissionDenied,
        Err(RecognitionError::Failed(reason)) => CaptureEvent::Failed(reason),
    };
    debug!(session = id, event = ?terminal, "capture session settled");

    emit(terminal);
    emit(CaptureEvent::Ended);
}
