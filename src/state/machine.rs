//! Dialogue orchestrator
//!
//! Sequences capture, resolution and playback through the modes Idle,
//! Listening, Processing and Speaking. It is the only writer of the
//! [`Session`]; everything it learns arrives through one ordered inbox and
//! every change it makes is published as a [`StateEvent`].

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureController, CaptureStartError};
use crate::error::{CaptureFailure, DialogueError};
use crate::events::{CaptureEvent, DialogueEvent, EventSink, StateEvent};
use crate::permission::PermissionMonitor;
use crate::playback::{PlaybackController, PlaybackOutcome};
use crate::resolver::ResponseResolver;

use super::session::{Mode, PermissionState, Response, Session, SessionSnapshot, Utterance};

/// The coordinating state machine of the dialogue loop
pub struct DialogueOrchestrator {
    session: Session,
    permission: PermissionMonitor,
    capture: CaptureController,
    resolver: Arc<ResponseResolver>,
    playback: PlaybackController,
    greeting: Response,
    /// Set once the startup greeting has been played
    greeted: bool,
    /// An access request is in flight
    access_pending: bool,
    /// Capture session whose events are current
    capture_session: Option<u64>,
    /// Resolution turn the orchestrator is waiting for
    pending_turn: Option<u64>,
    /// Playback whose completion is awaited
    active_playback: Option<u64>,
    next_id: u64,
    mode_entered_at: Instant,
    events: EventSink,
    state_tx: broadcast::Sender<StateEvent>,
}

impl DialogueOrchestrator {
    /// Create an orchestrator in Idle
    ///
    /// `events` must feed the receiver later handed to [`Self::run`].
    pub fn new(
        permission: PermissionMonitor,
        capture: CaptureController,
        resolver: Arc<ResponseResolver>,
        playback: PlaybackController,
        greeting: Response,
        events: EventSink,
        state_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            session: Session::new(permission.query()),
            permission,
            capture,
            resolver,
            playback,
            greeting,
            greeted: false,
            access_pending: false,
            capture_session: None,
            pending_turn: None,
            active_playback: None,
            next_id: 0,
            mode_entered_at: Instant::now(),
            events,
            state_tx,
        }
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Run the dialogue loop for the lifetime of the process
    pub async fn run(&mut self, mut inbox: mpsc::UnboundedReceiver<DialogueEvent>) {
        let events = self.events.clone();
        let watcher = self.permission.subscribe(move |state| {
            let _ = events.send(DialogueEvent::PermissionChanged(state));
        });

        info!(permission = %self.session.permission, "dialogue loop started in Idle");
        self.start();

        while let Some(event) = inbox.recv().await {
            self.handle(event);
        }

        watcher.abort();
        info!("dialogue loop stopped");
    }

    /// First entry into Idle after process start
    pub fn start(&mut self) {
        self.on_idle_entered();
    }

    /// Apply one event from the inbox
    pub fn handle(&mut self, event: DialogueEvent) {
        debug!(mode = %self.session.mode, ?event, "handling event");
        match event {
            DialogueEvent::StartTalk => self.start_talk(),
            DialogueEvent::StopTalk => self.stop_talk(),
            DialogueEvent::StopSpeaking => self.stop_speaking(),
            DialogueEvent::Capture { session, event } => self.handle_capture(session, event),
            DialogueEvent::AccessResolved(state) => self.handle_access(state),
            DialogueEvent::PermissionChanged(state) => self.update_permission(state),
            DialogueEvent::Resolved { turn, response } => self.handle_resolved(turn, response),
            DialogueEvent::PlaybackFinished { playback, outcome } => {
                self.handle_playback_finished(playback, outcome)
            }
        }
    }

    fn start_talk(&mut self) {
        if self.session.mode != Mode::Idle {
            debug!(mode = %self.session.mode, "start-talk ignored outside Idle");
            return;
        }
        if !self.capture.is_supported() {
            self.surface(DialogueError::CaptureUnsupported);
            return;
        }
        if self.session.permission != PermissionState::Granted {
            self.request_access();
            return;
        }
        self.begin_capture();
    }

    fn request_access(&mut self) {
        if self.access_pending {
            debug!("access request already in flight");
            return;
        }
        info!(permission = %self.session.permission, "requesting microphone access");
        self.access_pending = true;

        let monitor = self.permission.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let state = monitor.request_access().await;
            let _ = events.send(DialogueEvent::AccessResolved(state));
        });
    }

    fn handle_access(&mut self, state: PermissionState) {
        self.access_pending = false;
        self.update_permission(state);

        if state != PermissionState::Granted {
            self.surface(DialogueError::Permission);
            return;
        }
        if self.session.mode == Mode::Idle {
            self.begin_capture();
        }
    }

    fn begin_capture(&mut self) {
        match self.capture.start() {
            Ok(session) => {
                self.capture_session = Some(session);
                self.clear_error();
                if self.session.last_transcript.take().is_some() {
                    self.publish(StateEvent::TranscriptUpdated { text: None });
                }
                self.transition_to(Mode::Listening);
            }
            Err(CaptureStartError::Unsupported) => self.surface(DialogueError::CaptureUnsupported),
            Err(CaptureStartError::AlreadyActive) => {
                self.surface(DialogueError::Capture(CaptureFailure::AlreadyActive))
            }
        }
    }

    fn stop_talk(&mut self) {
        if self.session.mode != Mode::Listening {
            debug!(mode = %self.session.mode, "stop-talk ignored outside Listening");
            return;
        }
        self.capture.stop();
        // The trailing terminal event of this session is dropped as stale
        self.capture_session = None;
        self.transition_to(Mode::Idle);
    }

    fn stop_speaking(&mut self) {
        if self.session.mode != Mode::Speaking {
            debug!(mode = %self.session.mode, "stop-speaking ignored outside Speaking");
            return;
        }
        self.playback.cancel();
        self.active_playback = None;
        self.transition_to(Mode::Idle);
    }

    fn handle_capture(&mut self, session: u64, event: CaptureEvent) {
        if self.capture_session != Some(session) {
            if event.is_terminal() {
                info!(session, ?event, "dropping result of a stopped capture session");
            } else {
                debug!(session, ?event, "dropping event from stale capture session");
            }
            return;
        }

        match event {
            CaptureEvent::Started => debug!(session, "capture started"),
            CaptureEvent::Recognized(text) => self.handle_recognized(text),
            CaptureEvent::NoSpeech => {
                self.end_listening(DialogueError::Capture(CaptureFailure::NoSpeech))
            }
            CaptureEvent::PermissionDenied => self.end_listening(DialogueError::Permission),
            CaptureEvent::Failed(reason) => {
                self.end_listening(DialogueError::Capture(CaptureFailure::Failed(reason)))
            }
            CaptureEvent::Ended => {
                self.capture_session = None;
                if self.session.mode == Mode::Listening {
                    warn!(session, "capture ended without a result");
                    self.transition_to(Mode::Idle);
                }
            }
        }
    }

    fn handle_recognized(&mut self, text: String) {
        if self.session.mode != Mode::Listening {
            debug!(mode = %self.session.mode, "recognition result outside Listening ignored");
            return;
        }

        let utterance = Utterance::new(text);
        info!(transcript = %utterance.text, "speech recognized");
        self.session.last_transcript = Some(utterance.clone());
        self.publish(StateEvent::TranscriptUpdated {
            text: Some(utterance.text.clone()),
        });

        let turn = self.next_id();
        self.pending_turn = Some(turn);
        self.transition_to(Mode::Processing);

        let resolver = Arc::clone(&self.resolver);
        let events = self.events.clone();
        tokio::spawn(async move {
            let response = resolver.resolve(&utterance).await;
            let _ = events.send(DialogueEvent::Resolved { turn, response });
        });
    }

    fn end_listening(&mut self, error: DialogueError) {
        if self.session.mode != Mode::Listening {
            return;
        }
        self.surface(error);
        self.transition_to(Mode::Idle);
    }

    fn handle_resolved(&mut self, turn: u64, response: Response) {
        if self.session.mode != Mode::Processing || self.pending_turn != Some(turn) {
            debug!(turn, "dropping stale resolution");
            return;
        }
        self.pending_turn = None;
        self.speak(response);
    }

    fn handle_playback_finished(&mut self, playback: u64, outcome: PlaybackOutcome) {
        if self.active_playback != Some(playback) {
            debug!(playback, ?outcome, "dropping stale playback completion");
            return;
        }
        self.active_playback = None;
        debug!(playback, ?outcome, "playback finished");
        if self.session.mode == Mode::Speaking {
            self.transition_to(Mode::Idle);
        }
    }

    /// Publish `response` and play it, moving to Speaking
    fn speak(&mut self, response: Response) {
        self.session.last_response = Some(response.clone());
        self.publish(StateEvent::ResponseUpdated {
            response: response.clone(),
        });

        let playback = self.next_id();
        self.active_playback = Some(playback);
        info!(
            playback,
            origin = ?response.origin(),
            has_audio = response.audio_ref().is_some(),
            "speaking response"
        );
        self.transition_to(Mode::Speaking);

        let completion = self.playback.play(&response);
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = completion.wait().await;
            let _ = events.send(DialogueEvent::PlaybackFinished { playback, outcome });
        });
    }

    fn on_idle_entered(&mut self) {
        if self.greeted {
            return;
        }
        self.greeted = true;
        info!("playing startup greeting");
        let greeting = self.greeting.clone();
        self.speak(greeting);
    }

    fn update_permission(&mut self, state: PermissionState) {
        if self.session.permission == state {
            return;
        }
        info!(from = %self.session.permission, to = %state, "permission updated");
        self.session.permission = state;
        self.publish(StateEvent::PermissionChanged { state });
    }

    fn surface(&mut self, error: DialogueError) {
        warn!(%error, "surfacing error");
        let message = error.user_message().to_string();
        self.session.last_error = Some(error.clone());
        self.publish(StateEvent::ErrorRaised { error, message });
    }

    fn clear_error(&mut self) {
        if self.session.last_error.take().is_some() {
            self.publish(StateEvent::ErrorCleared);
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Perform a mode transition along a valid edge
    fn transition_to(&mut self, new_mode: Mode) {
        let old_mode = self.session.mode;
        if !old_mode.can_transition_to(new_mode) {
            error!(from = %old_mode, to = %new_mode, "refusing invalid transition");
            return;
        }

        let duration_ms = self.mode_entered_at.elapsed().as_millis() as u64;
        info!(
            from = %old_mode,
            to = %new_mode,
            duration_ms = duration_ms,
            "mode transition"
        );

        self.session.mode = new_mode;
        self.mode_entered_at = Instant::now();
        self.publish(StateEvent::ModeChanged {
            from: old_mode,
            to: new_mode,
            duration_ms,
        });

        if new_mode == Mode::Idle {
            self.on_idle_entered();
        }
    }

    fn publish(&self, event: StateEvent) {
        debug!(%event, "publishing state event");
        let _ = self.state_tx.send(event);
    }
}
