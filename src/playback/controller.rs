//! Playback with asset-then-synthesis fallback

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PlaybackFailure;
use crate::platform::{MediaPlayer, SpeechSynthesizer, SpeechUtterance};
use crate::state::Response;

/// Which path produced the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPath {
    Asset,
    Synthesis,
}

/// How a playback ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed(PlaybackPath),
    Cancelled,
    /// Every path failed; nothing was heard
    Failed(PlaybackFailure),
}

/// Resolves once the playback it belongs to has ended
#[derive(Debug)]
pub struct PlaybackCompletion(oneshot::Receiver<PlaybackOutcome>);

impl PlaybackCompletion {
    pub async fn wait(self) -> PlaybackOutcome {
        self.0.await.unwrap_or(PlaybackOutcome::Cancelled)
    }
}

struct ActivePlayback {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Plays responses, one at a time
pub struct PlaybackController {
    player: Arc<dyn MediaPlayer>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    active: Option<ActivePlayback>,
}

impl PlaybackController {
    /// `synthesizer` is `None` on platforms without text-to-speech
    pub fn new(player: Arc<dyn MediaPlayer>, synthesizer: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self {
            player,
            synthesizer,
            active: None,
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|playback| !playback.task.is_finished())
    }

    /// Start playing `response`
    ///
    /// The returned completion always resolves, whether playback finished,
    /// fell back, failed on every path or was cancelled.
    pub fn play(&mut self, response: &Response) -> PlaybackCompletion {
        if let Some(previous) = self.active.take() {
            if !previous.task.is_finished() {
                warn!("playback requested while another is active, cancelling the previous one");
                previous.cancel.cancel();
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let player = Arc::clone(&self.player);
            let synthesizer = self.synthesizer.clone();
            let response = response.clone();
            let cancel = cancel.clone();
            async move {
                let outcome = perform(player, synthesizer, &response, cancel).await;
                match &outcome {
                    PlaybackOutcome::Completed(path) => debug!(?path, "playback completed"),
                    PlaybackOutcome::Cancelled => info!("playback cancelled"),
                    PlaybackOutcome::Failed(e) => warn!(error = %e, "playback produced no audio"),
                }
                let _ = done_tx.send(outcome);
            }
        });

        self.active = Some(ActivePlayback { cancel, task });
        PlaybackCompletion(done_rx)
    }

    /// Halt the active path; its completion resolves as `Cancelled`
    pub fn cancel(&mut self) {
        match self.active.take() {
            Some(playback) => playback.cancel.cancel(),
            None => debug!("no active playback to cancel"),
        }
    }
}

async fn perform(
    player: Arc<dyn MediaPlayer>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    response: &Response,
    cancel: CancellationToken,
) -> PlaybackOutcome {
    if let Some(audio) = response.audio_ref() {
        debug!(%audio, "playing delivered audio");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                player.stop().await;
                return PlaybackOutcome::Cancelled;
            }
            result = player.play(audio) => match result {
                Ok(()) => return PlaybackOutcome::Completed(PlaybackPath::Asset),
                Err(e) => {
                    let failure = PlaybackFailure::Asset(e.to_string());
                    warn!(error = %failure, "falling back to speech synthesis");
                }
            }
        }
    }

    let Some(synthesizer) = synthesizer else {
        return PlaybackOutcome::Failed(PlaybackFailure::Unavailable);
    };

    let utterance = SpeechUtterance::persona(response.text());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            synthesizer.cancel().await;
            PlaybackOutcome::Cancelled
        }
        result = synthesizer.speak(&utterance) => match result {
            Ok(()) => PlaybackOutcome::Completed(PlaybackPath::Synthesis),
            Err(e) => PlaybackOutcome::Failed(PlaybackFailure::Synthesis(e.to_string())),
        }
    }
}
