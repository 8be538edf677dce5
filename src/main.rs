//! shevanta-daemon: Voice-first Marathi dialogue assistant
//!
//! This daemon runs the dialogue loop and provides:
//! - Single-utterance speech capture behind a microphone permission gate
//! - Response resolution against the text-processing backend, with a
//!   keyword fallback when the backend is unavailable
//! - Playback of delivered audio, falling back to speech synthesis
//! - IPC server for UI clients (intents in, state events out)

mod capture;
mod config;
mod error;
mod events;
mod greeting;
mod ipc;
mod lifecycle;
mod permission;
mod platform;
mod playback;
mod resolver;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::CaptureController;
use crate::config::Config;
use crate::events::StateEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::permission::PermissionMonitor;
use crate::platform::{
    CommandPlayer, CommandRecognizer, CommandSynthesizer, DevicePermission, SpeechRecognizer,
    SpeechSynthesizer,
};
use crate::playback::PlaybackController;
use crate::resolver::ResponseResolver;
use crate::state::DialogueOrchestrator;

/// How often the platform permission is re-read
const PERMISSION_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "shevanta-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        backend = %config.backend_url,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    let client = reqwest::Client::builder().build()?;
    let greeting_audio = tokio::time::timeout(
        config.resolve_timeout,
        greeting::prefetch(&client, &config.backend_url, &config.data_dir),
    )
    .await
    .unwrap_or_else(|_| {
        warn!("greeting download timed out, will synthesize");
        None
    });
    let greeting = greeting::greeting_response(greeting_audio);

    // Microphone permission, polled so platform-side changes are noticed
    let permission = PermissionMonitor::new(Arc::new(DevicePermission::new(&config.capture_device)));
    let initial = permission.refresh().await;
    info!(permission = %initial, "microphone permission");
    let permission_poll = permission.watch(PERMISSION_POLL_INTERVAL);

    let recognizer = config.recognizer.as_ref().map(|command| {
        Arc::new(CommandRecognizer::new(&command.program, command.args.clone()))
            as Arc<dyn SpeechRecognizer>
    });
    if recognizer.is_none() {
        warn!("no speech recognizer configured, capture is unsupported");
    }
    let synthesizer: Arc<dyn SpeechSynthesizer> =
        Arc::new(CommandSynthesizer::new(&config.synthesizer));
    let player = Arc::new(CommandPlayer::new(&config.player.program, config.player.args.clone()));

    // Create channels for inter-component communication
    // Intents, capture and task results -> orchestrator
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    // Orchestrator -> IPC server and subscribers
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);

    let resolver = Arc::new(ResponseResolver::new(
        client,
        config.backend_url.clone(),
        config.resolve_timeout,
    )?);

    let mut orchestrator = DialogueOrchestrator::new(
        permission,
        CaptureController::new(recognizer, inbox_tx.clone()),
        resolver,
        PlaybackController::new(player, Some(synthesizer)),
        greeting,
        inbox_tx.clone(),
        event_tx.clone(),
    );

    // Create IPC server
    let server = Server::new(
        &config.socket_path,
        inbox_tx,
        event_tx.clone(),
        orchestrator.snapshot(),
    )?;

    // Subscribe to state events for IPC status updates
    let mut ipc_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the dialogue loop (processes intents and task results)
        _ = orchestrator.run(inbox_rx) => {
            info!("dialogue loop exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the served status in step with published state
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "state event");
                        server_for_events.apply(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("state event handler exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to install signal handlers"),
            }
        }
    }

    // Cleanup
    info!(mode = %orchestrator.mode(), "shutting down...");

    permission_poll.abort();
    server.shutdown().await;

    info!("shevanta-daemon stopped");

    Ok(())
}
