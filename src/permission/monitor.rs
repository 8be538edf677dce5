//! Cached permission state with change notification

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::platform::PermissionProvider;
use crate::state::PermissionState;

/// Watches microphone permission for the orchestrator
///
/// Cloning is cheap; all clones share one cached state.
#[derive(Clone)]
pub struct PermissionMonitor {
    provider: Arc<dyn PermissionProvider>,
    state: Arc<watch::Sender<PermissionState>>,
}

impl PermissionMonitor {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        let (state, _) = watch::channel(PermissionState::Unknown);
        Self {
            provider,
            state: Arc::new(state),
        }
    }

    /// Last known state, `Unknown` until the platform has answered
    pub fn query(&self) -> PermissionState {
        *self.state.borrow()
    }

    /// Ask the platform for the current state and cache it
    ///
    /// A cached `Denied` is only lifted by [`Self::request_access`]; a
    /// platform report of `Granted` alone leaves it in place.
    pub async fn refresh(&self) -> PermissionState {
        match self.provider.query().await {
            Ok(PermissionState::Granted) if self.query() == PermissionState::Denied => {
                debug!("platform reports granted, keeping denied until access is requested");
            }
            Ok(state) => {
                self.record(state);
            }
            Err(e) => debug!(error = %e, "permission query not available"),
        }
        self.query()
    }

    /// Call `handler` on every change of the cached state
    ///
    /// Reporting the same state twice does not notify again.
    pub fn subscribe<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(PermissionState) + Send + 'static,
    {
        let mut changes = self.state.subscribe();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let state = *changes.borrow_and_update();
                handler(state);
            }
        })
    }

    /// Acquire a capture stream and release it right away
    ///
    /// Denial is an answer, not an error: this always resolves to
    /// `Granted` or `Denied`.
    pub async fn request_access(&self) -> PermissionState {
        let state = match self.provider.open_capture().await {
            Ok(stream) => {
                stream.release();
                PermissionState::Granted
            }
            Err(e) => {
                info!(error = %e, "microphone access refused");
                PermissionState::Denied
            }
        };
        self.record(state);
        state
    }

    /// Poll the platform every `interval` so external changes get noticed
    pub fn watch(&self, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                monitor.refresh().await;
            }
        })
    }

    fn record(&self, state: PermissionState) -> bool {
        // Once the platform has answered we never go back to Unknown
        if state == PermissionState::Unknown {
            return false;
        }

        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(%state, "microphone permission changed");
        }
        changed
    }
}
