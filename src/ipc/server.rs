//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications for
//! state change events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::{EventSink, StateEvent};
use crate::state::SessionSnapshot;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Orchestrator inbox for user intents
    intents: EventSink,
    /// Published state events, fanned out to subscribed clients
    events: broadcast::Sender<StateEvent>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

/// What a client handler needs from the server
#[derive(Clone)]
struct ClientContext {
    state: Arc<RwLock<ServerState>>,
    intents: EventSink,
    events: broadcast::Sender<StateEvent>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        intents: EventSink,
        events: broadcast::Sender<StateEvent>,
        session: SessionSnapshot,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus {
                session,
                ..DaemonStatus::default()
            },
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            intents,
            events,
        })
    }

    /// Fold a published state event into the status served to clients
    pub async fn apply(&self, event: &StateEvent) {
        let mut server_state = self.state.write().await;
        let old_mode = server_state.status.session.mode;
        server_state.status.session.apply(event);

        let mode = server_state.status.session.mode;
        if old_mode != mode {
            debug!(from = %old_mode, to = %mode, "IPC server: mode updated");
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = ClientContext {
                        state: Arc::clone(&self.state),
                        intents: self.intents.clone(),
                        events: self.events.clone(),
                    };
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, ctx: ClientContext) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;
        let mut len_buf = [0u8; 4];

        let result = loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                break Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut msg_buf).await {
                break Err(e.into());
            }

            // Parse request
            let request: Request = match serde_json::from_slice(&msg_buf) {
                Ok(request) => request,
                Err(e) => break Err(anyhow::Error::new(e).context("failed to parse request")),
            };

            debug!(?request, "received request");

            let response = Self::process_request(&request, &ctx).await;

            // Subscribe before confirming so no event slips between the two
            let subscription = match (&request, &forwarder) {
                (Request::Subscribe, None) => Some(ctx.events.subscribe()),
                _ => None,
            };

            if let Err(e) = send_message(&mut *writer.lock().await, &response).await {
                break Err(e);
            }

            if let Some(events) = subscription {
                debug!("client subscribed to notifications");
                forwarder = Some(tokio::spawn(forward_events(events, Arc::clone(&writer))));
            }
        };

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        result
    }

    /// Process a request and return a response
    async fn process_request(request: &Request, ctx: &ClientContext) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = ctx.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::Subscribe => Response::Subscribed,

            Request::StartTalk | Request::StopTalk | Request::StopSpeaking => {
                match request.intent().map(|intent| ctx.intents.send(intent)) {
                    Some(Ok(())) => Response::Accepted,
                    _ => Response::Error {
                        code: "unavailable".to_string(),
                        message: "dialogue loop is not running".to_string(),
                    },
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Push every published state event to one subscribed client
async fn forward_events(
    mut events: broadcast::Receiver<StateEvent>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let notification = Notification::StateChanged { event };
                if let Err(e) = send_message(&mut *writer.lock().await, &notification).await {
                    debug!(?e, "subscriber went away");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged behind state events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::events::DialogueEvent;
    use crate::state::{Mode, PermissionState};

    struct Client(UnixStream);

    impl Client {
        async fn connect(path: &Path) -> Self {
            Self(UnixStream::connect(path).await.unwrap())
        }

        async fn send(&mut self, request: Request) {
            send_message(&mut self.0, &request).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let read = async {
                let mut len_buf = [0u8; 4];
                self.0.read_exact(&mut len_buf).await.unwrap();
                let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
                self.0.read_exact(&mut body).await.unwrap();
                serde_json::from_slice(&body).unwrap()
            };
            tokio::time::timeout(Duration::from_secs(2), read)
                .await
                .expect("no message from server")
        }

        async fn call(&mut self, request: Request) -> Value {
            self.send(request).await;
            self.recv().await
        }
    }

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("shevanta-ipc-{}-{}", name, std::process::id()))
            .join("daemon.sock")
    }

    fn start_server(
        name: &str,
    ) -> (
        Arc<Server>,
        PathBuf,
        mpsc::UnboundedReceiver<DialogueEvent>,
        broadcast::Sender<StateEvent>,
    ) {
        let path = socket_path(name);
        let (intents, inbox) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(16);
        let server = Arc::new(
            Server::new(&path, intents, events.clone(), SessionSnapshot::default()).unwrap(),
        );
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.run().await });
        (server, path, inbox, events)
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let (server, path, _inbox, _events) = start_server("status");
        let mut client = Client::connect(&path).await;

        assert_eq!(client.call(Request::Ping).await["type"], "pong");

        server
            .apply(&StateEvent::PermissionChanged {
                state: PermissionState::Granted,
            })
            .await;
        let status = client.call(Request::GetStatus).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["session"]["mode"], "idle");
        assert_eq!(status["session"]["permission"], "granted");

        server.shutdown().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_intents_reach_the_orchestrator() {
        let (_server, path, mut inbox, _events) = start_server("intents");
        let mut client = Client::connect(&path).await;

        assert_eq!(client.call(Request::StartTalk).await["type"], "accepted");
        assert_eq!(client.call(Request::StopTalk).await["type"], "accepted");

        assert!(matches!(inbox.recv().await, Some(DialogueEvent::StartTalk)));
        assert!(matches!(inbox.recv().await, Some(DialogueEvent::StopTalk)));
    }

    #[tokio::test]
    async fn test_closed_inbox_is_reported() {
        let (_server, path, inbox, _events) = start_server("closed");
        drop(inbox);
        let mut client = Client::connect(&path).await;

        let reply = client.call(Request::StopSpeaking).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "unavailable");
    }

    #[tokio::test]
    async fn test_subscribers_receive_state_events() {
        let (_server, path, _inbox, events) = start_server("subscribe");
        let mut client = Client::connect(&path).await;

        assert_eq!(client.call(Request::Subscribe).await["type"], "subscribed");

        events
            .send(StateEvent::ModeChanged {
                from: Mode::Idle,
                to: Mode::Speaking,
                duration_ms: 0,
            })
            .unwrap();

        let pushed = client.recv().await;
        assert_eq!(pushed["type"], "state_changed");
        assert_eq!(pushed["event"]["to"], "speaking");
    }
}
