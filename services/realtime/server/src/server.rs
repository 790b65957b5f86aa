//! Accept loop, per-connection handling, and the push API.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use realtime_wire::{decode, kind, Envelope, UpdateKind, UpdateMessage, IDENTITY_FIELD};

use crate::registry::ClientRegistry;

/// Text of the welcome notice sent after a successful auth
const WELCOME_MESSAGE: &str = "Connected to real-time updates";

/// Configuration for the realtime server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interval of the liveness sweep; clients that fail to answer a
    /// ping within one interval are terminated
    pub ping_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Push server for the realtime channel
///
/// Cheap to clone; all clones share the client registry, so one clone
/// can run the accept loop while others push updates.
#[derive(Debug, Clone)]
pub struct RealtimeServer {
    config: ServerConfig,
    registry: ClientRegistry,
}

impl RealtimeServer {
    /// Create a server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: ClientRegistry::new(),
        }
    }

    /// The shared client registry
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Accept connections on `listener` until it fails
    pub async fn run(&self, listener: TcpListener) -> anyhow::Result<()> {
        info!("realtime server listening on {}", listener.local_addr()?);

        let sweeper = self.clone();
        tokio::spawn(async move {
            // first sweep one full interval out, so fresh connections get
            // a chance to answer the initial probe
            let start = tokio::time::Instant::now() + sweeper.config.ping_interval;
            let mut interval = tokio::time::interval_at(start, sweeper.config.ping_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let terminated = sweeper.registry.sweep().await;
                if terminated > 0 {
                    info!("terminated {} unresponsive clients", terminated);
                }
            }
        });

        loop {
            let (socket, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(socket, peer).await {
                    warn!("connection from {} ended with error: {:#}", peer, e);
                }
            });
        }
    }

    /// Drive one client connection from accept to removal
    async fn handle_connection(&self, socket: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let ws = tokio_tungstenite::accept_async(socket).await?;
        let (mut sink, mut stream) = ws.split();

        let id = Uuid::new_v4();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        self.registry.insert(id, outbound.clone(), shutdown_tx).await;
        info!(
            "client {} connected from {} ({} total)",
            id,
            peer,
            self.registry.len().await
        );

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        // initial probe so a dead connection is noticed within one sweep
        let _ = outbound.send(Message::text(realtime_wire::encode(&Envelope::ping())));

        loop {
            tokio::select! {
                // fires when the registry drops this client's entry
                // (sweep, disconnect_user); breaking closes the socket
                _ = &mut shutdown_rx => {
                    info!("client {} terminated server-side", id);
                    break;
                }
                item = stream.next() => {
                    let Some(item) = item else { break };
                    match item {
                        Ok(Message::Text(text)) => match decode(text.as_str()) {
                            Ok(frame) => self.handle_frame(id, &frame).await,
                            Err(e) => warn!("client {}: dropping malformed frame: {}", id, e),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("client {}: socket error: {}", id, e);
                            break;
                        }
                    }
                }
            }
        }

        self.registry.remove(id).await;
        drop(outbound);
        writer.await.ok();
        info!(
            "client {} disconnected ({} remaining)",
            id,
            self.registry.len().await
        );
        Ok(())
    }

    /// React to one inbound frame; only auth and pong mean anything to
    /// the server, everything else is ignored
    async fn handle_frame(&self, id: Uuid, frame: &Envelope) {
        match frame.kind.as_str() {
            kind::AUTH => match frame.field_str(IDENTITY_FIELD) {
                Some(user_id) => {
                    self.registry.authenticate(id, user_id).await;
                    info!("client {} authenticated as {}", id, user_id);
                    self.registry
                        .send_to_client(id, &Envelope::system(WELCOME_MESSAGE))
                        .await;
                }
                None => warn!("client {}: auth frame without {}", id, IDENTITY_FIELD),
            },
            kind::PONG => self.registry.mark_alive(id).await,
            other => debug!("client {}: ignoring frame of kind {}", id, other),
        }
    }

    /// Send a frame to every connection of a user
    pub async fn send_to_user(&self, user_id: &str, frame: &Envelope) -> bool {
        self.registry.send_to_user(user_id, frame).await
    }

    /// Send a frame to every connected client
    pub async fn broadcast(&self, frame: &Envelope) -> usize {
        self.registry.broadcast(frame).await
    }

    /// Push a job update to a user
    pub async fn send_job_update(&self, user_id: &str, message: &str) -> bool {
        self.push_update(user_id, UpdateKind::Job, message).await
    }

    /// Push a skill update to a user
    pub async fn send_skill_update(&self, user_id: &str, message: &str) -> bool {
        self.push_update(user_id, UpdateKind::Skill, message).await
    }

    /// Push a market update to a user
    pub async fn send_market_update(&self, user_id: &str, message: &str) -> bool {
        self.push_update(user_id, UpdateKind::Market, message).await
    }

    async fn push_update(&self, user_id: &str, kind: UpdateKind, message: &str) -> bool {
        let frame: Envelope = UpdateMessage::new(kind, message).into();
        self.send_to_user(user_id, &frame).await
    }

    /// Number of connected clients
    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }
}
