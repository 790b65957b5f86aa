//! Shared registry of connected clients.
//!
//! Each connection gets a UUID on accept and an entry holding its
//! outbound channel, the user it authenticated as (if any), and a
//! liveness bit driven by the ping/pong exchange.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use realtime_wire::{encode, Envelope};

/// One connected client
#[derive(Debug)]
struct ClientEntry {
    /// User this connection authenticated as; `None` until the auth frame
    user_id: Option<String>,
    /// Set by a pong, cleared by the sweep; a clear bit at sweep time
    /// means the client missed a whole ping interval
    alive: bool,
    /// Channel into the connection's writer task
    outbound: mpsc::UnboundedSender<Message>,
    /// Held for its drop: losing the entry signals the connection task
    /// to close the socket
    _shutdown: oneshot::Sender<()>,
}

/// Registry of live connections keyed by connection id
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<Uuid, ClientEntry>>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection. Dropping the entry later
    /// closes `shutdown`, which tells the connection task to terminate
    /// the socket.
    pub async fn insert(
        &self,
        id: Uuid,
        outbound: mpsc::UnboundedSender<Message>,
        shutdown: oneshot::Sender<()>,
    ) {
        let mut clients = self.clients.write().await;
        clients.insert(
            id,
            ClientEntry {
                user_id: None,
                alive: true,
                outbound,
                _shutdown: shutdown,
            },
        );
    }

    /// Drop a connection from the registry, closing its socket
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut clients = self.clients.write().await;
        clients.remove(&id).is_some()
    }

    /// Bind a connection to a user after a successful auth frame
    pub async fn authenticate(&self, id: Uuid, user_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get_mut(&id) {
            Some(entry) => {
                entry.user_id = Some(user_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Mark a connection alive after receiving its pong
    pub async fn mark_alive(&self, id: Uuid) {
        let mut clients = self.clients.write().await;
        if let Some(entry) = clients.get_mut(&id) {
            entry.alive = true;
        }
    }

    /// Number of live connections
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Send a frame to one connection; `true` if the write was queued
    pub async fn send_to_client(&self, id: Uuid, frame: &Envelope) -> bool {
        let clients = self.clients.read().await;
        match clients.get(&id) {
            Some(entry) => entry.outbound.send(Message::text(encode(frame))).is_ok(),
            None => false,
        }
    }

    /// Send a frame to every connection of a user; `true` if at least
    /// one write was queued
    pub async fn send_to_user(&self, user_id: &str, frame: &Envelope) -> bool {
        let clients = self.clients.read().await;
        let text = encode(frame);
        let mut sent = false;
        for entry in clients.values() {
            if entry.user_id.as_deref() == Some(user_id)
                && entry.outbound.send(Message::text(text.clone())).is_ok()
            {
                sent = true;
            }
        }
        if !sent {
            debug!("no live connection for user {}", user_id);
        }
        sent
    }

    /// Send a frame to every connection; returns how many writes were queued
    pub async fn broadcast(&self, frame: &Envelope) -> usize {
        let clients = self.clients.read().await;
        let text = encode(frame);
        clients
            .values()
            .filter(|entry| entry.outbound.send(Message::text(text.clone())).is_ok())
            .count()
    }

    /// Terminate every connection of a user (e.g. on logout), closing
    /// their sockets; returns how many connections were dropped
    pub async fn disconnect_user(&self, user_id: &str) -> usize {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|id, entry| {
            if entry.user_id.as_deref() == Some(user_id) {
                info!("client {} disconnected server-side for user {}", id, user_id);
                return false;
            }
            true
        });
        before - clients.len()
    }

    /// Liveness sweep: terminate connections that missed the previous
    /// ping (their sockets close with the dropped entries), then clear
    /// the bit and ping the survivors. Returns how many connections
    /// were terminated.
    pub async fn sweep(&self) -> usize {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        let ping = encode(&Envelope::ping());
        clients.retain(|id, entry| {
            if !entry.alive {
                warn!("client {} terminated due to inactivity", id);
                return false;
            }
            entry.alive = false;
            let _ = entry.outbound.send(Message::text(ping.clone()));
            true
        });
        before - clients.len()
    }
}
