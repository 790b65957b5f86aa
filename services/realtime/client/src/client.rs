//! Connection lifecycle management for the realtime channel.
//!
//! [`RealtimeClient`] owns the WebSocket exclusively: it dials the
//! endpoint, performs the auth handshake on open, feeds inbound frames
//! through the keepalive responder and the dispatch table, and invokes
//! the reconnection policy when the connection is lost. Public methods
//! never fail with an error; all failure signals are boolean returns
//! plus log lines.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use realtime_wire::{decode, encode, Envelope};

use crate::backoff::{ReconnectPolicy, ReconnectState};
use crate::dispatch::{DispatchTable, HandlerId};
use crate::endpoint::Endpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// One live socket and its I/O tasks
struct Connection {
    /// Generation counter distinguishing this socket from its successors
    epoch: u64,
    /// Channel into the writer task
    outbound: mpsc::UnboundedSender<Message>,
    /// Cleared as soon as either I/O task observes the socket dead
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    fn shutdown(self) {
        self.open.store(false, Ordering::SeqCst);
        // aborting the reader drops its outbound clone; the writer then
        // drains, sends a close frame, and ends on its own
        self.reader.abort();
        drop(self.outbound);
        drop(self.writer);
    }
}

struct Inner {
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    dispatch: DispatchTable,
    identity: Mutex<Option<String>>,
    conn: Mutex<Option<Connection>>,
    reconnect: Mutex<ReconnectState>,
    /// Serializes concurrent `connect` calls so only one dial is in flight
    connect_gate: tokio::sync::Mutex<()>,
    next_epoch: AtomicU64,
    /// Bumped by `disconnect`; a dial that finishes under a stale
    /// generation is discarded instead of installed
    generation: AtomicU64,
}

impl Inner {
    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_identity(&self) -> MutexGuard<'_, Option<String>> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_reconnect(&self) -> MutexGuard<'_, ReconnectState> {
        self.reconnect.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called from the reader task when the socket dies without an
    /// explicit `disconnect`. Stale notifications from superseded
    /// connections are ignored.
    fn on_connection_lost(self: &Arc<Self>, epoch: u64) {
        {
            let mut conn = self.lock_conn();
            match conn.as_ref() {
                Some(live) if live.epoch == epoch => {
                    *conn = None;
                }
                _ => return,
            }
        }
        warn!("realtime connection lost");
        self.schedule_reconnect();
    }

    /// Schedule one retry per the reconnection policy. Any pending
    /// timer is cancelled first, so at most one retry is in flight.
    fn schedule_reconnect(self: &Arc<Self>) {
        let identity = self.lock_identity().clone();
        let mut reconnect = self.lock_reconnect();
        reconnect.cancel_timer();

        let Some(identity) = identity else {
            debug!("no identity known, not reconnecting");
            return;
        };
        if reconnect.attempts >= self.policy.max_attempts {
            info!(
                "reconnect budget exhausted after {} attempts",
                reconnect.attempts
            );
            return;
        }

        let delay = reconnect.delay;
        info!(
            "scheduling reconnect attempt {}/{} in {:?}",
            reconnect.attempts + 1,
            self.policy.max_attempts,
            delay
        );

        let inner = Arc::clone(self);
        reconnect.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut reconnect = inner.lock_reconnect();
                reconnect.attempts += 1;
                reconnect.delay = inner.policy.next_delay(reconnect.delay);
                reconnect.timer = None;
            }
            let client = RealtimeClient { inner: inner.clone() };
            client.connect(&identity).await;
        }));
    }
}

/// Client side of the realtime push channel
///
/// Cheap to clone; all clones share one connection and one handler
/// registry.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Create a client for `endpoint` with the default reconnection policy
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_policy(endpoint, ReconnectPolicy::default())
    }

    /// Create a client with an explicit reconnection policy
    pub fn with_policy(endpoint: Endpoint, policy: ReconnectPolicy) -> Self {
        let reconnect = ReconnectState::new(&policy);
        Self {
            inner: Arc::new(Inner {
                endpoint,
                policy,
                dispatch: DispatchTable::new(),
                identity: Mutex::new(None),
                conn: Mutex::new(None),
                reconnect: Mutex::new(reconnect),
                connect_gate: tokio::sync::Mutex::new(()),
                next_epoch: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Open the channel as `identity`.
    ///
    /// Returns `true` immediately when a connection is already open.
    /// Otherwise stores the identity for automatic reconnection, dials
    /// the endpoint, and sends the auth handshake on open. Returns
    /// `false` when the dial or the handshake fails; the reconnection
    /// policy has then already been invoked.
    pub async fn connect(&self, identity: &str) -> bool {
        let _gate = self.inner.connect_gate.lock().await;

        if self.is_connected() {
            debug!("realtime channel already connected");
            return true;
        }

        // a disconnect() arriving after this point invalidates the dial
        let generation = self.inner.generation.load(Ordering::SeqCst);

        self.inner.lock_identity().replace(identity.to_string());
        self.inner.lock_reconnect().cancel_timer();

        let url = self.inner.endpoint.url();
        debug!("realtime channel connecting to {}", url);

        let ws = match connect_async(&url).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!("connection to {} failed: {}", url, e);
                self.inner.schedule_reconnect();
                return false;
            }
        };
        let (mut sink, stream) = ws.split();

        // handshake before the connection counts as open
        let auth = encode(&Envelope::auth(identity));
        if let Err(e) = sink.send(Message::text(auth)).await {
            warn!("handshake to {} failed: {}", url, e);
            self.inner.schedule_reconnect();
            return false;
        }

        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst);
        let open = Arc::new(AtomicBool::new(true));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        // install the new connection before its reader can report loss;
        // the reader's loss path blocks on this same lock
        let mut conn = self.inner.lock_conn();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            drop(conn);
            info!("dial superseded by disconnect, discarding fresh socket");
            let _ = sink.send(Message::Close(None)).await;
            return false;
        }
        self.inner.lock_reconnect().reset(&self.inner.policy);
        if let Some(old) = conn.take() {
            old.shutdown();
        }
        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.inner),
            stream,
            outbound.clone(),
            Arc::clone(&open),
            epoch,
        ));
        let writer = tokio::spawn(write_loop(sink, outbound_rx, Arc::clone(&open)));
        *conn = Some(Connection {
            epoch,
            outbound,
            open,
            reader,
            writer,
        });
        drop(conn);

        info!("realtime channel connected as {}", identity);
        true
    }

    /// Serialize `payload` and write it iff the connection is open.
    ///
    /// Returns whether the write was attempted; nothing is queued while
    /// disconnected.
    pub fn send<T: Serialize>(&self, payload: &T) -> bool {
        let conn = self.inner.lock_conn();
        let Some(conn) = conn.as_ref() else {
            return false;
        };
        if !conn.open.load(Ordering::SeqCst) {
            return false;
        }
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("payload serialization failed: {}", e);
                return false;
            }
        };
        conn.outbound.send(Message::text(text)).is_ok()
    }

    /// Register a handler for frames of `kind`; handlers under
    /// [`realtime_wire::kind::ALL`] see every dispatched frame
    pub fn on<F>(&self, kind: &str, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.dispatch.on(kind, handler)
    }

    /// Remove a registration made with [`RealtimeClient::on`]
    pub fn off(&self, kind: &str, id: HandlerId) -> bool {
        self.inner.dispatch.off(kind, id)
    }

    /// Close the channel: cancel any pending reconnect, drop the live
    /// connection, clear the identity and every registered handler. A
    /// dial in flight is abandoned rather than installed. Idempotent.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.lock_reconnect().cancel_timer();
        if let Some(conn) = self.inner.lock_conn().take() {
            conn.shutdown();
        }
        self.inner.lock_identity().take();
        self.inner.dispatch.clear();
        info!("realtime channel disconnected");
    }

    /// Whether a connection exists and is open
    pub fn is_connected(&self) -> bool {
        self.inner
            .lock_conn()
            .as_ref()
            .map(|conn| conn.open.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Retries fired since the last successful open (diagnostics)
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock_reconnect().attempts
    }

    /// Whether a reconnect timer is currently pending (diagnostics)
    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.lock_reconnect().timer.is_some()
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("endpoint", &self.inner.endpoint)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Read inbound frames until the socket dies, answering pings and
/// dispatching everything else
async fn read_loop(
    inner: Arc<Inner>,
    mut stream: WsSource,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    epoch: u64,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => match decode(text.as_str()) {
                Ok(frame) if frame.is_ping() => {
                    // keepalive responder: answered here, never dispatched
                    let pong = Message::text(encode(&Envelope::pong()));
                    if outbound.send(pong).is_err() {
                        break;
                    }
                }
                Ok(frame) => inner.dispatch.dispatch(&frame),
                Err(e) => warn!("dropping malformed frame: {}", e),
            },
            Ok(Message::Close(_)) => {
                info!("server closed the realtime channel");
                break;
            }
            Ok(_) => {
                // binary and transport-level control frames are not part
                // of the protocol
            }
            Err(e) => {
                warn!("realtime socket error: {}", e);
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
    inner.on_connection_lost(epoch);
}

/// Forward queued frames to the socket; on channel close, say goodbye
async fn write_loop(
    mut sink: WsSink,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
) {
    while let Some(message) = outbound_rx.recv().await {
        if let Err(e) = sink.send(message).await {
            warn!("realtime socket write failed: {}", e);
            break;
        }
    }
    open.store(false, Ordering::SeqCst);
    let _ = sink.send(Message::Close(None)).await;
}
