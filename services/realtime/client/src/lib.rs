//! Reconnecting WebSocket client for WorkWise realtime updates.
//!
//! This crate implements the client side of the realtime push channel:
//! connection lifecycle with an application-level auth handshake,
//! automatic reconnection with exponential backoff, a per-kind message
//! dispatch table with a wildcard subscriber, and a keepalive responder
//! that answers server liveness probes.
//!
//! ## Features
//!
//! - **Lifecycle**: connect/send/disconnect/is_connected over one owned socket
//! - **Handshake**: `{"type":"auth","userId":...}` sent once per open
//! - **Reconnect**: bounded attempts with doubling delay, reusing the last identity
//! - **Dispatch**: ordered per-kind handlers plus an `"all"` wildcard,
//!   with isolated handler failures
//! - **Keepalive**: server pings answered with pongs, never surfaced to handlers
//!
//! ## Example
//!
//! ```rust,no_run
//! use realtime_client::{Endpoint, RealtimeClient};
//! use realtime_wire::kind;
//!
//! # async fn example() {
//! let client = RealtimeClient::new(Endpoint::insecure("127.0.0.1:8080"));
//!
//! client.on(kind::JOB, |frame| {
//!     println!("job update: {:?}", frame.field_str("message"));
//! });
//!
//! if client.connect("user-1").await {
//!     client.send(&serde_json::json!({"type": "chat", "msg": "hi"}));
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod client;
pub mod dispatch;
pub mod endpoint;

// Re-export main types
pub use backoff::ReconnectPolicy;
pub use client::RealtimeClient;
pub use dispatch::{DispatchTable, HandlerId};
pub use endpoint::{Endpoint, WS_PATH};
