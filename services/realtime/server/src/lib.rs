//! WebSocket push server for WorkWise realtime updates.
//!
//! Accepts client connections, tracks them in a shared registry keyed
//! by connection id, authenticates them through the `auth` handshake,
//! keeps them alive with periodic pings, and offers a push API for
//! sending updates to one client, to every socket of a user, or to
//! everyone at once.
//!
//! ## Example
//!
//! ```rust,no_run
//! use realtime_server::{RealtimeServer, ServerConfig};
//! use tokio::net::TcpListener;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = RealtimeServer::new(ServerConfig::default());
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//!
//! let pusher = server.clone();
//! tokio::spawn(async move {
//!     pusher.send_job_update("user-1", "Your application moved forward").await;
//! });
//!
//! server.run(listener).await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod server;

// Re-export main types
pub use registry::ClientRegistry;
pub use server::{RealtimeServer, ServerConfig};
