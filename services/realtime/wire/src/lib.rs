//! JSON wire format for the WorkWise realtime service.
//!
//! Every frame on the wire is a JSON object carrying a `type` field that
//! names the message kind; all remaining fields are kind-specific. This
//! crate provides the [`Envelope`] type that models such frames, the
//! well-known [`kind`] constants, and the typed [`UpdateMessage`] pushed
//! by the server for job/skill/market notifications.
//!
//! ## Wire format
//!
//! ```text
//! {"type": "auth", "userId": "user-1"}        handshake, client -> server
//! {"type": "ping"}                            liveness probe, server -> client
//! {"type": "pong"}                            liveness reply, client -> server
//! {"type": "system", "message": "..."}        server notice
//! {"type": "job", "message": "...",
//!  "timestamp": "2025-..."}                   typed update push
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod update;

// Re-export main types
pub use envelope::{decode, encode, kind, Envelope, IDENTITY_FIELD};
pub use error::WireError;
pub use update::{UpdateKind, UpdateMessage};
