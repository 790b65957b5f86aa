//! Wire format error types.

use thiserror::Error;

/// Errors produced while decoding inbound frames
#[derive(Error, Debug)]
pub enum WireError {
    /// Frame text is not valid JSON
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object
    #[error("frame is not a json object")]
    NotAnObject,

    /// Frame object carries no string `type` field
    #[error("frame has no type field")]
    MissingKind,
}
