//! Message envelope with a `type` discriminator.
//!
//! An [`Envelope`] is the decoded form of one wire frame: the `type`
//! field becomes [`Envelope::kind`] and every other field is kept in an
//! ordered JSON map, so application messages of arbitrary shape pass
//! through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WireError;

/// Field name carrying the caller identity in the handshake frame.
pub const IDENTITY_FIELD: &str = "userId";

/// Well-known message kinds.
pub mod kind {
    /// Handshake frame sent once per successful open, carrying identity.
    pub const AUTH: &str = "auth";
    /// Liveness probe, answered with [`PONG`] and never dispatched.
    pub const PING: &str = "ping";
    /// Liveness reply to a [`PING`].
    pub const PONG: &str = "pong";
    /// Server notice (welcome message and similar).
    pub const SYSTEM: &str = "system";
    /// Job update push.
    pub const JOB: &str = "job";
    /// Skill update push.
    pub const SKILL: &str = "skill";
    /// Market update push.
    pub const MARKET: &str = "market";
    /// Wildcard subscription key: handlers registered under this kind
    /// are invoked for every dispatched frame.
    pub const ALL: &str = "all";
}

/// One decoded wire frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind, the dispatch discriminator
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining fields of the JSON object, `type` excluded
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope with no fields beyond the kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Handshake frame carrying the caller identity
    pub fn auth(identity: &str) -> Self {
        Self::new(kind::AUTH).with_field(IDENTITY_FIELD, identity)
    }

    /// Liveness probe
    pub fn ping() -> Self {
        Self::new(kind::PING)
    }

    /// Liveness reply
    pub fn pong() -> Self {
        Self::new(kind::PONG)
    }

    /// Server notice with a human-readable message
    pub fn system(message: &str) -> Self {
        Self::new(kind::SYSTEM).with_field("message", message)
    }

    /// Whether this frame is a liveness probe
    pub fn is_ping(&self) -> bool {
        self.kind == kind::PING
    }

    /// Look up a field by name
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a string field by name
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Encode an envelope to its wire text
pub fn encode(env: &Envelope) -> String {
    serde_json::to_string(env).expect("envelope serialization should never fail")
}

/// Decode one wire frame, requiring a JSON object with a string `type`
pub fn decode(text: &str) -> Result<Envelope, WireError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut fields) = value else {
        return Err(WireError::NotAnObject);
    };
    let kind = match fields.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(WireError::MissingKind),
    };
    Ok(Envelope { kind, fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_frame_shape() {
        let env = Envelope::auth("user-1");
        let text = encode(&env);

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "auth");
        assert_eq!(value["userId"], "user-1");
    }

    #[test]
    fn test_decode_preserves_extra_fields() {
        let env = decode(r#"{"type":"chat","msg":"hi","count":3}"#).unwrap();
        assert_eq!(env.kind, "chat");
        assert_eq!(env.field_str("msg"), Some("hi"));
        assert_eq!(env.field("count"), Some(&Value::from(3)));
    }

    #[test]
    fn test_decode_roundtrip() {
        let env = Envelope::new("chat").with_field("msg", "hi");
        let decoded = decode(&encode(&env)).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(decode("not json"), Err(WireError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(matches!(decode("[1,2,3]"), Err(WireError::NotAnObject)));
        assert!(matches!(decode("\"hello\""), Err(WireError::NotAnObject)));
    }

    #[test]
    fn test_decode_requires_kind() {
        assert!(matches!(decode(r#"{"msg":"hi"}"#), Err(WireError::MissingKind)));
        assert!(matches!(decode(r#"{"type":7}"#), Err(WireError::MissingKind)));
    }

    #[test]
    fn test_ping_pong_frames() {
        assert!(Envelope::ping().is_ping());
        assert!(!Envelope::pong().is_ping());
        assert_eq!(encode(&Envelope::pong()), r#"{"type":"pong"}"#);
    }
}
