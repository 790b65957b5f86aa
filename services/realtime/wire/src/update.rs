//! Typed server push updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Category of a server push update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// Job posting or application status change
    Job,
    /// Skill or training change
    Skill,
    /// Labour market change
    Market,
}

impl UpdateKind {
    /// Wire name of this update kind
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Job => crate::kind::JOB,
            UpdateKind::Skill => crate::kind::SKILL,
            UpdateKind::Market => crate::kind::MARKET,
        }
    }
}

/// A push update delivered to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    /// Update category, doubles as the envelope kind
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Human-readable update text
    pub message: String,
    /// When the update was produced
    pub timestamp: DateTime<Utc>,
}

impl UpdateMessage {
    /// Create an update stamped with the current time
    pub fn new(kind: UpdateKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl From<UpdateMessage> for Envelope {
    fn from(update: UpdateMessage) -> Self {
        let value =
            serde_json::to_value(&update).expect("update serialization should never fail");
        serde_json::from_value(value).expect("update always carries a type field")
    }
}
