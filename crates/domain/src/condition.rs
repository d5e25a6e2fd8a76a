use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry in the ordered event log carried by requests and jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type, e.g. `Approved` or `GrantFailed`.
    #[serde(rename = "type")]
    pub kind: String,
    /// When the condition was recorded.
    pub timestamp: DateTime<Utc>,
    /// Machine-readable reason.
    pub reason: String,
    /// Human readable message. Never carries credential material.
    pub message: String,
}

impl Condition {
    /// Creates a condition entry.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            timestamp,
            reason: reason.into(),
            message: message.into(),
        }
    }
}
