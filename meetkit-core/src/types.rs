//! Identifiers shared by the negotiation and uplink components

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a meeting attendee as known to the signaling backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendeeId(String);

impl AttendeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AttendeeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AttendeeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Backend-assigned media stream id; 0 means "no stream"
pub type StreamId = u32;
