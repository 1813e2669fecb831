//! Simulcast layers and the layer sets the uplink policy switches between

use serde::{Deserialize, Serialize};
use std::fmt;

/// One simulcast encoding of the local video, ascending by resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerId {
    Low,
    Mid,
    #[serde(rename = "hi")]
    High,
}

impl LayerId {
    /// All layers, lowest first
    pub const ASCENDING: [Self; 3] = [Self::Low, Self::Mid, Self::High];

    /// Get the RID (restriction identifier) for this layer
    #[must_use]
    pub const fn rid(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "hi",
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rid())
    }
}

/// Which layers are sent, ordered by descending bandwidth requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveLayerSet {
    /// A single layer; the state while simulcast is disabled
    Hi,
    HiAndLow,
    MidAndLow,
    Low,
}

impl fmt::Display for ActiveLayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hi => "Hi",
            Self::HiAndLow => "HiAndLow",
            Self::MidAndLow => "MidAndLow",
            Self::Low => "Low",
        };
        f.write_str(name)
    }
}
