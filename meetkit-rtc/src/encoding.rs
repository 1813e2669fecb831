//! Per-layer encoding parameters handed to the media sender

use crate::layer::LayerId;
use serde::{Deserialize, Serialize};

/// Resolution divisor of the lowest layer; each step up halves it
const LOWEST_LAYER_SCALE: f64 = 4.0;

/// Target of a single simulcast layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingParameter {
    #[serde(rename = "rid")]
    pub layer_id: LayerId,
    pub active: bool,
    /// Resolution divisor, always >= 1
    pub scale_down_factor: f64,
    pub max_bitrate_bps: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_framerate: Option<u32>,
}

/// Encoding parameters of every sent layer, ascending by layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodingParameterSet {
    layers: Vec<EncodingParameter>,
}

impl EncodingParameterSet {
    /// Build the full low/mid/high set from target bitrates in kbps
    ///
    /// A layer is active iff its bitrate is non-zero. Without simulcast there
    /// is no resolution ladder, so every layer keeps full resolution.
    #[must_use]
    pub fn from_bitrates(bitrates_kbps: [u32; 3], simulcast_disabled: bool) -> Self {
        let mut scale = LOWEST_LAYER_SCALE;
        let layers = LayerId::ASCENDING
            .iter()
            .zip(bitrates_kbps)
            .map(|(&layer_id, kbps)| {
                let param = EncodingParameter {
                    layer_id,
                    active: kbps > 0,
                    scale_down_factor: if simulcast_disabled { 1.0 } else { scale },
                    max_bitrate_bps: u64::from(kbps) * 1000,
                    max_framerate: None,
                };
                scale /= 2.0;
                param
            })
            .collect();

        Self { layers }
    }

    /// A set carrying exactly one layer
    #[must_use]
    pub fn single(param: EncodingParameter) -> Self {
        Self {
            layers: vec![param],
        }
    }

    #[must_use]
    pub fn get(&self, layer_id: LayerId) -> Option<&EncodingParameter> {
        self.layers.iter().find(|p| p.layer_id == layer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodingParameter> {
        self.layers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers that will actually be encoded, lowest first
    #[must_use]
    pub fn active_layers(&self) -> Vec<LayerId> {
        self.layers
            .iter()
            .filter(|p| p.active)
            .map(|p| p.layer_id)
            .collect()
    }

    /// Sum of the active layers' bitrates (kbps)
    #[must_use]
    pub fn total_active_bitrate_kbps(&self) -> u64 {
        self.layers
            .iter()
            .filter(|p| p.active)
            .map(|p| p.max_bitrate_bps / 1000)
            .sum()
    }
}

impl<'a> IntoIterator for &'a EncodingParameterSet {
    type Item = &'a EncodingParameter;
    type IntoIter = std::slice::Iter<'a, EncodingParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

/// Capture and encoder settings for the local camera
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCaptureAndEncodeParameter {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub max_encode_bitrate_kbps: u32,
    pub simulcast: bool,
}
