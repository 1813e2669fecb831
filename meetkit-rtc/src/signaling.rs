//! Signaling frames, events and the channel the negotiation core talks through
//!
//! Framing, reconnection and wire encoding belong to the channel
//! implementation. The core only needs to send a [`SubscriptionRequest`] and
//! observe [`SignalingEvent`]s.

use crate::stream_index::StreamDescriptor;
use meetkit_core::{AttendeeId, StreamId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Mapping of a negotiated track to a backend stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMapping {
    pub stream_id: StreamId,
    pub ssrc: u32,
    pub track_label: String,
}

/// Backend acknowledgement of a subscribe request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeAckFrame {
    pub sdp_answer: Option<String>,
    #[serde(default)]
    pub tracks: Vec<TrackMapping>,
}

/// Inbound signaling frame, closed over the kinds the backend sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalFrame {
    JoinAck,
    Index { participant_count: usize },
    SubscribeAck(SubscribeAckFrame),
    Pong { timestamp_ms: u64 },
    AudioStatus { status_code: u32 },
    Bitrates,
    Error { status: u32, description: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    Opened,
    FrameReceived(SignalFrame),
    ConnectionTerminated { close_code: u16, reason: String },
    Closed,
}

pub trait SignalingObserver: Send + Sync {
    fn handle_signaling_event(&self, event: &SignalingEvent);
}

pub trait SignalingChannel: Send + Sync {
    /// Transmit a subscribe request
    fn send(&self, request: &SubscriptionRequest) -> meetkit_core::Result<()>;

    fn register_observer(&self, observer: Arc<dyn SignalingObserver>);

    /// Removing an observer that is not registered is a no-op. Observers may
    /// remove themselves from inside `handle_signaling_event`.
    fn remove_observer(&self, observer: &Arc<dyn SignalingObserver>);
}

/// Identity comparison for registered observers
#[must_use]
pub fn same_observer(a: &Arc<dyn SignalingObserver>, b: &Arc<dyn SignalingObserver>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Direction(s) the local video service runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoDuplexMode {
    Tx,
    Rx,
    Duplex,
}

impl VideoDuplexMode {
    #[must_use]
    pub const fn is_sending(self) -> bool {
        matches!(self, Self::Tx | Self::Duplex)
    }
}

/// One subscribe request; built fresh for every exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub attendee_id: AttendeeId,
    pub local_sdp: String,
    pub signaling_endpoint: String,
    pub is_local_audio_muted: bool,
    /// One entry per video media section, 0 where nothing is received
    pub video_subscription_indices: Vec<StreamId>,
    pub is_sending_video: bool,
    pub duplex: VideoDuplexMode,
    pub local_stream_descriptors: Vec<StreamDescriptor>,
    pub check_in_mode: bool,
}
