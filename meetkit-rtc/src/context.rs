//! Per-session negotiation state threaded through the exchange tasks

use crate::encoding::VideoCaptureAndEncodeParameter;
use crate::monitor::SharedPolicy;
use crate::sdp::{SdpEditor, SessionSdpEditor};
use crate::signaling::{SignalingChannel, VideoDuplexMode};
use crate::stream_index::StreamIndex;
use meetkit_core::config::NegotiationConfig;
use meetkit_core::{AttendeeId, SessionStatusCode, StreamId, TaskError};
use std::sync::Arc;

/// Receives protocol failures surfaced by exchange tasks
pub trait StatusHandler: Send + Sync {
    fn handle_status(&self, status: SessionStatusCode, error: &TaskError);
}

/// Everything a negotiation task reads and writes
///
/// Owned by the session driver and lent to one task run at a time.
pub struct SessionContext {
    pub attendee_id: AttendeeId,
    pub signaling_endpoint: String,
    pub negotiation: NegotiationConfig,

    pub local_sdp: Option<String>,
    pub sdp_answer: Option<String>,
    /// Stream ids to receive, in the order the session wants them
    pub video_subscriptions: Vec<StreamId>,
    pub is_local_audio_muted: bool,
    pub check_in_mode: bool,
    pub duplex: VideoDuplexMode,
    /// Capture settings for the single-layer path
    pub video_capture_and_encode_parameter: Option<VideoCaptureAndEncodeParameter>,

    pub signaling: Arc<dyn SignalingChannel>,
    pub stream_index: Arc<dyn StreamIndex>,
    pub sdp_editor: Arc<dyn SdpEditor>,
    pub status_handler: Arc<dyn StatusHandler>,
    /// Present only when simulcast is enabled
    pub uplink_policy: Option<SharedPolicy>,
}

impl SessionContext {
    /// Context with default negotiation settings and the bundled SDP editor
    pub fn new(
        attendee_id: AttendeeId,
        signaling_endpoint: impl Into<String>,
        signaling: Arc<dyn SignalingChannel>,
        stream_index: Arc<dyn StreamIndex>,
        status_handler: Arc<dyn StatusHandler>,
    ) -> Self {
        Self {
            attendee_id,
            signaling_endpoint: signaling_endpoint.into(),
            negotiation: NegotiationConfig::default(),
            local_sdp: None,
            sdp_answer: None,
            video_subscriptions: Vec::new(),
            is_local_audio_muted: false,
            check_in_mode: false,
            duplex: VideoDuplexMode::Duplex,
            video_capture_and_encode_parameter: None,
            signaling,
            stream_index,
            sdp_editor: Arc::new(SessionSdpEditor),
            status_handler,
            uplink_policy: None,
        }
    }

    #[must_use]
    pub fn with_negotiation(mut self, negotiation: NegotiationConfig) -> Self {
        self.negotiation = negotiation;
        self
    }

    #[must_use]
    pub fn with_sdp_editor(mut self, sdp_editor: Arc<dyn SdpEditor>) -> Self {
        self.sdp_editor = sdp_editor;
        self
    }

    #[must_use]
    pub fn with_uplink_policy(mut self, policy: SharedPolicy) -> Self {
        self.uplink_policy = Some(policy);
        self
    }

    /// Simulcast is in effect only with both the setting and a policy
    #[must_use]
    pub fn simulcast_enabled(&self) -> bool {
        self.negotiation.enable_simulcast && self.uplink_policy.is_some()
    }
}
