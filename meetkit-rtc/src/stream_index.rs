//! Boundary to the session's video stream index

use crate::encoding::EncodingParameterSet;
use crate::signaling::SubscribeAckFrame;
use meetkit_core::{AttendeeId, StreamId};
use serde::{Deserialize, Serialize};

/// A locally published stream as the backend knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub stream_id: StreamId,
    pub track_label: String,
    /// The media runtime stopped sending this encoding on its own
    pub disabled_by_runtime: bool,
}

/// Index of local and remote video streams, owned by the session
///
/// Track-to-stream assignment lives behind this trait; the negotiation core
/// only feeds decisions and acknowledgements into it.
pub trait StreamIndex: Send + Sync {
    /// Record the encodings the uplink policy decided on
    fn integrate_uplink_decision(&self, params: &EncodingParameterSet);

    /// Record the backend's answer to a subscribe request
    fn integrate_ack_frame(&self, ack: &SubscribeAckFrame);

    /// Called right before a subscribe request goes out
    fn subscribe_frame_sent(&self);

    fn local_stream_descriptors(&self) -> Vec<StreamDescriptor>;

    /// `None` until the first index frame arrived
    fn number_of_participants(&self) -> Option<usize>;

    fn number_of_publishing_participants_excluding_self(&self, self_id: &AttendeeId) -> usize;
}
