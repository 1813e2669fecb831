//! Media negotiation control plane
//!
//! This crate drives the client side of a conferencing session's media
//! negotiation: the subscribe/acknowledge exchange with the signaling
//! backend and the adaptive simulcast uplink policy that decides which
//! video layers are sent.
//!
//! ## Architecture
//!
//! - **`SubscribeExchangeTask`**: one cancelable subscribe round trip
//! - **`SimulcastUplinkPolicy`**: bandwidth samples in, encoding parameters out
//! - **`UplinkMonitor`**: feeds samples from the media stack into the policy
//! - **`SessionContext`**: negotiation state and collaborators lent to tasks
//!
//! The transport session, the signaling connection and the stream index are
//! collaborators reached through the traits in [`signaling`],
//! [`stream_index`] and [`sdp`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meetkit_core::{Task, TimeoutTask};
//! use meetkit_rtc::{SessionContext, SubscribeExchangeTask};
//!
//! let mut context = SessionContext::new(attendee, endpoint, signaling, index, status)
//!     .with_uplink_policy(policy);
//! context.local_sdp = Some(offer);
//! let task = TimeoutTask::new(SubscribeExchangeTask::new(), ack_timeout);
//! task.run(&mut context).await?;
//! ```

pub mod context;
pub mod encoding;
pub mod layer;
pub mod monitor;
pub mod observer;
pub mod policy;
pub mod sdp;
pub mod signaling;
pub mod stream_index;
pub mod subscribe;

pub use context::{SessionContext, StatusHandler};
pub use encoding::{EncodingParameter, EncodingParameterSet, VideoCaptureAndEncodeParameter};
pub use layer::{ActiveLayerSet, LayerId};
pub use monitor::{SharedPolicy, UplinkMonitor};
pub use observer::{LayerSetDescriptor, ObserverId, ObserverRegistry, SimulcastUplinkObserver};
pub use policy::{BandwidthSample, SimulcastUplinkPolicy};
pub use sdp::{repair_subscription_order, MediaDirection, SdpEditor, SessionSdpEditor, SubscriptionRepair};
pub use signaling::{
    SignalFrame, SignalingChannel, SignalingEvent, SignalingObserver, SubscribeAckFrame,
    SubscriptionRequest, TrackMapping, VideoDuplexMode,
};
pub use stream_index::{StreamDescriptor, StreamIndex};
pub use subscribe::{single_layer_encoding, SubscribeExchangeTask};
