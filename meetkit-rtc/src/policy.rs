//! Adaptive simulcast uplink policy
//!
//! Turns a noisy stream of uplink bandwidth estimates and participant-count
//! changes into a stable choice of simulcast layers. A proposal is computed
//! on every accepted sample but only takes effect when the session commits
//! it through [`SimulcastUplinkPolicy::choose_encoding_parameters`].

use crate::encoding::{EncodingParameterSet, VideoCaptureAndEncodeParameter};
use crate::layer::ActiveLayerSet;
use crate::observer::{LayerSetDescriptor, ObserverId, ObserverRegistry, SimulcastUplinkObserver};
use crate::stream_index::{StreamDescriptor, StreamIndex};
use meetkit_core::config::UplinkPolicyConfig;
use meetkit_core::AttendeeId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Uplink at or below which the high layer is dropped
pub const HI_DISABLED_RATE_KBPS: f64 = 700.0;
/// Uplink below which only the low layer survives
pub const MID_DISABLED_RATE_KBPS: f64 = 240.0;

const HI_AND_LOW_INCREASE_KBPS: f64 = 2400.0;
const MID_AND_LOW_INCREASE_KBPS: f64 = 1000.0;
const LOW_INCREASE_KBPS: f64 = 300.0;
const LOW_LAYER_BOOST_KBPS: f64 = 350.0;

const MAX_HI_AND_LOW_SENDERS: usize = 4;
const MAX_FULL_RATE_MID_SENDERS: usize = 6;
/// Up to this many participants the backend relays estimates peer to peer
const MAX_PARTICIPANTS_WITHOUT_SIMULCAST: usize = 2;

const CAPTURE_WIDTH: u32 = 1280;
const CAPTURE_HEIGHT: u32 = 768;

/// One uplink bandwidth estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandwidthSample {
    pub uplink_kbps: f64,
    pub observed_at: Instant,
}

impl BandwidthSample {
    #[must_use]
    pub const fn new(uplink_kbps: f64, observed_at: Instant) -> Self {
        Self {
            uplink_kbps,
            observed_at,
        }
    }

    /// A sample observed right now
    #[must_use]
    pub fn now(uplink_kbps: f64) -> Self {
        Self::new(uplink_kbps, Instant::now())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.uplink_kbps.is_finite() && self.uplink_kbps >= 0.0
    }
}

pub struct SimulcastUplinkPolicy {
    config: UplinkPolicyConfig,
    self_id: AttendeeId,
    observers: ObserverRegistry,
    stream_index: Option<Arc<dyn StreamIndex>>,

    num_senders: usize,
    num_participants: Option<usize>,
    should_disable_simulcast: bool,
    last_uplink_kbps: f64,
    start_time: Option<Instant>,
    last_transition: Instant,

    current_layer_set: ActiveLayerSet,
    proposed_layer_set: ActiveLayerSet,
    published_layer_set: Option<ActiveLayerSet>,
    current_params: EncodingParameterSet,
    proposed_params: EncodingParameterSet,
    /// The pending proposal came from a bandwidth sample, not a count change
    proposed_from_sample: bool,
    last_descriptors: Vec<StreamDescriptor>,
}

impl SimulcastUplinkPolicy {
    #[must_use]
    pub fn new(config: UplinkPolicyConfig, self_id: AttendeeId) -> Self {
        let (layer_set, bitrates) = (ActiveLayerSet::HiAndLow, [300, 0, 1200]);
        let params = EncodingParameterSet::from_bitrates(bitrates, false);
        let last_uplink_kbps = config.default_uplink_kbps;

        Self {
            config,
            self_id,
            observers: ObserverRegistry::new(),
            stream_index: None,
            num_senders: 0,
            num_participants: None,
            should_disable_simulcast: false,
            last_uplink_kbps,
            start_time: None,
            last_transition: Instant::now(),
            current_layer_set: layer_set,
            proposed_layer_set: layer_set,
            published_layer_set: None,
            current_params: params.clone(),
            proposed_params: params,
            proposed_from_sample: false,
            last_descriptors: Vec::new(),
        }
    }

    /// Feed one bandwidth estimate into the control loop
    pub fn update_connection_metric(&mut self, sample: BandwidthSample) {
        if !sample.is_valid() {
            trace!(uplink_kbps = sample.uplink_kbps, "Ignoring invalid bandwidth sample");
            return;
        }

        let start = *self.start_time.get_or_insert(sample.observed_at);
        let kbps = if sample.observed_at.saturating_duration_since(start)
            < self.config.startup_duration()
        {
            self.config.default_uplink_kbps
        } else {
            sample.uplink_kbps
        };

        let previous_kbps = self.last_uplink_kbps;
        self.last_uplink_kbps = kbps;

        let since_transition = sample.observed_at.saturating_duration_since(self.last_transition);
        let hold_down = self.hold_down(kbps);
        if since_transition < hold_down {
            debug!(
                uplink_kbps = kbps,
                remaining_ms = (hold_down - since_transition).as_millis() as u64,
                "Bandwidth sample within hold-down"
            );
            return;
        }

        if self.passes_hysteresis(kbps, previous_kbps) {
            self.propose(kbps);
            self.proposed_from_sample = true;
        } else if self.proposed_from_sample {
            self.withdraw_proposal(kbps);
        }
    }

    /// Pick up participant and sender counts from the stream index
    ///
    /// A change in either count recomputes the proposal immediately, ignoring
    /// hold-down and hysteresis.
    pub fn update_index(&mut self, index: Arc<dyn StreamIndex>) {
        let num_senders = index.number_of_publishing_participants_excluding_self(&self.self_id) + 1;
        let num_participants = index.number_of_participants();
        self.stream_index = Some(index);

        if num_senders == self.num_senders && num_participants == self.num_participants {
            return;
        }

        self.num_senders = num_senders;
        self.num_participants = num_participants;
        self.should_disable_simulcast =
            matches!(num_participants, Some(n) if n <= MAX_PARTICIPANTS_WITHOUT_SIMULCAST);
        debug!(
            num_senders,
            ?num_participants,
            should_disable_simulcast = self.should_disable_simulcast,
            "Stream index counts changed"
        );
        self.propose(self.last_uplink_kbps);
        self.proposed_from_sample = false;
    }

    /// Commit the latest proposal and return it
    ///
    /// Observers are notified asynchronously when the committed layer set
    /// differs from the one last published to them.
    pub fn choose_encoding_parameters(&mut self) -> EncodingParameterSet {
        self.current_layer_set = self.proposed_layer_set;
        self.current_params = self.proposed_params.clone();
        self.proposed_from_sample = false;

        if self.published_layer_set != Some(self.current_layer_set) {
            self.published_layer_set = Some(self.current_layer_set);
            let descriptor = LayerSetDescriptor {
                layer_set: self.current_layer_set,
                active_layers: self.current_params.active_layers(),
            };
            let scheduled = self.observers.notify(&descriptor);
            info!(
                layer_set = %descriptor.layer_set,
                observers = scheduled,
                "Published simulcast layer set"
            );
        }

        self.current_params.clone()
    }

    /// Whether the session should renegotiate its uplink
    ///
    /// True while the proposal differs from the committed parameters, or when
    /// a local stream's runtime-disabled flag flipped since the last call.
    pub fn wants_resubscribe(&mut self) -> bool {
        let descriptors = self
            .stream_index
            .as_ref()
            .map(|index| index.local_stream_descriptors())
            .unwrap_or_default();

        let flipped = descriptors.iter().filter(|d| d.stream_id != 0).any(|d| {
            self.last_descriptors
                .iter()
                .any(|prev| prev.stream_id == d.stream_id && prev.disabled_by_runtime != d.disabled_by_runtime)
        });
        self.last_descriptors = descriptors;

        let wants = flipped || self.proposed_params != self.current_params;
        if wants {
            self.last_transition = Instant::now();
            debug!(
                flipped,
                proposed = %self.proposed_layer_set,
                current = %self.current_layer_set,
                "Uplink wants resubscribe"
            );
        }
        wants
    }

    /// Capture settings matching the current proposal
    #[must_use]
    pub fn choose_capture_and_encode_parameters(&self) -> VideoCaptureAndEncodeParameter {
        VideoCaptureAndEncodeParameter {
            width: CAPTURE_WIDTH,
            height: CAPTURE_HEIGHT,
            frame_rate: self.config.default_max_frame_rate,
            max_encode_bitrate_kbps: u32::try_from(self.max_bandwidth_kbps()).unwrap_or(u32::MAX),
            simulcast: !self.should_disable_simulcast,
        }
    }

    /// Sum of the proposed active layers' bitrates
    #[must_use]
    pub fn max_bandwidth_kbps(&self) -> u64 {
        self.proposed_params.total_active_bitrate_kbps()
    }

    pub fn add_observer(&self, observer: Arc<dyn SimulcastUplinkObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    #[must_use]
    pub const fn current_layer_set(&self) -> ActiveLayerSet {
        self.current_layer_set
    }

    #[must_use]
    pub const fn proposed_layer_set(&self) -> ActiveLayerSet {
        self.proposed_layer_set
    }

    #[must_use]
    pub const fn proposed_params(&self) -> &EncodingParameterSet {
        &self.proposed_params
    }

    #[must_use]
    pub const fn should_disable_simulcast(&self) -> bool {
        self.should_disable_simulcast
    }

    #[must_use]
    pub const fn num_senders(&self) -> usize {
        self.num_senders
    }

    /// Effective bandwidth of the last accepted sample
    #[must_use]
    pub const fn last_uplink_kbps(&self) -> f64 {
        self.last_uplink_kbps
    }

    fn hold_down(&self, kbps: f64) -> Duration {
        let base = self.config.hold_down_duration();
        match self.current_layer_set {
            ActiveLayerSet::Low => base * 2,
            ActiveLayerSet::HiAndLow if kbps <= HI_DISABLED_RATE_KBPS => base / 2,
            ActiveLayerSet::MidAndLow if kbps <= MID_DISABLED_RATE_KBPS => base / 2,
            _ => base,
        }
    }

    fn passes_hysteresis(&self, kbps: f64, previous_kbps: f64) -> bool {
        match self.current_layer_set {
            ActiveLayerSet::Hi => kbps >= previous_kbps + 1.0,
            ActiveLayerSet::HiAndLow => {
                kbps >= HI_AND_LOW_INCREASE_KBPS || kbps <= HI_DISABLED_RATE_KBPS
            }
            ActiveLayerSet::MidAndLow => {
                kbps >= MID_AND_LOW_INCREASE_KBPS || kbps <= MID_DISABLED_RATE_KBPS
            }
            ActiveLayerSet::Low => kbps >= LOW_INCREASE_KBPS,
        }
    }

    fn decide(&self, kbps: f64) -> (ActiveLayerSet, [u32; 3]) {
        if self.should_disable_simulcast {
            // Mid only: starting a single high layer at low bandwidth trips
            // an encoder reset
            return (ActiveLayerSet::Hi, [0, 1200, 0]);
        }
        if self.num_senders <= MAX_HI_AND_LOW_SENDERS && kbps >= HI_DISABLED_RATE_KBPS {
            return (ActiveLayerSet::HiAndLow, [300, 0, 1200]);
        }
        if kbps >= MID_DISABLED_RATE_KBPS {
            let low = if kbps >= LOW_LAYER_BOOST_KBPS { 200 } else { 150 };
            let mid = if self.num_senders <= MAX_FULL_RATE_MID_SENDERS {
                600
            } else {
                350
            };
            return (ActiveLayerSet::MidAndLow, [low, mid, 0]);
        }
        (ActiveLayerSet::Low, [300, 0, 0])
    }

    fn propose(&mut self, kbps: f64) {
        let (layer_set, bitrates) = self.decide(kbps);
        let params = EncodingParameterSet::from_bitrates(bitrates, self.should_disable_simulcast);
        if layer_set != self.proposed_layer_set || params != self.proposed_params {
            info!(
                from = %self.proposed_layer_set,
                to = %layer_set,
                uplink_kbps = kbps,
                num_senders = self.num_senders,
                "Proposing new simulcast layer set"
            );
        }
        self.proposed_layer_set = layer_set;
        self.proposed_params = params;
    }

    /// A newer sample sits inside the committed tier's band, so an
    /// uncommitted bandwidth-driven proposal no longer holds
    fn withdraw_proposal(&mut self, kbps: f64) {
        if self.proposed_params != self.current_params {
            debug!(
                withdrawn = %self.proposed_layer_set,
                current = %self.current_layer_set,
                uplink_kbps = kbps,
                "Withdrawing stale simulcast proposal"
            );
        }
        self.proposed_layer_set = self.current_layer_set;
        self.proposed_params = self.current_params.clone();
        self.proposed_from_sample = false;
    }
}
