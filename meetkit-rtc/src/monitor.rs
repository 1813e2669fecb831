//! Uplink bandwidth feed
//!
//! Drains bandwidth estimates from the media stack into the shared
//! [`SimulcastUplinkPolicy`] in arrival order. The loop stops when every
//! sender is dropped or on [`UplinkMonitor::shutdown`].

use crate::policy::{BandwidthSample, SimulcastUplinkPolicy};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Policy handle shared between the monitor loop and the session driver
pub type SharedPolicy = Arc<Mutex<SimulcastUplinkPolicy>>;

pub struct UplinkMonitor {
    policy: SharedPolicy,
    cancel_token: CancellationToken,
}

impl UplinkMonitor {
    #[must_use]
    pub fn new(policy: SharedPolicy) -> Self {
        Self {
            policy,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SharedPolicy {
        &self.policy
    }

    /// Start the feed loop
    ///
    /// Returns the `JoinHandle` so the caller can detect completion.
    pub fn start(&self, mut samples: mpsc::Receiver<BandwidthSample>) -> JoinHandle<()> {
        let policy = self.policy.clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!("Uplink monitor shutting down");
                        return;
                    }
                    sample = samples.recv() => {
                        let Some(sample) = sample else {
                            tracing::debug!("Bandwidth sample feed closed");
                            return;
                        };
                        Self::apply(&policy, sample);
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    fn apply(policy: &SharedPolicy, sample: BandwidthSample) {
        let mut policy = policy.lock();
        let before = policy.proposed_layer_set();
        policy.update_connection_metric(sample);
        let after = policy.proposed_layer_set();
        if before != after {
            tracing::debug!(
                uplink_kbps = sample.uplink_kbps,
                from = %before,
                to = %after,
                "Uplink proposal changed"
            );
        }
    }
}

impl Drop for UplinkMonitor {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
