//! Observers of the uplink policy's layer-set changes

use crate::layer::{ActiveLayerSet, LayerId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Layer set that was just committed, with the layers it actually sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSetDescriptor {
    pub layer_set: ActiveLayerSet,
    pub active_layers: Vec<LayerId>,
}

pub trait SimulcastUplinkObserver: Send + Sync {
    fn layer_set_did_change(&self, descriptor: LayerSetDescriptor);
}

/// Handle returned on registration; ids are never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    observers: Vec<(ObserverId, Arc<dyn SimulcastUplinkObserver>)>,
}

/// Observer set with fire-and-forget notification
///
/// Every notification is a separate runtime task that looks its observer up
/// again right before invoking it, so an observer removed after the
/// notification was scheduled is never called.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn SimulcastUplinkObserver>) -> ObserverId {
        let mut inner = self.inner.lock();
        let id = ObserverId(inner.next_id);
        inner.next_id += 1;
        inner.observers.push((id, observer));
        id
    }

    /// Returns false if the observer was not registered
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(other, _)| *other != id);
        inner.observers.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: ObserverId) -> Option<Arc<dyn SimulcastUplinkObserver>> {
        self.inner
            .lock()
            .observers
            .iter()
            .find(|(other, _)| *other == id)
            .map(|(_, observer)| Arc::clone(observer))
    }

    /// Schedule one notification per registered observer
    ///
    /// Returns the number of notifications scheduled. Outside a Tokio runtime
    /// nothing can be scheduled and the notification is dropped.
    pub fn notify(&self, descriptor: &LayerSetDescriptor) -> usize {
        let Ok(handle) = Handle::try_current() else {
            warn!(
                layer_set = %descriptor.layer_set,
                "No runtime available, dropping layer set notification"
            );
            return 0;
        };

        let ids: Vec<ObserverId> = self
            .inner
            .lock()
            .observers
            .iter()
            .map(|(id, _)| *id)
            .collect();

        for &id in &ids {
            let registry = self.clone();
            let descriptor = descriptor.clone();
            handle.spawn(async move {
                match registry.get(id) {
                    Some(observer) => observer.layer_set_did_change(descriptor),
                    None => debug!(?id, "Observer removed before notification"),
                }
            });
        }
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<LayerSetDescriptor>>);

    impl SimulcastUplinkObserver for Recorder {
        fn layer_set_did_change(&self, descriptor: LayerSetDescriptor) {
            self.0.lock().push(descriptor);
        }
    }

    async fn drain_spawned() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn descriptor() -> LayerSetDescriptor {
        LayerSetDescriptor {
            layer_set: ActiveLayerSet::MidAndLow,
            active_layers: vec![LayerId::Low, LayerId::Mid],
        }
    }

    #[tokio::test]
    async fn test_notify_is_async_and_reaches_observer() {
        let registry = ObserverRegistry::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        registry.add(recorder.clone());

        assert_eq!(registry.notify(&descriptor()), 1);
        // Current-thread runtime: nothing ran yet
        assert!(recorder.0.lock().is_empty());

        drain_spawned().await;
        assert_eq!(recorder.0.lock().as_slice(), &[descriptor()]);
    }

    #[tokio::test]
    async fn test_removed_observer_never_fires() {
        let registry = ObserverRegistry::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let id = registry.add(recorder.clone());

        registry.notify(&descriptor());
        assert!(registry.remove(id));
        assert!(!registry.remove(id));

        drain_spawned().await;
        assert!(recorder.0.lock().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_notify_without_runtime_is_dropped() {
        let registry = ObserverRegistry::new();
        registry.add(Arc::new(Recorder(Mutex::new(Vec::new()))));
        assert_eq!(registry.notify(&descriptor()), 0);
    }
}
