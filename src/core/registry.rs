//! Fan-out of decoded telemetry frames
//! Independent consumers (the live dashboard, the diagnostic console) each
//! register a callback and observe the same decoded stream.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::core::frame::TelemetryFrame;

/// Callback invoked for every published frame. Runs on the notification
/// task, so it must return quickly and never block.
pub type FrameCallback = Arc<dyn Fn(&TelemetryFrame) + Send + Sync>;

/// Opaque handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber registry. Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    // Ids are handed out in increasing order, so iteration is registration order.
    subscribers: Mutex<BTreeMap<SubscriptionId, FrameCallback>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback and returns the handle needed to remove it.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TelemetryFrame) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers().insert(id, Arc::new(callback));
        debug!("Registered telemetry subscriber {:?}", id);
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!("Unregistered telemetry subscriber {:?}", id);
        }
        removed
    }

    /// Delivers `frame` to every current subscriber, in registration order.
    ///
    /// Callbacks run against a snapshot of the subscriber list, so a callback
    /// may subscribe or unsubscribe without deadlocking; such changes apply
    /// from the next publish.
    pub fn publish(&self, frame: &TelemetryFrame) {
        let snapshot: Vec<FrameCallback> = self.subscribers().values().cloned().collect();
        for callback in snapshot {
            callback(frame);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers().is_empty()
    }

    fn subscribers(&self) -> MutexGuard<'_, BTreeMap<SubscriptionId, FrameCallback>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
