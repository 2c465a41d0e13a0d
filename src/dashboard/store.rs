//! Latest value per telemetry key
//! The store is a registry subscriber; the render pipeline drains its dirty
//! set and the console reads it directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::core::frame::{DrivingMode, TelemetryFrame, TelemetryKey, TelemetryValue};
use crate::core::registry::{ChannelRegistry, SubscriptionId};

#[derive(Default)]
struct StoreInner {
    values: BTreeMap<TelemetryKey, TelemetryValue>,
    dirty: BTreeSet<TelemetryKey>,
}

/// Shared telemetry map. Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<StoreInner>>,
}

/// Every channel with its current value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub mode: DrivingMode,
    pub analog_throttle: f64,
    pub analog_brake: f64,
    pub analog_steer: f64,
    pub cumulated_power: f64,
    pub turning_level: f64,
    pub left_motor: f64,
    pub right_motor: f64,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes the store to `registry`.
    pub fn attach(&self, registry: &ChannelRegistry) -> SubscriptionId {
        let store = self.clone();
        registry.subscribe(move |frame| store.record(frame))
    }

    pub fn record(&self, frame: &TelemetryFrame) {
        let mut inner = self.lock();
        inner.values.insert(frame.key, frame.value);
        inner.dirty.insert(frame.key);
    }

    pub fn get(&self, key: TelemetryKey) -> Option<TelemetryValue> {
        self.lock().values.get(&key).copied()
    }

    /// Every key seen so far, in key order.
    pub fn entries(&self) -> Vec<(TelemetryKey, TelemetryValue)> {
        self.lock()
            .values
            .iter()
            .map(|(key, value)| (*key, *value))
            .collect()
    }

    /// Returns the keys updated since the last call, with their latest values.
    pub fn take_dirty(&self) -> Vec<(TelemetryKey, TelemetryValue)> {
        let mut inner = self.lock();
        let dirty = std::mem::take(&mut inner.dirty);
        dirty
            .into_iter()
            .filter_map(|key| inner.values.get(&key).map(|value| (key, *value)))
            .collect()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let inner = self.lock();
        let scalar = |key| {
            inner
                .values
                .get(&key)
                .and_then(TelemetryValue::as_scalar)
                .unwrap_or(0.0)
        };
        TelemetrySnapshot {
            mode: inner
                .values
                .get(&TelemetryKey::Mode)
                .and_then(TelemetryValue::as_mode)
                .unwrap_or_default(),
            analog_throttle: scalar(TelemetryKey::AnalogThrottle),
            analog_brake: scalar(TelemetryKey::AnalogBrake),
            analog_steer: scalar(TelemetryKey::AnalogSteer),
            cumulated_power: scalar(TelemetryKey::CumulatedPower),
            turning_level: scalar(TelemetryKey::TurningLevel),
            left_motor: scalar(TelemetryKey::LeftMotor),
            right_motor: scalar(TelemetryKey::RightMotor),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.values.clear();
        inner.dirty.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::decode;

    #[test]
    fn snapshot_defaults_before_any_frame() {
        let snapshot = TelemetryStore::new().snapshot();
        assert_eq!(snapshot.mode, DrivingMode::Park);
        assert_eq!(snapshot.cumulated_power, 0.0);
        assert_eq!(snapshot.analog_steer, 0.0);
    }

    #[test]
    fn keeps_last_value_and_reports_dirty_once() {
        let registry = ChannelRegistry::new();
        let store = TelemetryStore::new();
        store.attach(&registry);

        for text in ["CUMULATED_POWER=0.2", "CUMULATED_POWER=0.4", "MODE=S+"] {
            registry.publish(&decode(text).unwrap());
        }

        let dirty = store.take_dirty();
        assert_eq!(
            dirty,
            vec![
                (TelemetryKey::Mode, TelemetryValue::Mode(DrivingMode::SportPlus)),
                (TelemetryKey::CumulatedPower, TelemetryValue::Scalar(0.4)),
            ]
        );
        assert!(store.take_dirty().is_empty());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.mode, DrivingMode::SportPlus);
        assert_eq!(snapshot.cumulated_power, 0.4);
    }
}
