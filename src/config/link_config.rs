use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{
    DEFAULT_KEEPALIVE_PAYLOAD, DEFAULT_LIVENESS_INTERVAL, DEFAULT_RECONNECT_TIMEOUT,
    DEFAULT_SCAN_TIMEOUT, DEVICE_NAME,
};

/// Radio link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Advertised name of the peripheral to connect to
    pub device_name: String,
    pub scan_timeout_secs: u64,
    /// Budget for a whole reset/scan/connect cycle
    pub reconnect_timeout_secs: u64,
    pub liveness_interval_ms: u64,
    /// Keepalive pings are disabled when unset.
    pub keepalive_interval_secs: Option<u64>,
    pub keepalive_payload: String,
    /// Advertisements weaker than this are ignored.
    pub min_rssi: Option<i16>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            device_name: DEVICE_NAME.to_string(),
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT.as_secs(),
            reconnect_timeout_secs: DEFAULT_RECONNECT_TIMEOUT.as_secs(),
            liveness_interval_ms: DEFAULT_LIVENESS_INTERVAL.as_millis() as u64,
            keepalive_interval_secs: None,
            keepalive_payload: DEFAULT_KEEPALIVE_PAYLOAD.to_string(),
            min_rssi: None,
        }
    }
}

impl LinkConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }

    /// Never shorter than 1 ms, since a zero interval cannot be ticked.
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(1))
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        self.keepalive_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
