//! Constants used throughout the link layer
//! Device naming, timeouts and polling intervals.

use std::time::Duration;

/// The advertised name of the telemetry sensor unit
pub const DEVICE_NAME: &str = "ESP32_BLE_AMG";

/// Default time allowed for a standalone scan
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for a full reset/scan/connect cycle
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between liveness checks
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_millis(1000);

/// Upper bound on a best-effort disconnect, so reset never hangs
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on waiting for the adapter to report itself ready
pub const ADAPTER_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before starting a new scan cycle when the previous one ended early
pub const SCAN_CYCLE_PAUSE: Duration = Duration::from_millis(250);

/// Default payload for keepalive pings
pub const DEFAULT_KEEPALIVE_PAYLOAD: &str = "PING";

/// Capacity of the channels bridging transport tasks to the supervisor
pub const TRANSPORT_CHANNEL_CAPACITY: usize = 32;
