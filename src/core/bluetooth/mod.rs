//! Bluetooth link to the telemetry sensor unit
//! This module handles scanning for, connecting to and supervising the
//! peripheral, and feeds its notifications into the channel registry.

mod bluest_transport;
mod constants;
mod error;
mod monitor;
mod supervisor;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use bluest_transport::BluestTransport;
pub use constants::*; // Re-export all constants
pub use error::LinkError;
pub use monitor::{run_keepalive, LivenessMonitor, PollOutcome};
pub use supervisor::ConnectionSupervisor;
pub use transport::{AdvertisementStream, NotificationStream, RadioTransport};
pub use types::{
    select_characteristic, CharacteristicFlags, CharacteristicInfo, LinkState, LinkStatus,
    PeripheralHandle,
};
