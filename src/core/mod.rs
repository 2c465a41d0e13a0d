//! Core functionality for the AMG telemetry bridge
//! This module contains the radio link, the frame decoder, the channel
//! registry and the smoothing engine.

pub mod bluetooth;
pub mod frame;
pub mod registry;
pub mod smoothing;

// Re-export commonly used types
pub use bluetooth::{ConnectionSupervisor, LinkError, LinkState, LinkStatus};
pub use frame::{DrivingMode, TelemetryFrame, TelemetryKey, TelemetryValue};
pub use registry::{ChannelRegistry, SubscriptionId};
pub use smoothing::{Interpolate, SmoothingEngine, Transition};
