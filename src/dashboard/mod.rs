//! Live dashboard model
//! Turns the decoded telemetry stream into smoothed gauge readouts.

pub mod animator;
pub mod profile;
pub mod render;
pub mod store;

pub use animator::{GaugeAnimator, GaugeChannel, GaugeReadout};
pub use profile::DialProfile;
pub use render::{RenderPipeline, RenderThread};
pub use store::{TelemetrySnapshot, TelemetryStore};
