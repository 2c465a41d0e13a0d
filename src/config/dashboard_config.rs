use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Gauge animation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Render ticks per second
    pub frame_rate_hz: u32,
    /// Telemetry is folded into the gauges at most once per this interval.
    pub coalesce_interval_ms: u64,
    /// Ticks for the speedometer dial to morph between mode profiles
    pub dial_responsiveness: u32,
    /// Ticks for the gear selector to slide between modes
    pub gear_responsiveness: u32,
    /// Ticks for needles and bars to follow new readings
    pub needle_responsiveness: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            frame_rate_hz: 60,
            coalesce_interval_ms: 100,
            dial_responsiveness: 3,
            gear_responsiveness: 3,
            needle_responsiveness: 1,
        }
    }
}

impl DashboardConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate_hz.max(1)
    }

    pub fn coalesce_interval(&self) -> Duration {
        Duration::from_millis(self.coalesce_interval_ms)
    }

    pub fn dial(&self) -> NonZeroU32 {
        responsiveness(self.dial_responsiveness)
    }

    pub fn gear(&self) -> NonZeroU32 {
        responsiveness(self.gear_responsiveness)
    }

    pub fn needle(&self) -> NonZeroU32 {
        responsiveness(self.needle_responsiveness)
    }
}

// Zero would divide by zero in the approach law; treat it as "snap".
fn responsiveness(ticks: u32) -> NonZeroU32 {
    NonZeroU32::new(ticks).unwrap_or(NonZeroU32::MIN)
}
