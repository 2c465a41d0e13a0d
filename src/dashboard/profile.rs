//! Speedometer dial geometry per driving mode

use serde::Serialize;

use crate::core::frame::DrivingMode;
use crate::core::smoothing::{lerp, Interpolate};

/// Sweep and scale of the speedometer dial. Angles are in degrees, 0 pointing up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DialProfile {
    pub start_angle: f64,
    pub end_angle: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Readings at or above this are drawn in red
    pub red_line: f64,
}

impl DialProfile {
    const fn sweep(start_angle: f64, end_angle: f64, red_line: f64) -> Self {
        Self {
            start_angle,
            end_angle,
            min: 0.0,
            max: 8.0,
            step: 1.0,
            red_line,
        }
    }

    pub fn for_mode(mode: DrivingMode) -> Self {
        match mode {
            DrivingMode::Park => Self::sweep(-135.0, 135.0, 0.0),
            DrivingMode::Track => Self::sweep(-45.0, 45.0, 4.0),
            DrivingMode::Reverse | DrivingMode::Drive => Self::sweep(-135.0, 135.0, 4.0),
            DrivingMode::Sport => Self::sweep(-135.0, 135.0, 6.0),
            DrivingMode::SportPlus => Self::sweep(-90.0, 90.0, 8.0),
        }
    }

    /// Needle angle for `value`, clamped to the dial's range.
    pub fn needle_angle(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 || value.is_nan() {
            return self.start_angle;
        }
        let fraction = ((value - self.min) / span).clamp(0.0, 1.0);
        self.start_angle + (self.end_angle - self.start_angle) * fraction
    }

    pub fn is_red(&self, value: f64) -> bool {
        self.red_line > self.min && value >= self.red_line
    }
}

impl Default for DialProfile {
    fn default() -> Self {
        Self::for_mode(DrivingMode::default())
    }
}

impl Interpolate for DialProfile {
    fn interpolate(from: &Self, to: &Self, progress: f64) -> Self {
        Self {
            start_angle: lerp(from.start_angle, to.start_angle, progress),
            end_angle: lerp(from.end_angle, to.end_angle, progress),
            min: lerp(from.min, to.min, progress),
            max: lerp(from.max, to.max, progress),
            step: lerp(from.step, to.step, progress),
            red_line: lerp(from.red_line, to.red_line, progress),
        }
    }
}
