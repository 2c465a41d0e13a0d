//! Gauge animation state
//! Maps telemetry onto gauge channels and eases every gauge, plus the dial
//! geometry, towards its latest target one render tick at a time.

use serde::Serialize;

use crate::config::dashboard_config::DashboardConfig;
use crate::core::frame::{DrivingMode, TelemetryKey, TelemetryValue};
use crate::core::smoothing::{SmoothingEngine, Transition};
use crate::dashboard::profile::DialProfile;

/// Speedometer reading for full cumulated power
const SPEED_SCALE: f64 = 8.0;

/// A smoothed dashboard element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GaugeChannel {
    Power,
    Throttle,
    Brake,
    Steer,
    TurningLevel,
    LeftMotor,
    RightMotor,
    /// Gear selector position, the mode's index in `T P R D S S+`
    Gear,
}

impl GaugeChannel {
    pub const ALL: [GaugeChannel; 8] = [
        Self::Power,
        Self::Throttle,
        Self::Brake,
        Self::Steer,
        Self::TurningLevel,
        Self::LeftMotor,
        Self::RightMotor,
        Self::Gear,
    ];

    pub fn for_key(key: TelemetryKey) -> Self {
        match key {
            TelemetryKey::Mode => Self::Gear,
            TelemetryKey::AnalogThrottle => Self::Throttle,
            TelemetryKey::AnalogBrake => Self::Brake,
            TelemetryKey::AnalogSteer => Self::Steer,
            TelemetryKey::CumulatedPower => Self::Power,
            TelemetryKey::TurningLevel => Self::TurningLevel,
            TelemetryKey::LeftMotor => Self::LeftMotor,
            TelemetryKey::RightMotor => Self::RightMotor,
        }
    }
}

/// What the dashboard draws for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeReadout {
    pub mode: DrivingMode,
    pub gear_position: f64,
    pub speed: f64,
    pub needle_angle: f64,
    pub red_zone: bool,
    pub dial: DialProfile,
    pub throttle: f64,
    pub brake: f64,
    pub steer: f64,
    pub turning_level: f64,
    pub left_motor: f64,
    pub right_motor: f64,
    pub settled: bool,
}

impl Default for GaugeReadout {
    fn default() -> Self {
        GaugeAnimator::new(&DashboardConfig::default()).readout()
    }
}

pub struct GaugeAnimator {
    gauges: SmoothingEngine<GaugeChannel, f64>,
    dial: Transition<DialProfile>,
    mode: DrivingMode,
}

impl GaugeAnimator {
    pub fn new(config: &DashboardConfig) -> Self {
        let mode = DrivingMode::default();
        let mut gauges = SmoothingEngine::new(config.needle());
        gauges.set_responsiveness(GaugeChannel::Gear, config.gear());
        for channel in GaugeChannel::ALL {
            gauges.insert(channel, 0.0);
        }
        gauges.insert(GaugeChannel::Gear, mode.index() as f64);

        Self {
            gauges,
            dial: Transition::at_rest(DialProfile::for_mode(mode), config.dial()),
            mode,
        }
    }

    /// Points the gauge fed by `key` at `value`.
    pub fn apply(&mut self, key: TelemetryKey, value: TelemetryValue) {
        match value {
            TelemetryValue::Mode(mode) => {
                if mode != self.mode {
                    self.mode = mode;
                    self.dial.retarget(DialProfile::for_mode(mode));
                }
                self.gauges.set_target(GaugeChannel::Gear, mode.index() as f64);
            }
            TelemetryValue::Scalar(v) => self.gauges.set_target(GaugeChannel::for_key(key), v),
        }
    }

    pub fn tick(&mut self) {
        self.gauges.tick();
        self.dial.tick();
    }

    pub fn is_settled(&self) -> bool {
        self.gauges.is_settled() && self.dial.is_settled()
    }

    pub fn readout(&self) -> GaugeReadout {
        let gauge = |channel| self.gauges.displayed(&channel).unwrap_or_default();
        let dial = self.dial.displayed();
        let speed = gauge(GaugeChannel::Power) * SPEED_SCALE;

        GaugeReadout {
            mode: self.mode,
            gear_position: gauge(GaugeChannel::Gear),
            speed,
            needle_angle: dial.needle_angle(speed),
            red_zone: dial.is_red(speed),
            dial,
            throttle: gauge(GaugeChannel::Throttle),
            brake: gauge(GaugeChannel::Brake),
            steer: gauge(GaugeChannel::Steer),
            turning_level: gauge(GaugeChannel::TurningLevel),
            left_motor: gauge(GaugeChannel::LeftMotor),
            right_motor: gauge(GaugeChannel::RightMotor),
            settled: self.is_settled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snappy() -> DashboardConfig {
        DashboardConfig {
            dial_responsiveness: 1,
            gear_responsiveness: 1,
            needle_responsiveness: 1,
            ..Default::default()
        }
    }

    #[test]
    fn starts_parked_and_settled() {
        let readout = GaugeAnimator::new(&DashboardConfig::default()).readout();
        assert_eq!(readout.mode, DrivingMode::Park);
        assert_eq!(readout.gear_position, 1.0);
        assert_eq!(readout.speed, 0.0);
        assert_eq!(readout.needle_angle, -135.0);
        assert!(readout.settled);
    }

    #[test]
    fn mode_change_morphs_the_dial() {
        let mut animator = GaugeAnimator::new(&DashboardConfig::default());
        animator.apply(TelemetryKey::Mode, TelemetryValue::Mode(DrivingMode::SportPlus));

        let before = animator.readout();
        assert_eq!(before.mode, DrivingMode::SportPlus);
        assert_eq!(before.dial, DialProfile::for_mode(DrivingMode::Park));
        assert!(!before.settled);

        animator.tick();
        let moving = animator.readout().dial.start_angle;
        assert!(moving > -135.0 && moving < -90.0);

        for _ in 0..20 {
            animator.tick();
        }
        let after = animator.readout();
        assert_eq!(after.dial, DialProfile::for_mode(DrivingMode::SportPlus));
        assert_eq!(after.gear_position, 5.0);
        assert!(after.settled);
    }

    #[test]
    fn default_needles_follow_in_one_tick() {
        let mut animator = GaugeAnimator::new(&DashboardConfig::default());
        animator.apply(TelemetryKey::CumulatedPower, TelemetryValue::Scalar(0.5));
        animator.apply(TelemetryKey::AnalogThrottle, TelemetryValue::Scalar(0.8));
        animator.tick();

        let readout = animator.readout();
        assert_eq!(readout.speed, 4.0);
        assert_eq!(readout.throttle, 0.8);
    }

    #[test]
    fn power_drives_speed_and_needle() {
        let mut animator = GaugeAnimator::new(&snappy());
        animator.apply(TelemetryKey::Mode, TelemetryValue::Mode(DrivingMode::Drive));
        animator.apply(TelemetryKey::CumulatedPower, TelemetryValue::Scalar(0.5));
        animator.tick();

        let readout = animator.readout();
        assert_eq!(readout.speed, 4.0);
        assert_eq!(readout.needle_angle, 0.0);
        assert!(readout.red_zone);
    }

    #[test]
    fn scalar_keys_feed_their_own_gauges() {
        let mut animator = GaugeAnimator::new(&snappy());
        animator.apply(TelemetryKey::AnalogSteer, TelemetryValue::Scalar(-0.5));
        animator.apply(TelemetryKey::LeftMotor, TelemetryValue::Scalar(1.0));
        animator.tick();

        let readout = animator.readout();
        assert_eq!(readout.steer, -0.5);
        assert_eq!(readout.left_motor, 1.0);
        assert_eq!(readout.right_motor, 0.0);
    }
}
