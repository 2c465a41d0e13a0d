//! Telemetry frame decoding
//! This module turns a single `KEY=VALUE` text frame received from the sensor
//! unit into a typed, range-validated telemetry value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Full scale of the analog pedal sensors.
const PEDAL_FULL_SCALE: f64 = 500.0;
/// Raw steering reading when the wheel is centered.
const STEER_CENTER: f64 = 512.0;
/// Largest raw steering reading the sensor produces.
const STEER_MAX: f64 = 1024.0;
/// Full scale of the motor drivers' PWM duty.
const MOTOR_FULL_SCALE: f64 = 255.0;

/// Driving mode reported by the vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrivingMode {
    #[serde(rename = "T")]
    Track,
    #[default]
    #[serde(rename = "P")]
    Park,
    #[serde(rename = "R")]
    Reverse,
    #[serde(rename = "D")]
    Drive,
    #[serde(rename = "S")]
    Sport,
    #[serde(rename = "S+")]
    SportPlus,
}

impl DrivingMode {
    /// Modes in the order the gear selector lays them out.
    pub const ALL: [DrivingMode; 6] = [
        Self::Track,
        Self::Park,
        Self::Reverse,
        Self::Drive,
        Self::Sport,
        Self::SportPlus,
    ];

    /// The symbol used on the wire and on the gear selector
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Track => "T",
            Self::Park => "P",
            Self::Reverse => "R",
            Self::Drive => "D",
            Self::Sport => "S",
            Self::SportPlus => "S+",
        }
    }

    /// Position of this mode on the gear selector
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|mode| mode == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for DrivingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for DrivingMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.symbol() == s)
            .ok_or(())
    }
}

/// The fixed vocabulary of telemetry keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryKey {
    Mode,
    AnalogThrottle,
    AnalogBrake,
    AnalogSteer,
    CumulatedPower,
    TurningLevel,
    LeftMotor,
    RightMotor,
}

impl TelemetryKey {
    pub const ALL: [TelemetryKey; 8] = [
        Self::Mode,
        Self::AnalogThrottle,
        Self::AnalogBrake,
        Self::AnalogSteer,
        Self::CumulatedPower,
        Self::TurningLevel,
        Self::LeftMotor,
        Self::RightMotor,
    ];

    /// The key as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mode => "MODE",
            Self::AnalogThrottle => "ANALOG_THROTTLE",
            Self::AnalogBrake => "ANALOG_BRAKE",
            Self::AnalogSteer => "ANALOG_STEER",
            Self::CumulatedPower => "CUMULATED_POWER",
            Self::TurningLevel => "TURNING_LEVEL",
            Self::LeftMotor => "LEFT_MOTOR",
            Self::RightMotor => "RIGHT_MOTOR",
        }
    }

    fn from_wire(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for TelemetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded telemetry value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Mode(DrivingMode),
    Scalar(f64),
}

impl TelemetryValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Mode(_) => None,
        }
    }

    pub fn as_mode(&self) -> Option<DrivingMode> {
        match self {
            Self::Mode(mode) => Some(*mode),
            Self::Scalar(_) => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode(mode) => write!(f, "{}", mode),
            Self::Scalar(v) => write!(f, "{}", v),
        }
    }
}

/// One decoded `KEY=VALUE` unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub key: TelemetryKey,
    pub value: TelemetryValue,
}

/// Why a frame was skipped. Skips are expected noise on a live radio link.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeSkip {
    #[error("frame has no '=' separator")]
    MissingSeparator,
    #[error("frame has an empty key")]
    EmptyKey,
    #[error("unknown telemetry key: {0}")]
    UnknownKey(String),
    #[error("value {value:?} for {key} is not a finite number")]
    InvalidNumber { key: TelemetryKey, value: String },
}

/// Decodes a single text frame.
pub fn decode(text: &str) -> Result<TelemetryFrame, DecodeSkip> {
    let (raw_key, raw_value) = text.split_once('=').ok_or(DecodeSkip::MissingSeparator)?;
    if raw_key.is_empty() {
        return Err(DecodeSkip::EmptyKey);
    }
    let key = TelemetryKey::from_wire(raw_key)
        .ok_or_else(|| DecodeSkip::UnknownKey(raw_key.to_string()))?;
    let raw_value = raw_value.trim();

    let value = match key {
        // Unrecognized modes fall back to Park rather than being forwarded.
        TelemetryKey::Mode => TelemetryValue::Mode(raw_value.parse().unwrap_or_default()),
        TelemetryKey::AnalogThrottle | TelemetryKey::AnalogBrake => {
            let v = parse_number(key, raw_value)?;
            TelemetryValue::Scalar((v / PEDAL_FULL_SCALE).clamp(0.0, 1.0))
        }
        TelemetryKey::AnalogSteer => {
            let v = parse_number(key, raw_value)?.clamp(0.0, STEER_MAX);
            TelemetryValue::Scalar((STEER_CENTER - v) / STEER_CENTER)
        }
        TelemetryKey::CumulatedPower | TelemetryKey::TurningLevel => {
            TelemetryValue::Scalar(parse_number(key, raw_value)?)
        }
        TelemetryKey::LeftMotor | TelemetryKey::RightMotor => {
            TelemetryValue::Scalar(parse_number(key, raw_value)? / MOTOR_FULL_SCALE)
        }
    };

    Ok(TelemetryFrame { key, value })
}

/// Decodes a raw notification payload. Trailing NULs and line terminators
/// some firmwares append are ignored.
pub fn decode_payload(payload: &[u8]) -> Result<TelemetryFrame, DecodeSkip> {
    let text = String::from_utf8_lossy(payload);
    decode(text.trim_end_matches(['\0', '\r', '\n']))
}

fn parse_number(key: TelemetryKey, value: &str) -> Result<f64, DecodeSkip> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeSkip::InvalidNumber {
            key,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(text: &str) -> f64 {
        decode(text)
            .expect("frame should decode")
            .value
            .as_scalar()
            .expect("expected a scalar value")
    }

    #[test]
    fn steering_maps_to_signed_unit_range() {
        assert_eq!(scalar("ANALOG_STEER=512"), 0.0);
        assert_eq!(scalar("ANALOG_STEER=0"), 1.0);
        assert_eq!(scalar("ANALOG_STEER=1024"), -1.0);
        assert_eq!(scalar("ANALOG_STEER=2000"), -1.0);
        assert_eq!(scalar("ANALOG_STEER=-40"), 1.0);
        assert_eq!(scalar("ANALOG_STEER=256"), 0.5);
    }

    #[test]
    fn pedals_are_scaled_and_clamped() {
        assert_eq!(scalar("ANALOG_THROTTLE=500"), 1.0);
        assert_eq!(scalar("ANALOG_THROTTLE=1000"), 1.0);
        assert_eq!(scalar("ANALOG_THROTTLE=250"), 0.5);
        assert_eq!(scalar("ANALOG_BRAKE=-10"), 0.0);
    }

    #[test]
    fn motors_are_scaled_by_pwm_range() {
        assert_eq!(scalar("LEFT_MOTOR=255"), 1.0);
        assert_eq!(scalar("RIGHT_MOTOR=0"), 0.0);
        assert_eq!(scalar("RIGHT_MOTOR=-255"), -1.0);
    }

    #[test]
    fn power_and_turning_pass_through_unclamped() {
        assert_eq!(scalar("CUMULATED_POWER=12.5"), 12.5);
        assert_eq!(scalar("TURNING_LEVEL=-3"), -3.0);
    }

    #[test]
    fn value_whitespace_is_trimmed() {
        assert_eq!(scalar("ANALOG_THROTTLE=  250 "), 0.5);
        let frame = decode("MODE= S+ ").unwrap();
        assert_eq!(frame.value, TelemetryValue::Mode(DrivingMode::SportPlus));
    }

    #[test]
    fn known_modes_decode() {
        for mode in DrivingMode::ALL {
            let frame = decode(&format!("MODE={}", mode)).unwrap();
            assert_eq!(frame.key, TelemetryKey::Mode);
            assert_eq!(frame.value.as_mode(), Some(mode));
        }
    }

    #[test]
    fn unknown_mode_falls_back_to_park() {
        assert_eq!(decode("MODE=X").unwrap().value.as_mode(), Some(DrivingMode::Park));
        assert_eq!(decode("MODE=").unwrap().value.as_mode(), Some(DrivingMode::Park));
        assert_eq!(decode("MODE=d").unwrap().value.as_mode(), Some(DrivingMode::Park));
        assert_eq!(decode("MODE=D").unwrap().value.as_mode(), Some(DrivingMode::Drive));
    }

    #[test]
    fn malformed_frames_are_skipped() {
        assert_eq!(decode("GARBAGE"), Err(DecodeSkip::MissingSeparator));
        assert_eq!(decode("=12"), Err(DecodeSkip::EmptyKey));
        assert_eq!(decode("SPEED=12"), Err(DecodeSkip::UnknownKey("SPEED".into())));
        assert!(matches!(
            decode("ANALOG_BRAKE=abc"),
            Err(DecodeSkip::InvalidNumber { key: TelemetryKey::AnalogBrake, .. })
        ));
        assert!(decode("LEFT_MOTOR=").is_err());
    }

    #[test]
    fn non_finite_numbers_are_skipped() {
        assert!(decode("CUMULATED_POWER=NaN").is_err());
        assert!(decode("TURNING_LEVEL=inf").is_err());
        assert!(decode("ANALOG_STEER=-infinity").is_err());
    }

    #[test]
    fn only_first_separator_splits() {
        assert!(matches!(
            decode("CUMULATED_POWER=1=2"),
            Err(DecodeSkip::InvalidNumber { .. })
        ));
    }

    #[test]
    fn payload_terminators_are_ignored() {
        let frame = decode_payload(b"LEFT_MOTOR=51\r\n\0").unwrap();
        assert_eq!(frame.value, TelemetryValue::Scalar(0.2));
    }
}
