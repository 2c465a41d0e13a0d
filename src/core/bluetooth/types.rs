//! Defines shared data structures for the Bluetooth module.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// A discovered peripheral
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeripheralHandle {
    /// Platform-specific unique identifier for the device
    pub id: String,
    /// The advertised name of the device
    pub name: String,
    /// The MAC address, when the platform exposes one (macOS does not)
    pub address: Option<String>,
    /// The signal strength (RSSI) when the device was seen
    pub rssi: Option<i16>,
}

impl PeripheralHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: None,
            rssi: None,
        }
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }

    pub fn with_rssi(mut self, rssi: Option<i16>) -> Self {
        self.rssi = rssi;
        self
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// State of the radio link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Idle,
    Scanning,
    Found,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Found => "found",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Link state plus the human-readable line shown on status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub message: String,
}

impl LinkStatus {
    pub fn new(state: LinkState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new(LinkState::Idle, "")
    }
}

/// GATT properties relevant to channel selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicFlags {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicFlags {
    pub fn is_notifiable(&self) -> bool {
        self.notify || self.indicate
    }

    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// A characteristic advertised by the connected peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    /// The service the characteristic belongs to
    pub service: Uuid,
    pub uuid: Uuid,
    pub properties: CharacteristicFlags,
}

impl CharacteristicInfo {
    /// Predicate selecting the channel telemetry arrives on.
    pub fn is_notify_channel(&self) -> bool {
        self.properties.is_notifiable()
    }

    /// Predicate selecting the channel pings are written to.
    pub fn is_write_channel(&self) -> bool {
        self.properties.is_writable() && self.properties.is_notifiable()
    }
}

/// Returns the first characteristic, in advertised order, matching `predicate`.
pub fn select_characteristic<'a>(
    characteristics: &'a [CharacteristicInfo],
    predicate: impl Fn(&CharacteristicInfo) -> bool,
) -> Option<&'a CharacteristicInfo> {
    characteristics.iter().find(|c| predicate(*c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristic(n: u128, properties: CharacteristicFlags) -> CharacteristicInfo {
        CharacteristicInfo {
            service: Uuid::from_u128(0x1000),
            uuid: Uuid::from_u128(n),
            properties,
        }
    }

    #[test]
    fn selects_first_matching_characteristic() {
        let read_only = CharacteristicFlags { read: true, ..Default::default() };
        let notify = CharacteristicFlags { notify: true, ..Default::default() };
        let write_notify = CharacteristicFlags {
            write_without_response: true,
            notify: true,
            ..Default::default()
        };
        let chars = vec![
            characteristic(1, read_only),
            characteristic(2, notify),
            characteristic(3, write_notify),
        ];

        let notify_channel = select_characteristic(&chars, CharacteristicInfo::is_notify_channel);
        let write_channel = select_characteristic(&chars, CharacteristicInfo::is_write_channel);
        assert_eq!(notify_channel.map(|c| c.uuid), Some(Uuid::from_u128(2)));
        assert_eq!(write_channel.map(|c| c.uuid), Some(Uuid::from_u128(3)));
    }

    #[test]
    fn write_only_characteristic_is_not_a_write_channel() {
        let write_only = CharacteristicFlags { write: true, ..Default::default() };
        let chars = vec![characteristic(1, write_only)];
        assert!(select_characteristic(&chars, CharacteristicInfo::is_write_channel).is_none());
        assert!(select_characteristic(&chars, CharacteristicInfo::is_notify_channel).is_none());
    }

    #[test]
    fn status_and_peripheral_serialize_for_status_displays() {
        let status = LinkStatus::new(LinkState::Connected, "ESP32_BLE_AMG is connected");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["message"], "ESP32_BLE_AMG is connected");

        let peripheral = PeripheralHandle::new("dev-1", "ESP32_BLE_AMG").with_rssi(Some(-60));
        let json = serde_json::to_value(&peripheral).unwrap();
        assert_eq!(json["name"], "ESP32_BLE_AMG");
        assert_eq!(json["rssi"], -60);
        assert!(json["address"].is_null());
    }

    #[test]
    fn indicate_counts_as_notifiable() {
        let indicate = CharacteristicFlags { indicate: true, ..Default::default() };
        assert!(characteristic(9, indicate).is_notify_channel());
    }
}
