//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

/// Platform-assigned identity of a peripheral.
///
/// On macOS this is a UUID, on other platforms it is whatever stable string
/// the native stack hands out (usually containing the MAC address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Power/availability state of the local adapter, as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

/// Connection state of a single peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralState {
    #[default]
    Unknown,
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Represents a discovered (or directly addressed) peripheral
#[derive(Debug, Clone, Serialize)]
pub struct Peripheral {
    /// Platform-specific unique identifier
    pub id: PeripheralId,
    /// The advertised name of the device, if available
    pub name: Option<String>,
    /// The MAC address, when the platform id carries one
    pub address: Option<String>,
    /// Connection state
    pub state: PeripheralState,
    /// The signal strength (RSSI), absent until the first advertisement
    pub rssi: Option<i16>,
    /// Whether the radio holds a live handle for this peripheral
    #[serde(skip)]
    live: bool,
}

impl Peripheral {
    /// Creates a record from an advertisement sighting.
    pub fn discovered(id: PeripheralId, name: Option<String>, rssi: Option<i16>) -> Self {
        let address = extract_mac_address(id.as_str());
        Self {
            id,
            name,
            address,
            state: PeripheralState::Disconnected,
            rssi,
            live: true,
        }
    }

    /// Creates a record from a bare identity. The radio has no handle for it,
    /// so connecting to it does nothing.
    pub fn from_id(id: PeripheralId) -> Self {
        let address = extract_mac_address(id.as_str());
        Self {
            id,
            name: None,
            address,
            state: PeripheralState::Unknown,
            rssi: None,
            live: false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Folds a newer sighting of the same peripheral into this record.
    /// Known signal strength and name never regress to absent.
    pub fn merge(&mut self, newer: Peripheral) {
        debug_assert_eq!(self.id, newer.id);
        if newer.name.is_some() {
            self.name = newer.name;
        }
        if newer.rssi.is_some() {
            self.rssi = newer.rssi;
        }
        self.live |= newer.live;
    }
}

impl PartialEq for Peripheral {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Peripheral {}

fn extract_mac_address(device_id_str: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

/// Identifies a characteristic within a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub uuid: Uuid,
}

impl CharacteristicRef {
    pub const fn new(service: Uuid, uuid: Uuid) -> Self {
        Self { service, uuid }
    }
}

/// The subset of GATT characteristic properties the session cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    /// True if the peripheral can push value changes for this characteristic
    pub fn supports_notify(&self) -> bool {
        self.notify || self.indicate
    }
}

/// A characteristic reported by characteristic discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscoveredCharacteristic {
    pub characteristic: CharacteristicRef,
    pub properties: CharacteristicProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peripherals_compare_by_identity_only() {
        let a = Peripheral::discovered("dev-1".into(), Some("A".into()), Some(-50));
        let b = Peripheral::discovered("dev-1".into(), None, Some(-90));
        let c = Peripheral::discovered("dev-2".into(), Some("A".into()), Some(-50));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn merge_keeps_known_rssi_when_newer_has_none() {
        let mut known = Peripheral::discovered("dev-1".into(), Some("Sensor".into()), Some(-70));
        known.merge(Peripheral::discovered("dev-1".into(), None, None));
        assert_eq!(known.rssi, Some(-70));
        assert_eq!(known.name.as_deref(), Some("Sensor"));

        known.merge(Peripheral::discovered("dev-1".into(), None, Some(-40)));
        assert_eq!(known.rssi, Some(-40));
    }

    #[test]
    fn bare_identity_has_no_live_handle() {
        let bare = Peripheral::from_id("dev-9".into());
        assert!(!bare.is_live());
        assert_eq!(bare.rssi, None);
        assert_eq!(bare.state, PeripheralState::Unknown);
    }

    #[test]
    fn address_is_extracted_from_platform_id() {
        let p = Peripheral::discovered("hci0/dev_aa:bb:cc:dd:ee:ff".into(), None, None);
        assert_eq!(p.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));

        let mac_less = Peripheral::discovered("d0984ccc-2b42-11eb-adc1-0242ac120002".into(), None, None);
        assert_eq!(mac_less.address, None);
    }

    #[test]
    fn indicate_counts_as_notify() {
        let props = CharacteristicProperties {
            indicate: true,
            ..Default::default()
        };
        assert!(props.supports_notify());
        assert!(!CharacteristicProperties::default().supports_notify());
    }
}
