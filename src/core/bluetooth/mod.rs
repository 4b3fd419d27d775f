//! Bluetooth functionality
//! This module wraps the native radio: scanning, connecting, GATT discovery,
//! reads, writes and notifications, all reported back as radio events.

mod connection;
mod constants;
mod handles;
mod manager;
mod notification;
mod radio;
mod scanner;
mod types;

// Re-export types that should be publicly accessible
pub use connection::ConnectionManager;
pub use constants::*; // Re-export all constants
pub use manager::BluetoothManager;
pub use notification::NotificationHandler;
pub use radio::{Radio, RadioError, RadioEvent, RadioEventReceiver, RadioEventSender, radio_event_channel};
pub use scanner::BluetoothScanner;
pub use types::{
    AdapterState, CharacteristicProperties, CharacteristicRef, DiscoveredCharacteristic,
    Peripheral, PeripheralId, PeripheralState,
};
