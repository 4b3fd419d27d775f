//! The native radio boundary.
//! Commands go out through [`Radio`]; their results come back later as
//! [`RadioEvent`]s on a single channel, in the order the radio produced them.

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::types::{
    AdapterState, CharacteristicRef, DiscoveredCharacteristic, PeripheralId,
};

/// Failures reported by the native radio layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("no live handle for peripheral {0}")]
    UnknownPeripheral(PeripheralId),
    #[error("characteristic {0} has not been discovered")]
    UnknownCharacteristic(Uuid),
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),
    #[error("{0}")]
    Platform(String),
}

impl From<bluest::Error> for RadioError {
    fn from(e: bluest::Error) -> Self {
        Self::Platform(e.to_string())
    }
}

/// Events delivered by the native radio layer
#[derive(Debug, Clone)]
pub enum RadioEvent {
    AdapterStateChanged(AdapterState),
    /// The scan ended without being asked to, e.g. the platform aborted it
    ScanStopped {
        error: Option<RadioError>,
    },
    PeripheralDiscovered {
        id: PeripheralId,
        name: Option<String>,
        rssi: Option<i16>,
    },
    PeripheralConnected {
        id: PeripheralId,
    },
    PeripheralConnectFailed {
        id: PeripheralId,
        error: RadioError,
    },
    PeripheralDisconnected {
        id: PeripheralId,
        error: Option<RadioError>,
    },
    SignalStrengthRead {
        id: PeripheralId,
        rssi: Result<i16, RadioError>,
    },
    ServicesDiscovered {
        id: PeripheralId,
        services: Result<Vec<Uuid>, RadioError>,
    },
    CharacteristicsDiscovered {
        id: PeripheralId,
        service: Uuid,
        characteristics: Result<Vec<DiscoveredCharacteristic>, RadioError>,
    },
    /// A read completion or a notification push. Both look the same.
    CharacteristicValueUpdated {
        id: PeripheralId,
        characteristic: CharacteristicRef,
        value: Result<Vec<u8>, RadioError>,
    },
    /// Acknowledgement of a write with response
    CharacteristicWritten {
        id: PeripheralId,
        characteristic: CharacteristicRef,
        result: Result<(), RadioError>,
    },
    NotifyStateChanged {
        id: PeripheralId,
        characteristic: CharacteristicRef,
        result: Result<bool, RadioError>,
    },
}

pub type RadioEventSender = mpsc::UnboundedSender<RadioEvent>;
pub type RadioEventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// Creates the channel the radio reports its events on
pub fn radio_event_channel() -> (RadioEventSender, RadioEventReceiver) {
    mpsc::unbounded_channel()
}

/// Sends an event, returning false once the session has gone away.
pub(crate) fn emit(events: &RadioEventSender, event: RadioEvent) -> bool {
    match events.send(event) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("Dropping radio event, session closed: {:?}", e.0);
            false
        }
    }
}

/// Commands understood by the native radio.
///
/// Every method only issues a request and returns immediately; the outcome
/// is delivered later as a [`RadioEvent`].
pub trait Radio: Send + 'static {
    /// Starts delivering adapter state events
    fn activate(&mut self);
    fn scan(&mut self, services: &[Uuid], allow_duplicates: bool);
    fn stop_scan(&mut self);
    fn connect(&mut self, id: &PeripheralId);
    fn disconnect(&mut self, id: &PeripheralId);
    fn read_signal_strength(&mut self, id: &PeripheralId);
    fn discover_services(&mut self, id: &PeripheralId, services: &[Uuid]);
    /// Discovers every characteristic of `service`, unfiltered
    fn discover_characteristics(&mut self, id: &PeripheralId, service: Uuid);
    fn read_value(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef);
    /// Writes with response; the ack arrives as [`RadioEvent::CharacteristicWritten`]
    fn write_value(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef, payload: &[u8]);
    fn set_notify(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef, enabled: bool);
}
