//! Session controller
//! The protocol engine: turns intents into radio commands and radio events
//! into session state changes. It is the only writer of the session state.

use std::collections::HashMap;

use log::{debug, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::core::bluetooth::{
    AdapterState, CharacteristicRef, DiscoveredCharacteristic, Peripheral, PeripheralId,
    PeripheralState, Radio, RadioError, RadioEvent,
};
use crate::core::session::mirror::CharacteristicRole;
use crate::core::session::state::{
    FailedOperation, SessionFailure, SessionState, SessionStore,
};

pub struct SessionController<R: Radio> {
    radio: R,
    store: SessionStore,
    /// Service UUIDs scanned for and discovered after connecting
    service_uuids: Vec<Uuid>,
    started: bool,
    /// Characteristics discovered on the current connection
    discovered: HashMap<CharacteristicRef, DiscoveredCharacteristic>,
}

impl<R: Radio> SessionController<R> {
    pub fn new(radio: R, service_uuids: Vec<Uuid>) -> Self {
        Self {
            radio,
            store: SessionStore::new(),
            service_uuids,
            started: false,
            discovered: HashMap::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.store.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn radio(&self) -> &R {
        &self.radio
    }

    /// Activates the radio. Later calls do nothing.
    pub fn start(&mut self) {
        if self.started {
            debug!("Session already started");
            return;
        }
        info!("Starting bluetooth central.");
        self.started = true;
        self.radio.activate();
    }

    /// Scans for peripherals advertising the configured services. The caller
    /// is expected to check that the adapter is powered on first.
    pub fn scan_for_peripherals(&mut self) {
        info!("Scanning for peripherals...");
        self.radio.scan(&self.service_uuids, true);
        self.store.update(|s| s.set_scanning(true));
    }

    pub fn stop_scan(&mut self) {
        self.radio.stop_scan();
        self.store.update(|s| s.set_scanning(false));
    }

    /// Requests a connection. Records without a live radio handle are ignored.
    pub fn connect(&mut self, peripheral: &Peripheral) {
        if !peripheral.is_live() {
            debug!("Peripheral {} has no radio handle, not connecting", peripheral.id);
            return;
        }
        if self.is_current(&peripheral.id) {
            debug!("Peripheral {} is already connected", peripheral.id);
            return;
        }

        info!("Connecting to peripheral with id: {}", peripheral.id);
        let id = peripheral.id.clone();
        self.store.update(|s| {
            let pending = s.set_connecting(Some(id.clone()));
            s.set_peripheral_state(&id, PeripheralState::Connecting) | pending
        });
        self.radio.connect(&peripheral.id);
    }

    /// Requests a disconnect of the current connection. The state is cleared
    /// once the radio reports the disconnection.
    pub fn disconnect(&mut self) {
        let Some(id) = self.store.read(|s| s.connected_id().cloned()) else {
            debug!("No connected peripheral to disconnect");
            return;
        };
        info!("Disconnecting from peripheral with id: {}", id);
        self.store
            .update(|s| s.set_peripheral_state(&id, PeripheralState::Disconnecting));
        self.radio.disconnect(&id);
    }

    pub fn read_value(&mut self, characteristic: CharacteristicRef) {
        if let Some(id) = self.target(&characteristic) {
            self.radio.read_value(&id, &characteristic);
        }
    }

    /// Writes with response; the value is re-read once the write is acknowledged.
    pub fn write(&mut self, data: &[u8], characteristic: CharacteristicRef) {
        if let Some(id) = self.target(&characteristic) {
            info!("Writing {} bytes to {}", data.len(), characteristic.uuid);
            self.radio.write_value(&id, &characteristic, data);
        }
    }

    /// The connected peripheral, if `characteristic` was discovered on it
    fn target(&self, characteristic: &CharacteristicRef) -> Option<PeripheralId> {
        let Some(id) = self.store.read(|s| s.connected_id().cloned()) else {
            debug!("No connected peripheral, ignoring operation on {}", characteristic.uuid);
            return None;
        };
        if !self.discovered.contains_key(characteristic) {
            debug!(
                "Characteristic {} of service {} not discovered on {}",
                characteristic.uuid, characteristic.service, id
            );
            return None;
        }
        Some(id)
    }

    fn is_current(&self, id: &PeripheralId) -> bool {
        self.store.read(|s| s.connected_id() == Some(id))
    }

    pub fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::AdapterStateChanged(state) => self.on_adapter_state(state),
            RadioEvent::ScanStopped { error } => {
                match error {
                    Some(e) => warn!("Scan stopped: {}", e),
                    None => info!("Scan stopped."),
                }
                self.store.update(|s| s.set_scanning(false));
            }
            RadioEvent::PeripheralDiscovered { id, name, rssi } => {
                let sighting = Peripheral::discovered(id, name, rssi);
                self.store.update(|s| {
                    s.upsert_peripheral(sighting);
                    true
                });
            }
            RadioEvent::PeripheralConnected { id } => self.on_connected(id),
            RadioEvent::PeripheralConnectFailed { id, error } => self.on_connect_failed(id, error),
            RadioEvent::PeripheralDisconnected { id, error } => self.on_disconnected(id, error),
            RadioEvent::SignalStrengthRead { id, rssi } => match rssi {
                Ok(rssi) if self.is_current(&id) => {
                    self.store.update(|s| s.set_connected_rssi(rssi));
                }
                Ok(_) => debug!("Ignoring signal strength of stale peripheral {}", id),
                Err(e) => warn!("Failed to read signal strength of {}: {}", id, e),
            },
            RadioEvent::ServicesDiscovered { id, services } => self.on_services(id, services),
            RadioEvent::CharacteristicsDiscovered { id, service, characteristics } => {
                self.on_characteristics(id, service, characteristics)
            }
            RadioEvent::CharacteristicValueUpdated { id, characteristic, value } => {
                self.on_value(id, characteristic, value)
            }
            RadioEvent::CharacteristicWritten { id, characteristic, result } => {
                self.on_written(id, characteristic, result)
            }
            RadioEvent::NotifyStateChanged { id, characteristic, result } => match result {
                Ok(enabled) => debug!(
                    "Notifications for {} on {} {}",
                    characteristic.uuid,
                    id,
                    if enabled { "enabled" } else { "disabled" }
                ),
                Err(e) => warn!("Failed to change notify state of {}: {}", characteristic.uuid, e),
            },
        }
    }

    fn on_adapter_state(&mut self, state: AdapterState) {
        info!("Adapter state: {:?}", state);
        let changed = self.store.update(|s| s.set_adapter_state(state));
        if changed && state == AdapterState::PoweredOn {
            self.scan_for_peripherals();
        }
    }

    fn on_connected(&mut self, id: PeripheralId) {
        info!("Connected to peripheral with id: {}", id);
        let current = self.store.snapshot();

        if current.connected_id() == Some(&id) {
            debug!("Peripheral {} already connected", id);
            self.store.update(|s| {
                let pending = s.connecting() == Some(&id) && s.set_connecting(None);
                s.set_peripheral_state(&id, PeripheralState::Connected) | pending
            });
            return;
        }
        if let Some(previous) = current.connected_id().cloned() {
            warn!("Replacing connection to {} with {}", previous, id);
            self.discovered.clear();
            self.store.update(|s| {
                s.clear_connection();
                s.set_peripheral_state(&previous, PeripheralState::Disconnected);
                true
            });
            self.radio.disconnect(&previous);
        }

        self.radio.stop_scan();

        let known = current.peripheral(&id).cloned();
        let synthesized = known.is_none();
        let mut connected = known.unwrap_or_else(|| Peripheral::from_id(id.clone()));
        connected.state = PeripheralState::Connected;

        self.store.update(|s| {
            s.set_scanning(false);
            if s.connecting() == Some(&id) {
                s.set_connecting(None);
            }
            s.set_peripheral_state(&id, PeripheralState::Connected);
            s.set_connected(connected);
            s.record_failure(None);
            true
        });

        if synthesized {
            self.radio.read_signal_strength(&id);
        }
        self.radio.discover_services(&id, &self.service_uuids);
    }

    fn on_connect_failed(&mut self, id: PeripheralId, error: RadioError) {
        warn!("Failed to connect to {}: {}", id, error);
        self.store.update(|s| {
            if s.connecting() == Some(&id) {
                s.set_connecting(None);
            }
            if s.connected_id() != Some(&id) {
                s.set_peripheral_state(&id, PeripheralState::Disconnected);
            }
            s.record_failure(Some(SessionFailure {
                operation: FailedOperation::Connect,
                peripheral: id.clone(),
                message: error.to_string(),
            }));
            true
        });
    }

    fn on_disconnected(&mut self, id: PeripheralId, error: Option<RadioError>) {
        if let Some(e) = &error {
            info!("Disconnected from peripheral {} with error: {}", id, e);
        } else {
            info!("Disconnected from peripheral with id: {}", id);
        }

        if !self.is_current(&id) {
            info!("Ignoring disconnect of {}, it is not the connected peripheral.", id);
            return;
        }

        self.discovered.clear();
        self.store.update(|s| {
            s.clear_connection();
            s.set_peripheral_state(&id, PeripheralState::Disconnected);
            true
        });
    }

    fn on_services(&mut self, id: PeripheralId, services: Result<Vec<Uuid>, RadioError>) {
        if !self.is_current(&id) {
            debug!("Ignoring services of stale peripheral {}", id);
            return;
        }
        let services = match services {
            Ok(services) => services,
            Err(e) => {
                warn!("Error while discovering services: {}", e);
                self.record_failure(FailedOperation::Discovery, &id, &e);
                return;
            }
        };
        if services.is_empty() {
            info!("No services found in the peripheral.");
            return;
        }
        for service in services {
            self.radio.discover_characteristics(&id, service);
        }
    }

    fn on_characteristics(
        &mut self,
        id: PeripheralId,
        service: Uuid,
        characteristics: Result<Vec<DiscoveredCharacteristic>, RadioError>,
    ) {
        if !self.is_current(&id) {
            debug!("Ignoring characteristics of stale peripheral {}", id);
            return;
        }
        let characteristics = match characteristics {
            Ok(characteristics) => characteristics,
            Err(e) => {
                warn!("Error while discovering characteristics of {}: {}", service, e);
                self.record_failure(FailedOperation::Discovery, &id, &e);
                return;
            }
        };
        if characteristics.is_empty() {
            info!("No characteristics found in service {}.", service);
            return;
        }

        for discovered in characteristics {
            let characteristic = discovered.characteristic;
            self.discovered.insert(characteristic, discovered);
            self.radio.read_value(&id, &characteristic);
            if discovered.properties.supports_notify() {
                self.radio.set_notify(&id, &characteristic, true);
            }
        }
    }

    fn on_value(
        &mut self,
        id: PeripheralId,
        characteristic: CharacteristicRef,
        value: Result<Vec<u8>, RadioError>,
    ) {
        if !self.is_current(&id) {
            debug!("Ignoring value of {} from stale peripheral {}", characteristic.uuid, id);
            return;
        }
        let value = match value {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to update value of {}: {}", characteristic.uuid, e);
                self.record_failure(FailedOperation::Read, &id, &e);
                return;
            }
        };

        let role = self
            .discovered
            .get(&characteristic)
            .map(|d| CharacteristicRole::from_properties(&d.properties))
            .unwrap_or(CharacteristicRole::Generic);
        self.store
            .update(|s| s.upsert_characteristic(characteristic, role, value));
    }

    fn on_written(
        &mut self,
        id: PeripheralId,
        characteristic: CharacteristicRef,
        result: Result<(), RadioError>,
    ) {
        if !self.is_current(&id) {
            debug!("Ignoring write ack of {} from stale peripheral {}", characteristic.uuid, id);
            return;
        }
        if let Err(e) = &result {
            warn!("Write to {} failed: {}", characteristic.uuid, e);
            self.record_failure(FailedOperation::Write, &id, e);
        }
        // Resynchronize from the peripheral instead of assuming the written value.
        self.radio.read_value(&id, &characteristic);
    }

    fn record_failure(&self, operation: FailedOperation, id: &PeripheralId, error: &RadioError) {
        let failure = SessionFailure {
            operation,
            peripheral: id.clone(),
            message: error.to_string(),
        };
        self.store.update(|s| s.record_failure(Some(failure)));
    }
}
