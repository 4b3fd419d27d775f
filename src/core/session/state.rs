//! The observable session state.
//!
//! [`SessionState`] is a plain snapshot. Only the controller holds the
//! [`SessionStore`] that can change it; everybody else gets a
//! `watch::Receiver` and sees each change as one atomic snapshot.

use serde::Serialize;
use tokio::sync::watch;

use crate::core::bluetooth::{
    AdapterState, CharacteristicRef, Peripheral, PeripheralId, PeripheralState,
};
use crate::core::session::mirror::{self, CharacteristicMirror, CharacteristicRole};

/// The operation a recorded failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedOperation {
    Connect,
    Discovery,
    Read,
    Write,
}

/// Most recent failure reported by the radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub operation: FailedOperation,
    pub peripheral: PeripheralId,
    pub message: String,
}

/// Snapshot of adapter, peripherals, connection and mirrored characteristics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    adapter_state: AdapterState,
    scanning: bool,
    peripherals: Vec<Peripheral>,
    connected: Option<Peripheral>,
    connecting: Option<PeripheralId>,
    characteristics: Vec<CharacteristicMirror>,
    last_failure: Option<SessionFailure>,
}

impl SessionState {
    pub fn adapter_state(&self) -> AdapterState {
        self.adapter_state
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Every peripheral seen during this session, in discovery order
    pub fn peripherals(&self) -> &[Peripheral] {
        &self.peripherals
    }

    pub fn peripheral(&self, id: &PeripheralId) -> Option<&Peripheral> {
        self.peripherals.iter().find(|p| &p.id == id)
    }

    pub fn connected(&self) -> Option<&Peripheral> {
        self.connected.as_ref()
    }

    pub fn connected_id(&self) -> Option<&PeripheralId> {
        self.connected.as_ref().map(|p| &p.id)
    }

    /// The peripheral a connection is pending for, if any
    pub fn connecting(&self) -> Option<&PeripheralId> {
        self.connecting.as_ref()
    }

    pub fn characteristics(&self) -> &[CharacteristicMirror] {
        &self.characteristics
    }

    pub fn characteristic(&self, characteristic: &CharacteristicRef) -> Option<&CharacteristicMirror> {
        self.characteristics
            .iter()
            .find(|c| c.characteristic() == *characteristic)
    }

    pub fn last_failure(&self) -> Option<&SessionFailure> {
        self.last_failure.as_ref()
    }

    pub(super) fn set_adapter_state(&mut self, state: AdapterState) -> bool {
        let changed = self.adapter_state != state;
        self.adapter_state = state;
        changed
    }

    pub(super) fn set_scanning(&mut self, scanning: bool) -> bool {
        let changed = self.scanning != scanning;
        self.scanning = scanning;
        changed
    }

    /// Inserts a new sighting or folds it into the known record. A sighting
    /// of the connected peripheral refreshes the connected copy too.
    pub(super) fn upsert_peripheral(&mut self, mut sighting: Peripheral) {
        let merged = match self.peripherals.iter_mut().find(|p| p.id == sighting.id) {
            Some(known) => {
                known.merge(sighting);
                known.clone()
            }
            None => {
                // First sighting of a connection that was adopted without one
                if self.connected.as_ref().is_some_and(|c| c.id == sighting.id) {
                    sighting.state = PeripheralState::Connected;
                }
                log::info!(
                    "Discovered new peripheral: {}, {}",
                    sighting.id,
                    sighting.name.as_deref().unwrap_or("No Name")
                );
                self.peripherals.push(sighting.clone());
                sighting
            }
        };

        if let Some(connected) = self.connected.as_mut().filter(|c| c.id == merged.id) {
            connected.merge(merged);
        }
    }

    pub(super) fn set_peripheral_state(&mut self, id: &PeripheralId, state: PeripheralState) -> bool {
        match self.peripherals.iter_mut().find(|p| &p.id == id) {
            Some(p) if p.state != state => {
                p.state = state;
                true
            }
            _ => false,
        }
    }

    pub(super) fn set_connecting(&mut self, id: Option<PeripheralId>) -> bool {
        let changed = self.connecting != id;
        self.connecting = id;
        changed
    }

    pub(super) fn set_connected(&mut self, peripheral: Peripheral) {
        self.connected = Some(peripheral);
    }

    pub(super) fn set_connected_rssi(&mut self, rssi: i16) -> bool {
        let Some(connected) = self.connected.as_mut() else {
            return false;
        };
        let changed = connected.rssi != Some(rssi);
        connected.rssi = Some(rssi);
        if let Some(known) = self.peripherals.iter_mut().find(|p| p.id == connected.id) {
            known.rssi = Some(rssi);
        }
        changed
    }

    /// Drops the connection together with every mirrored value
    pub(super) fn clear_connection(&mut self) {
        self.connected = None;
        self.characteristics.clear();
    }

    pub(super) fn upsert_characteristic(
        &mut self,
        characteristic: CharacteristicRef,
        role: CharacteristicRole,
        value: Vec<u8>,
    ) -> bool {
        mirror::upsert(&mut self.characteristics, characteristic, role, value)
    }

    pub(super) fn record_failure(&mut self, failure: Option<SessionFailure>) -> bool {
        let changed = self.last_failure != failure;
        self.last_failure = failure;
        changed
    }
}

/// Write side of the session state. Owned by the controller alone.
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(super) fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        f(&self.tx.borrow())
    }

    /// Applies `f` as one atomic change. Observers are only woken when `f`
    /// reports a modification.
    pub(super) fn update(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
