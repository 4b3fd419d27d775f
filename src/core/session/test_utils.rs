//! Test helpers for the session engine

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::core::bluetooth::{CharacteristicRef, PeripheralId, Radio};

/// A radio command as seen by [`RecordingRadio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Activate,
    Scan { services: Vec<Uuid>, allow_duplicates: bool },
    StopScan,
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    ReadSignalStrength(PeripheralId),
    DiscoverServices(PeripheralId, Vec<Uuid>),
    DiscoverCharacteristics(PeripheralId, Uuid),
    Read(PeripheralId, CharacteristicRef),
    Write(PeripheralId, CharacteristicRef, Vec<u8>),
    SetNotify(PeripheralId, CharacteristicRef, bool),
}

/// Radio double that records every command. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingRadio {
    calls: Arc<Mutex<Vec<RadioCall>>>,
}

impl RecordingRadio {
    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: RadioCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Radio for RecordingRadio {
    fn activate(&mut self) {
        self.record(RadioCall::Activate);
    }

    fn scan(&mut self, services: &[Uuid], allow_duplicates: bool) {
        self.record(RadioCall::Scan {
            services: services.to_vec(),
            allow_duplicates,
        });
    }

    fn stop_scan(&mut self) {
        self.record(RadioCall::StopScan);
    }

    fn connect(&mut self, id: &PeripheralId) {
        self.record(RadioCall::Connect(id.clone()));
    }

    fn disconnect(&mut self, id: &PeripheralId) {
        self.record(RadioCall::Disconnect(id.clone()));
    }

    fn read_signal_strength(&mut self, id: &PeripheralId) {
        self.record(RadioCall::ReadSignalStrength(id.clone()));
    }

    fn discover_services(&mut self, id: &PeripheralId, services: &[Uuid]) {
        self.record(RadioCall::DiscoverServices(id.clone(), services.to_vec()));
    }

    fn discover_characteristics(&mut self, id: &PeripheralId, service: Uuid) {
        self.record(RadioCall::DiscoverCharacteristics(id.clone(), service));
    }

    fn read_value(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef) {
        self.record(RadioCall::Read(id.clone(), *characteristic));
    }

    fn write_value(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef, payload: &[u8]) {
        self.record(RadioCall::Write(id.clone(), *characteristic, payload.to_vec()));
    }

    fn set_notify(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef, enabled: bool) {
        self.record(RadioCall::SetNotify(id.clone(), *characteristic, enabled));
    }
}
