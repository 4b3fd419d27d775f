//! Live native handles, keyed by the identities the session works with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bluest::{Characteristic, Device, Service};
use uuid::Uuid;

use crate::core::bluetooth::types::{CharacteristicRef, PeripheralId};
use crate::utils::lock_or_recover;

/// Shared store of the bluest handles behind discovered peripherals and
/// their GATT attributes.
#[derive(Clone, Default)]
pub struct HandleStore {
    devices: Arc<Mutex<HashMap<PeripheralId, Device>>>,
    services: Arc<Mutex<HashMap<(PeripheralId, Uuid), Service>>>,
    characteristics: Arc<Mutex<HashMap<(PeripheralId, CharacteristicRef), Characteristic>>>,
}

impl HandleStore {
    pub fn device(&self, id: &PeripheralId) -> Option<Device> {
        lock_or_recover(&self.devices).get(id).cloned()
    }

    pub fn insert_device(&self, id: PeripheralId, device: Device) {
        lock_or_recover(&self.devices).insert(id, device);
    }

    pub fn service(&self, id: &PeripheralId, uuid: Uuid) -> Option<Service> {
        lock_or_recover(&self.services)
            .get(&(id.clone(), uuid))
            .cloned()
    }

    pub fn insert_service(&self, id: PeripheralId, uuid: Uuid, service: Service) {
        lock_or_recover(&self.services).insert((id, uuid), service);
    }

    pub fn characteristic(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Option<Characteristic> {
        lock_or_recover(&self.characteristics)
            .get(&(id.clone(), *characteristic))
            .cloned()
    }

    pub fn insert_characteristic(
        &self,
        id: PeripheralId,
        characteristic: CharacteristicRef,
        handle: Characteristic,
    ) {
        lock_or_recover(&self.characteristics).insert((id, characteristic), handle);
    }

    /// Drops every service and characteristic handle of `id`.
    /// The device handle itself stays so the peripheral can be reconnected.
    pub fn forget_gatt(&self, id: &PeripheralId) {
        lock_or_recover(&self.services).retain(|(owner, _), _| owner != id);
        lock_or_recover(&self.characteristics).retain(|(owner, _), _| owner != id);
    }
}
