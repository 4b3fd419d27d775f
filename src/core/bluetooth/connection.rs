//! Bluetooth connection handling
//! This module connects to and disconnects from peripherals and runs
//! service/characteristic discovery on the connected one.

use std::time::Duration;

use bluest::{Adapter, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{error, info, warn};
use uuid::Uuid;

use crate::core::bluetooth::handles::HandleStore;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::radio::{RadioError, RadioEvent, RadioEventSender, emit};
use crate::core::bluetooth::types::{
    CharacteristicProperties, CharacteristicRef, DiscoveredCharacteristic, PeripheralId,
};

/// Connection manager for peripherals
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    handles: HandleStore,
    notification_handler: NotificationHandler,
    events: RadioEventSender,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        adapter: Adapter,
        handles: HandleStore,
        notification_handler: NotificationHandler,
        events: RadioEventSender,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            handles,
            notification_handler,
            events,
            connect_timeout,
        }
    }

    /// Connects to a previously discovered peripheral, giving up after the
    /// connect timeout.
    pub fn connect(&self, id: &PeripheralId) {
        let Some(device) = self.handles.device(id) else {
            warn!("No device handle for {}, cannot connect", id);
            emit(
                &self.events,
                RadioEvent::PeripheralConnectFailed {
                    id: id.clone(),
                    error: RadioError::UnknownPeripheral(id.clone()),
                },
            );
            return;
        };

        let this = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let timeout_secs = this.connect_timeout.as_secs();
            match tokio::time::timeout(this.connect_timeout, this.try_connect(&device)).await {
                Ok(Ok(())) => {
                    info!("Successfully connected to device {}", id);
                    if emit(&this.events, RadioEvent::PeripheralConnected { id: id.clone() }) {
                        this.watch_disconnection(id, device).await;
                    }
                }
                Ok(Err(e)) => {
                    warn!("Connection to {} failed: {}", id, e);
                    emit(
                        &this.events,
                        RadioEvent::PeripheralConnectFailed { id, error: e },
                    );
                }
                Err(_) => {
                    warn!("Connection to {} timed out after {} seconds", id, timeout_secs);
                    emit(
                        &this.events,
                        RadioEvent::PeripheralConnectFailed {
                            id,
                            error: RadioError::Timeout(timeout_secs),
                        },
                    );
                }
            }
        });
    }

    async fn try_connect(&self, device: &Device) -> Result<(), RadioError> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - ID: {}, Name: {:?}", device.id(), name);

        if !device.is_connected().await {
            info!("Initiating connection to {}...", device.id());
            self.adapter.connect_device(device).await?;
        }
        Ok(())
    }

    /// Reports the disconnection of `device` once the platform sees it.
    /// A connection that cannot be watched is torn down and reported too.
    async fn watch_disconnection(&self, id: PeripheralId, device: Device) {
        let mut connection_events = match self.adapter.device_connection_events(&device).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to watch connection events of {}: {}", id, e);
                if let Err(e) = self.adapter.disconnect_device(&device).await {
                    warn!("Failed to disconnect unwatched device {}: {}", id, e);
                }
                self.disconnected(id, Some(e.into()));
                return;
            }
        };

        while let Some(event) = connection_events.next().await {
            if let ConnectionEvent::Disconnected = event {
                info!("Device {} disconnected", id);
                self.disconnected(id, None);
                return;
            }
        }

        warn!("Connection events of {} ended", id);
        self.disconnected(
            id,
            Some(RadioError::Platform("connection event stream ended".to_string())),
        );
    }

    /// Disconnects from a peripheral
    pub fn disconnect(&self, id: &PeripheralId) {
        let Some(device) = self.handles.device(id) else {
            warn!("No device handle for {}, nothing to disconnect", id);
            self.disconnected(id.clone(), None);
            return;
        };

        let this = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            // The connection watcher may report this too; the session ignores the repeat.
            if !device.is_connected().await {
                info!("Device {} not connected", id);
                this.disconnected(id, None);
                return;
            }
            info!("Disconnecting from device {}", id);
            match this.adapter.disconnect_device(&device).await {
                Ok(()) => {
                    info!("Successfully disconnected");
                    this.disconnected(id, None);
                }
                Err(e) => {
                    error!("Failed to disconnect from {}: {}", id, e);
                    this.disconnected(id, Some(e.into()));
                }
            }
        });
    }

    pub fn read_signal_strength(&self, id: &PeripheralId) {
        let Some(device) = self.handles.device(id) else {
            emit(
                &self.events,
                RadioEvent::SignalStrengthRead {
                    id: id.clone(),
                    rssi: Err(RadioError::UnknownPeripheral(id.clone())),
                },
            );
            return;
        };

        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let rssi = device.rssi().await.map_err(RadioError::from);
            emit(&events, RadioEvent::SignalStrengthRead { id, rssi });
        });
    }

    /// Discovers the services in `services` on a connected peripheral
    pub fn discover_services(&self, id: &PeripheralId, services: &[Uuid]) {
        let this = self.clone();
        let id = id.clone();
        let services = services.to_vec();
        tokio::spawn(async move {
            let result = this.try_discover_services(&id, &services).await;
            emit(&this.events, RadioEvent::ServicesDiscovered { id, services: result });
        });
    }

    async fn try_discover_services(
        &self,
        id: &PeripheralId,
        wanted: &[Uuid],
    ) -> Result<Vec<Uuid>, RadioError> {
        let device = self
            .handles
            .device(id)
            .ok_or_else(|| RadioError::UnknownPeripheral(id.clone()))?;

        info!("Discovering services {:?} on {}...", wanted, id);
        let mut found = Vec::new();
        for uuid in wanted {
            for service in device.discover_services_with_uuid(*uuid).await? {
                info!("Found service: {}", service.uuid());
                found.push(service.uuid());
                self.handles.insert_service(id.clone(), service.uuid(), service);
            }
        }
        Ok(found)
    }

    /// Discovers all characteristics of a previously discovered service
    pub fn discover_characteristics(&self, id: &PeripheralId, service: Uuid) {
        let this = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let result = this.try_discover_characteristics(&id, service).await;
            emit(
                &this.events,
                RadioEvent::CharacteristicsDiscovered {
                    id,
                    service,
                    characteristics: result,
                },
            );
        });
    }

    async fn try_discover_characteristics(
        &self,
        id: &PeripheralId,
        service_uuid: Uuid,
    ) -> Result<Vec<DiscoveredCharacteristic>, RadioError> {
        let service = self
            .handles
            .service(id, service_uuid)
            .ok_or_else(|| RadioError::Platform(format!("service {} not discovered", service_uuid)))?;

        let mut discovered = Vec::new();
        for char in service.discover_characteristics().await? {
            let characteristic = CharacteristicRef::new(service_uuid, char.uuid());
            let properties = match char.properties().await {
                Ok(props) => CharacteristicProperties {
                    read: props.read,
                    write: props.write,
                    write_without_response: props.write_without_response,
                    notify: props.notify,
                    indicate: props.indicate,
                },
                Err(e) => {
                    warn!("Failed to read properties of {}: {}", characteristic.uuid, e);
                    CharacteristicProperties::default()
                }
            };
            info!("Found characteristic: {} ({:?})", characteristic.uuid, properties);
            self.handles.insert_characteristic(id.clone(), characteristic, char);
            discovered.push(DiscoveredCharacteristic {
                characteristic,
                properties,
            });
        }
        Ok(discovered)
    }

    fn disconnected(&self, id: PeripheralId, error: Option<RadioError>) {
        report_disconnected(&self.handles, &self.notification_handler, &self.events, id, error);
    }
}

/// Drops the GATT handles and notification streams of `id`, then tells the
/// session the peripheral is gone.
fn report_disconnected(
    handles: &HandleStore,
    notifications: &NotificationHandler,
    events: &RadioEventSender,
    id: PeripheralId,
    error: Option<RadioError>,
) {
    notifications.forget(&id);
    handles.forget_gatt(&id);
    emit(events, RadioEvent::PeripheralDisconnected { id, error });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::radio::radio_event_channel;

    #[test]
    fn disconnect_report_reaches_the_session_with_its_cause() {
        let (events, mut rx) = radio_event_channel();
        let handles = HandleStore::default();
        let notifications = NotificationHandler::new(events.clone());

        report_disconnected(
            &handles,
            &notifications,
            &events,
            "X".into(),
            Some(RadioError::Platform("connection event stream ended".into())),
        );
        report_disconnected(&handles, &notifications, &events, "X".into(), None);

        match rx.try_recv().unwrap() {
            RadioEvent::PeripheralDisconnected { id, error } => {
                assert_eq!(id, PeripheralId::from("X"));
                assert_eq!(error, Some(RadioError::Platform("connection event stream ended".into())));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            RadioEvent::PeripheralDisconnected { error: None, .. }
        ));
    }
}
