//! Bluetooth manager
//! The bluest-backed implementation of the native radio.

use std::time::Duration;

use anyhow::{Result, anyhow};
use bluest::{Adapter, AdapterEvent, Characteristic};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::BluetoothConfig;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::constants::ADAPTER_AVAILABILITY_WAIT_MS;
use crate::core::bluetooth::handles::HandleStore;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::radio::{Radio, RadioError, RadioEvent, RadioEventSender, emit};
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::types::{AdapterState, CharacteristicRef, PeripheralId};

/// Manages Bluetooth operations on the default adapter
pub struct BluetoothManager {
    adapter: Adapter,
    events: RadioEventSender,
    handles: HandleStore,
    /// Bluetooth scanner
    scanner: BluetoothScanner,
    /// Connection manager
    connection_manager: ConnectionManager,
    /// Notification handler
    notification_handler: NotificationHandler,
    operation_timeout: Duration,
    adapter_watch: Option<JoinHandle<()>>,
}

impl BluetoothManager {
    /// Creates a new BluetoothManager reporting to `events`
    pub async fn new(config: &BluetoothConfig, events: RadioEventSender) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        info!("Bluetooth adapter found.");

        let handles = HandleStore::default();
        let notification_handler = NotificationHandler::new(events.clone());
        let connection_manager = ConnectionManager::new(
            adapter.clone(),
            handles.clone(),
            notification_handler.clone(),
            events.clone(),
            Duration::from_secs(config.connect_timeout_secs),
        );
        let scanner = BluetoothScanner::new(adapter.clone(), handles.clone(), events.clone());

        Ok(Self {
            adapter,
            events,
            handles,
            scanner,
            connection_manager,
            notification_handler,
            operation_timeout: Duration::from_secs(config.operation_timeout_secs),
            adapter_watch: None,
        })
    }

    /// Reports the adapter as powered off until it becomes available, then
    /// every availability change after that.
    async fn watch_adapter(adapter: Adapter, events: RadioEventSender) {
        // Subscribe first so no transition is missed while waiting.
        let mut adapter_events = match adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to subscribe to adapter events: {}", e);
                return;
            }
        };

        let available = adapter.wait_available();
        tokio::pin!(available);
        let waited = tokio::time::timeout(
            Duration::from_millis(ADAPTER_AVAILABILITY_WAIT_MS),
            &mut available,
        )
        .await;
        let ready = match waited {
            Ok(ready) => ready,
            Err(_) => {
                info!("Waiting for the Bluetooth adapter to become available...");
                if !emit(&events, RadioEvent::AdapterStateChanged(AdapterState::PoweredOff)) {
                    return;
                }
                available.await
            }
        };
        if let Err(e) = ready {
            error!("Bluetooth adapter never became available: {}", e);
            return;
        }
        info!("Bluetooth adapter is available.");
        if !emit(&events, RadioEvent::AdapterStateChanged(AdapterState::PoweredOn)) {
            return;
        }

        while let Some(event) = adapter_events.next().await {
            let state = match event {
                Ok(AdapterEvent::Available) => AdapterState::PoweredOn,
                Ok(AdapterEvent::Unavailable) => AdapterState::PoweredOff,
                Err(e) => {
                    error!("Error in adapter event stream: {}", e);
                    continue;
                }
            };
            info!("Adapter state changed: {:?}", state);
            if !emit(&events, RadioEvent::AdapterStateChanged(state)) {
                break;
            }
        }
        info!("Adapter event stream ended");
    }

    fn characteristic_handle(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Result<Characteristic, RadioError> {
        self.handles
            .characteristic(id, characteristic)
            .ok_or(RadioError::UnknownCharacteristic(characteristic.uuid))
    }
}

impl Radio for BluetoothManager {
    fn activate(&mut self) {
        if self.adapter_watch.is_some() {
            debug!("Adapter already active");
            return;
        }
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        self.adapter_watch = Some(tokio::spawn(Self::watch_adapter(adapter, events)));
    }

    fn scan(&mut self, services: &[Uuid], allow_duplicates: bool) {
        if !allow_duplicates {
            debug!("Duplicate advertisements are always reported by this backend");
        }
        self.scanner.start_scan(services.to_vec());
    }

    fn stop_scan(&mut self) {
        self.scanner.stop_scan();
    }

    fn connect(&mut self, id: &PeripheralId) {
        self.connection_manager.connect(id);
    }

    fn disconnect(&mut self, id: &PeripheralId) {
        self.connection_manager.disconnect(id);
    }

    fn read_signal_strength(&mut self, id: &PeripheralId) {
        self.connection_manager.read_signal_strength(id);
    }

    fn discover_services(&mut self, id: &PeripheralId, services: &[Uuid]) {
        self.connection_manager.discover_services(id, services);
    }

    fn discover_characteristics(&mut self, id: &PeripheralId, service: Uuid) {
        self.connection_manager.discover_characteristics(id, service);
    }

    fn read_value(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef) {
        let id = id.clone();
        let characteristic = *characteristic;
        let handle = match self.characteristic_handle(&id, &characteristic) {
            Ok(handle) => handle,
            Err(e) => {
                emit(
                    &self.events,
                    RadioEvent::CharacteristicValueUpdated { id, characteristic, value: Err(e) },
                );
                return;
            }
        };

        let events = self.events.clone();
        let timeout = self.operation_timeout;
        tokio::spawn(async move {
            let value = match tokio::time::timeout(timeout, handle.read()).await {
                Ok(result) => result.map_err(RadioError::from),
                Err(_) => Err(RadioError::Timeout(timeout.as_secs())),
            };
            emit(&events, RadioEvent::CharacteristicValueUpdated { id, characteristic, value });
        });
    }

    fn write_value(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef, payload: &[u8]) {
        let id = id.clone();
        let characteristic = *characteristic;
        let handle = match self.characteristic_handle(&id, &characteristic) {
            Ok(handle) => handle,
            Err(e) => {
                emit(
                    &self.events,
                    RadioEvent::CharacteristicWritten { id, characteristic, result: Err(e) },
                );
                return;
            }
        };

        let events = self.events.clone();
        let timeout = self.operation_timeout;
        let data = payload.to_vec();
        tokio::spawn(async move {
            debug!("Writing {:?} to {}", data, characteristic.uuid);
            let result = match tokio::time::timeout(timeout, handle.write(&data)).await {
                Ok(result) => result.map_err(RadioError::from),
                Err(_) => Err(RadioError::Timeout(timeout.as_secs())),
            };
            emit(&events, RadioEvent::CharacteristicWritten { id, characteristic, result });
        });
    }

    fn set_notify(&mut self, id: &PeripheralId, characteristic: &CharacteristicRef, enabled: bool) {
        match self.characteristic_handle(id, characteristic) {
            Ok(handle) => {
                self.notification_handler
                    .set_notify(id.clone(), *characteristic, handle, enabled);
            }
            Err(e) => {
                emit(
                    &self.events,
                    RadioEvent::NotifyStateChanged {
                        id: id.clone(),
                        characteristic: *characteristic,
                        result: Err(e),
                    },
                );
            }
        }
    }
}
