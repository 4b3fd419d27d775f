use bluest::Adapter;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::handles::HandleStore;
use crate::core::bluetooth::radio::{RadioError, RadioEvent, RadioEventSender, emit};
use crate::core::bluetooth::types::PeripheralId;

/// Runs at most one advertisement scan at a time and forwards every
/// sighting, duplicates included, as a discovery event. A scan that ends
/// without being cancelled is reported as stopped.
pub struct BluetoothScanner {
    adapter: Adapter,
    handles: HandleStore,
    events: RadioEventSender,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, handles: HandleStore, events: RadioEventSender) -> Self {
        Self {
            adapter,
            handles,
            events,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Starts scanning for peripherals advertising any of `services`.
    /// A scan already in progress is replaced.
    pub fn start_scan(&mut self, services: Vec<Uuid>) {
        if self.scan_task_handle.is_some() {
            self.stop_scan();
        }

        self.cancel_token = CancellationToken::new();
        let cancel_token_for_task = self.cancel_token.clone();
        let adapter_for_task = self.adapter.clone();
        let handles_for_task = self.handles.clone();
        let events_for_task = self.events.clone();

        let handle = tokio::spawn(async move {
            let result = Self::internal_scan_task(
                adapter_for_task,
                services,
                handles_for_task,
                events_for_task.clone(),
                cancel_token_for_task.clone(),
            )
            .await;

            if cancel_token_for_task.is_cancelled() {
                return;
            }
            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    error!("Bluetooth scan failed: {}", e);
                    Some(e)
                }
            };
            emit(&events_for_task, RadioEvent::ScanStopped { error });
        });

        self.scan_task_handle = Some(handle);
        info!("Device scan task started.");
    }

    pub fn stop_scan(&mut self) {
        self.cancel_token.cancel();
        match self.scan_task_handle.take() {
            Some(_) => info!("Stopping Bluetooth scan."),
            None => debug!("No active scan task to stop."),
        }
    }

    async fn internal_scan_task(
        adapter: Adapter,
        services: Vec<Uuid>,
        handles: HandleStore,
        events: RadioEventSender,
        cancel_token: CancellationToken,
    ) -> Result<(), RadioError> {
        info!("Starting bluetooth scan for services {:?}", services);
        let mut scan_stream = adapter.scan(&services).await?;

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let device = discovered_device.device;
                            let id = PeripheralId::new(device.id().to_string());
                            let name = discovered_device
                                .adv_data
                                .local_name
                                .or_else(|| device.name().ok());
                            let rssi = discovered_device.rssi;

                            debug!("Found device - ID: {}, Name: {:?}, RSSI: {:?}", id, name, rssi);
                            handles.insert_device(id.clone(), device);

                            if !emit(&events, RadioEvent::PeripheralDiscovered { id, name, rssi }) {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Bluetooth scan cancelled.");
                    break;
                }
            }
        }
        Ok(())
    }
}
