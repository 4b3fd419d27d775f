//! Notification handling
//! One background task per subscribed characteristic turns pushed values
//! into value-updated events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::radio::{RadioError, RadioEvent, RadioEventSender, emit};
use crate::core::bluetooth::types::{CharacteristicRef, PeripheralId};
use crate::utils::lock_or_recover;

type SubscriptionKey = (PeripheralId, CharacteristicRef);

/// Notification handler for characteristic value pushes
#[derive(Clone)]
pub struct NotificationHandler {
    events: RadioEventSender,
    subscriptions: Arc<Mutex<HashMap<SubscriptionKey, CancellationToken>>>,
}

impl NotificationHandler {
    pub fn new(events: RadioEventSender) -> Self {
        Self {
            events,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enables or disables notification delivery for one characteristic
    pub fn set_notify(
        &self,
        id: PeripheralId,
        characteristic: CharacteristicRef,
        handle: Characteristic,
        enabled: bool,
    ) {
        let key = (id.clone(), characteristic);
        if !enabled {
            if let Some(token) = lock_or_recover(&self.subscriptions).remove(&key) {
                token.cancel();
            }
            info!("Notifications disabled for {}", characteristic.uuid);
            emit(
                &self.events,
                RadioEvent::NotifyStateChanged { id, characteristic, result: Ok(false) },
            );
            return;
        }

        let token = {
            let mut subscriptions = lock_or_recover(&self.subscriptions);
            if subscriptions.contains_key(&key) {
                debug!("Already subscribed to {}", characteristic.uuid);
                return;
            }
            let token = CancellationToken::new();
            subscriptions.insert(key, token.clone());
            token
        };

        let events = self.events.clone();
        let subscriptions = self.subscriptions.clone();
        tokio::spawn(async move {
            let key = (id.clone(), characteristic);
            Self::process_notifications(id, characteristic, handle, events, token.clone()).await;
            // A cancelled token has already been removed, possibly replaced by a newer one.
            if !token.is_cancelled() {
                lock_or_recover(&subscriptions).remove(&key);
            }
        });
    }

    /// Stops every notification stream belonging to `id`
    pub fn forget(&self, id: &PeripheralId) {
        lock_or_recover(&self.subscriptions).retain(|(owner, _), token| {
            if owner == id {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    async fn process_notifications(
        id: PeripheralId,
        characteristic: CharacteristicRef,
        handle: Characteristic,
        events: RadioEventSender,
        token: CancellationToken,
    ) {
        info!("Subscribing to notifications for {}...", characteristic.uuid);

        match handle.notify().await {
            Ok(mut notification_stream) => {
                emit(
                    &events,
                    RadioEvent::NotifyStateChanged {
                        id: id.clone(),
                        characteristic,
                        result: Ok(true),
                    },
                );
                loop {
                    tokio::select! {
                        result = notification_stream.next() => {
                            let value = match result {
                                Some(Ok(value)) => {
                                    debug!("Received notification from {}: {:?}", characteristic.uuid, value);
                                    Ok(value)
                                }
                                Some(Err(e)) => {
                                    error!("Error in notification stream: {}", e);
                                    Err(RadioError::from(e))
                                }
                                None => break,
                            };
                            let failed = value.is_err();
                            let event = RadioEvent::CharacteristicValueUpdated {
                                id: id.clone(),
                                characteristic,
                                value,
                            };
                            if !emit(&events, event) || failed {
                                break;
                            }
                        }
                        _ = token.cancelled() => break,
                    }
                }
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                emit(
                    &events,
                    RadioEvent::NotifyStateChanged {
                        id,
                        characteristic,
                        result: Err(e.into()),
                    },
                );
            }
        }

        info!("Notification stream for {} ended", characteristic.uuid);
    }
}
