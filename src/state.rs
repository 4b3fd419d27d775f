//! Application state management
//! This module wires the Bluetooth radio to a running session and holds the
//! characteristic subscriptions the front end reads from.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::core::bluetooth::{BluetoothManager, radio_event_channel};
use crate::core::session::{
    Generic, GenericSubscription, Notify, NotifySubscription, Readable, ReadableSubscription,
    ServiceTag, SessionHandle, Writable, WritableSubscription, spawn_session,
};

/// One of the three test service characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacteristicSlot {
    Readable,
    Writable,
    Notify,
}

impl FromStr for CharacteristicSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "readable" => Ok(Self::Readable),
            "writable" => Ok(Self::Writable),
            "notify" => Ok(Self::Notify),
            other => bail!("Unknown characteristic: {}", other),
        }
    }
}

impl fmt::Display for CharacteristicSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Readable => "readable",
            Self::Writable => "writable",
            Self::Notify => "notify",
        };
        f.write_str(name)
    }
}

/// Global application state
pub struct AppState {
    pub session: SessionHandle,
    pub readable: ReadableSubscription,
    pub writable: WritableSubscription,
    pub notify: NotifySubscription,
    /// Characteristics of the other active services
    pub extras: Vec<GenericSubscription>,
    session_task: Option<JoinHandle<()>>,
}

impl AppState {
    /// Opens the Bluetooth adapter and starts a session over it
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let catalog = config.catalog()?;
        let (events_tx, events_rx) = radio_event_channel();

        info!("Initializing BluetoothManager...");
        let manager = BluetoothManager::new(&config.bluetooth, events_tx).await?;
        let (session, task) = spawn_session(manager, events_rx, catalog, &config.active_services)?;

        let mut state = Self::from_session(session, &config.active_services);
        state.session_task = Some(task);
        Ok(state)
    }

    /// Builds the subscriptions for an already running session
    pub fn from_session(session: SessionHandle, active_services: &[ServiceTag]) -> Self {
        let extras = active_services
            .iter()
            .filter(|tag| **tag != ServiceTag::test())
            .filter_map(|tag| session.catalog().get(tag))
            .flat_map(|entry| {
                entry.characteristics.iter().map(move |uuid| Generic {
                    uuid: *uuid,
                    service: entry.tag.clone(),
                    service_uuid: entry.uuid,
                })
            })
            .map(|binding| GenericSubscription::new(binding, session.subscribe()))
            .collect();

        Self {
            readable: ReadableSubscription::new(Readable, session.subscribe()),
            writable: WritableSubscription::new(Writable, session.subscribe()),
            notify: NotifySubscription::new(Notify, session.subscribe()),
            extras,
            session,
            session_task: None,
        }
    }

    /// Re-derives every subscription from the latest session state.
    /// Returns true if any value changed.
    pub fn refresh(&mut self) -> bool {
        let mut changed = self.readable.refresh();
        changed |= self.writable.refresh();
        changed |= self.notify.refresh();
        for extra in &mut self.extras {
            changed |= extra.refresh();
        }
        changed
    }

    pub fn value(&self, slot: CharacteristicSlot) -> &str {
        match slot {
            CharacteristicSlot::Readable => self.readable.value(),
            CharacteristicSlot::Writable => self.writable.value(),
            CharacteristicSlot::Notify => self.notify.value(),
        }
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Some(task) = self.session_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::core::session::test_utils::RecordingRadio;
    use crate::core::session::ServiceCatalog;
    use uuid::Uuid;

    #[test]
    fn slot_names_parse() {
        assert_eq!("Writable".parse::<CharacteristicSlot>().unwrap(), CharacteristicSlot::Writable);
        assert_eq!(CharacteristicSlot::Notify.to_string(), "notify");
        assert!("battery".parse::<CharacteristicSlot>().is_err());
    }

    #[tokio::test]
    async fn extras_cover_other_active_services() {
        let auth = ServiceConfig {
            tag: ServiceTag::new("auth"),
            uuid: Uuid::from_u128(0xa0),
            characteristics: vec![Uuid::from_u128(0xa1), Uuid::from_u128(0xa2)],
        };
        let catalog = ServiceCatalog::from_config(&[ServiceConfig::test_service(), auth]).unwrap();
        let active = [ServiceTag::test(), ServiceTag::new("auth")];
        let (_events, rx) = radio_event_channel();
        let (session, _task) = spawn_session(RecordingRadio::default(), rx, catalog, &active).unwrap();

        let state = AppState::from_session(session, &active);
        assert_eq!(state.extras.len(), 2);
        assert_eq!(state.extras[1].binding().uuid, Uuid::from_u128(0xa2));
        assert_eq!(state.extras[1].binding().service_uuid, Uuid::from_u128(0xa0));
        assert_eq!(state.value(CharacteristicSlot::Readable), "");
    }
}
