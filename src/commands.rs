//! Front end commands
//! The operations a user interface invokes on the running session. Errors are
//! flattened to strings for display.

use log::info;

use crate::core::session::{Notify, Readable, Writable};
use crate::state::{AppState, CharacteristicSlot};

/// Powers up the radio. Scanning starts once the adapter reports it is on.
pub fn start(app_state: &AppState) -> Result<(), String> {
    app_state.session.start().map_err(|e| e.to_string())
}

/// Connects to a discovered peripheral
///
/// # Arguments
/// * `device_id` - The platform identifier of a peripheral seen while scanning
/// * `app_state` - The application state
pub fn connect_to_device(device_id: &str, app_state: &AppState) -> Result<(), String> {
    let peripheral = app_state
        .session
        .state()
        .peripherals()
        .iter()
        .find(|p| p.id.as_str() == device_id)
        .cloned()
        .ok_or_else(|| format!("Device not found with ID: {}", device_id))?;

    info!("Connect requested for {}", peripheral.id);
    app_state.session.connect(&peripheral).map_err(|e| e.to_string())
}

/// Disconnects from the currently connected peripheral
pub fn disconnect(app_state: &AppState) -> Result<(), String> {
    app_state.session.disconnect().map_err(|e| e.to_string())
}

/// Writes `value` as UTF-8 to one of the test service characteristics
pub fn write_out_value(
    value: &str,
    slot: CharacteristicSlot,
    app_state: &AppState,
) -> Result<(), String> {
    let data = value.as_bytes().to_vec();
    let session = &app_state.session;
    let result = match slot {
        CharacteristicSlot::Readable => session.write(data, &Readable),
        CharacteristicSlot::Writable => session.write(data, &Writable),
        CharacteristicSlot::Notify => session.write(data, &Notify),
    };
    result.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::bluetooth::{RadioEvent, radio_event_channel};
    use crate::core::session::test_utils::{RadioCall, RecordingRadio};
    use crate::core::session::{ServiceCatalog, ServiceTag, spawn_session};

    #[tokio::test]
    async fn connect_to_unknown_device_is_an_error() {
        let (_events, rx) = radio_event_channel();
        let (session, _task) =
            spawn_session(RecordingRadio::default(), rx, ServiceCatalog::default(), &[ServiceTag::test()])
                .unwrap();
        let app_state = AppState::from_session(session, &[ServiceTag::test()]);

        let err = connect_to_device("nope", &app_state).unwrap_err();
        assert_eq!(err, "Device not found with ID: nope");
    }

    #[tokio::test]
    async fn connect_to_discovered_device_reaches_radio() {
        let radio = RecordingRadio::default();
        let (events, rx) = radio_event_channel();
        let (session, _task) =
            spawn_session(radio.clone(), rx, ServiceCatalog::default(), &[ServiceTag::test()]).unwrap();
        let app_state = AppState::from_session(session, &[ServiceTag::test()]);

        start(&app_state).unwrap();
        events
            .send(RadioEvent::PeripheralDiscovered { id: "X".into(), name: None, rssi: Some(-70) })
            .unwrap();
        let mut state = app_state.session.subscribe();
        tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| !s.peripherals().is_empty()))
            .await
            .unwrap()
            .unwrap();

        connect_to_device("X", &app_state).unwrap();
        for _ in 0..200 {
            if radio.count(|c| c == &RadioCall::Connect("X".into())) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connect never reached the radio: {:?}", radio.calls());
    }

    #[tokio::test]
    async fn commands_fail_once_the_session_has_ended() {
        let (events, rx) = radio_event_channel();
        let (session, task) =
            spawn_session(RecordingRadio::default(), rx, ServiceCatalog::default(), &[ServiceTag::test()])
                .unwrap();
        let app_state = AppState::from_session(session, &[ServiceTag::test()]);

        drop(events);
        task.await.unwrap();
        assert!(disconnect(&app_state).is_err());
        assert!(write_out_value("hi", CharacteristicSlot::Writable, &app_state).is_err());
    }
}
