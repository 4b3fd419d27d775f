use std::path::PathBuf;

use anyhow::Result;
use ble_session_lib::commands;
use ble_session_lib::config::{AppConfig, CONFIG_FILE_NAME};
use ble_session_lib::core::bluetooth::{AdapterState, PeripheralId};
use ble_session_lib::core::session::{FailedOperation, SessionFailure, SessionState};
use ble_session_lib::logging;
use ble_session_lib::state::{AppState, CharacteristicSlot};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

/// What the console has already printed
#[derive(Default)]
struct Shown {
    adapter: Option<AdapterState>,
    peripherals: usize,
    connecting: Option<PeripheralId>,
    connected: Option<PeripheralId>,
    failure: Option<SessionFailure>,
    auto_connected: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    let config = AppConfig::load_config(&config_path).await?;
    logging::init(&config.log_level);

    let mut app_state = match AppState::new(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize AppState with BluetoothManager: {}", e);
            return Err(e);
        }
    };
    commands::start(&app_state).map_err(anyhow::Error::msg)?;

    let mut updates = app_state.session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = Shown::default();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down.");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("Session ended.");
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                report(&snapshot, &mut shown, &app_state);
                if app_state.refresh() {
                    print_values(&app_state);
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = commands::write_out_value(line.trim_end(), CharacteristicSlot::Writable, &app_state) {
                        error!("Write failed: {}", e);
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    if let Err(e) = commands::disconnect(&app_state) {
        warn!("Disconnect on shutdown failed: {}", e);
    }
    Ok(())
}

fn report(state: &SessionState, shown: &mut Shown, app_state: &AppState) {
    if shown.adapter != Some(state.adapter_state()) {
        println!("Adapter: {:?}", state.adapter_state());
        shown.adapter = Some(state.adapter_state());
    }

    for peripheral in state.peripherals().iter().skip(shown.peripherals) {
        println!(
            "Found {} ({}) rssi {}",
            peripheral.name.as_deref().unwrap_or("No Name"),
            peripheral.id,
            peripheral.rssi.map_or("?".to_string(), |r| r.to_string())
        );
    }
    shown.peripherals = state.peripherals().len();

    if shown.connecting.as_ref() != state.connecting() {
        if let Some(id) = state.connecting() {
            println!("Connecting to {}...", id);
        }
        shown.connecting = state.connecting().cloned();
    }

    if shown.connected.as_ref() != state.connected_id() {
        match state.connected_id() {
            Some(id) => println!("Connected to {}", id),
            None => println!("Disconnected"),
        }
        shown.connected = state.connected_id().cloned();
    }

    if shown.failure.as_ref() != state.last_failure() {
        if let Some(failure) = state.last_failure() {
            println!("{:?} failed on {}: {}", failure.operation, failure.peripheral, failure.message);
            // Retry once the failed connect has been reported
            if failure.operation == FailedOperation::Connect {
                shown.auto_connected = false;
            }
        }
        shown.failure = state.last_failure().cloned();
    }

    if !shown.auto_connected && state.connected().is_none() && state.connecting().is_none() {
        if let Some(first) = state.peripherals().iter().find(|p| p.is_live()) {
            shown.auto_connected = true;
            if let Err(e) = commands::connect_to_device(first.id.as_str(), app_state) {
                error!("Auto-connect failed: {}", e);
            }
        }
    }
}

fn print_values(app_state: &AppState) {
    println!(
        "readable: {:?}  writable: {:?}  notify: {:?}",
        app_state.value(CharacteristicSlot::Readable),
        app_state.value(CharacteristicSlot::Writable),
        app_state.value(CharacteristicSlot::Notify)
    );
    for extra in &app_state.extras {
        let binding = extra.binding();
        println!("{} {}: {:?}", binding.service, binding.uuid, extra.value());
    }
}
