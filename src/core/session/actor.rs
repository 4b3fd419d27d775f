//! Runs the session controller on a single task.
//!
//! Intents from any number of [`SessionHandle`]s and events from the radio
//! are applied one at a time, in arrival order, so the controller never
//! sees concurrent mutation.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{debug, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::bluetooth::{CharacteristicRef, Peripheral, Radio, RadioEventReceiver};
use crate::core::session::catalog::{ServiceCatalog, ServiceTag};
use crate::core::session::controller::SessionController;
use crate::core::session::state::SessionState;
use crate::core::session::subscription::CharacteristicBinding;

/// Intents accepted by the session
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Start,
    ScanForPeripherals,
    StopScan,
    Connect(Peripheral),
    Disconnect,
    Read(CharacteristicRef),
    Write { data: Vec<u8>, characteristic: CharacteristicRef },
}

/// Cloneable front door to a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    catalog: Arc<ServiceCatalog>,
}

impl SessionHandle {
    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Session is no longer running"))
    }

    pub fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start)
    }

    pub fn scan_for_peripherals(&self) -> Result<()> {
        self.send(SessionCommand::ScanForPeripherals)
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.send(SessionCommand::StopScan)
    }

    pub fn connect(&self, peripheral: &Peripheral) -> Result<()> {
        self.send(SessionCommand::Connect(peripheral.clone()))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(SessionCommand::Disconnect)
    }

    pub fn read_value(&self, characteristic: &impl CharacteristicBinding) -> Result<()> {
        self.send(SessionCommand::Read(characteristic.characteristic()))
    }

    pub fn write(&self, data: Vec<u8>, characteristic: &impl CharacteristicBinding) -> Result<()> {
        self.send(SessionCommand::Write {
            data,
            characteristic: characteristic.characteristic(),
        })
    }

    /// A read-only view that is notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Copy of the latest state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }
}

/// Starts a session over `radio`, scanning for and discovering the services
/// named by `services`. Fails if a tag is missing from the catalog.
pub fn spawn_session<R: Radio>(
    radio: R,
    events: RadioEventReceiver,
    catalog: ServiceCatalog,
    services: &[ServiceTag],
) -> Result<(SessionHandle, JoinHandle<()>)> {
    let service_uuids = catalog.resolve(services)?;
    let controller = SessionController::new(radio, service_uuids);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let handle = SessionHandle {
        commands: commands_tx,
        state: controller.subscribe(),
        catalog: Arc::new(catalog),
    };
    let task = tokio::spawn(run(controller, commands_rx, events));
    Ok((handle, task))
}

async fn run<R: Radio>(
    mut controller: SessionController<R>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut events: RadioEventReceiver,
) {
    info!("Session started.");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut controller, command),
                None => {
                    info!("All session handles dropped.");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => {
                    debug!("Radio event: {:?}", event);
                    controller.handle_event(event);
                }
                None => {
                    info!("Radio event channel closed.");
                    break;
                }
            },
        }
    }
    info!("Session ended.");
}

fn apply<R: Radio>(controller: &mut SessionController<R>, command: SessionCommand) {
    match command {
        SessionCommand::Start => controller.start(),
        SessionCommand::ScanForPeripherals => controller.scan_for_peripherals(),
        SessionCommand::StopScan => controller.stop_scan(),
        SessionCommand::Connect(peripheral) => controller.connect(&peripheral),
        SessionCommand::Disconnect => controller.disconnect(),
        SessionCommand::Read(characteristic) => controller.read_value(characteristic),
        SessionCommand::Write { data, characteristic } => controller.write(&data, characteristic),
    }
}
