//! Core functionality of the BLE session client
//! `bluetooth` talks to the native radio, `session` turns its events into state.

pub mod bluetooth;
pub mod session;

// Re-export commonly used types
pub use bluetooth::BluetoothManager;
pub use session::{SessionHandle, SessionState, spawn_session};
