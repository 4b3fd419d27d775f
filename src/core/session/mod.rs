//! The BLE session engine
//! Owns the observable session state and drives the radio through scanning,
//! connection, discovery and characteristic synchronization.

mod actor;
mod catalog;
mod controller;
mod mirror;
mod state;
mod subscription;

#[cfg(test)]
pub(crate) mod test_utils;

pub use actor::{SessionCommand, SessionHandle, spawn_session};
pub use catalog::{ServiceCatalog, ServiceEntry, ServiceTag};
pub use controller::SessionController;
pub use mirror::{CharacteristicMirror, CharacteristicRole, decode_utf8};
pub use state::{FailedOperation, SessionFailure, SessionState, SessionStore};
pub use subscription::{
    CharacteristicBinding, CharacteristicSubscription, Generic, GenericSubscription, Notify,
    NotifySubscription, Readable, ReadableSubscription, Writable, WritableSubscription,
};
