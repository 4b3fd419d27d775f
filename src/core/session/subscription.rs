//! Characteristic subscriptions
//! Each subscription follows one characteristic of the session state and
//! keeps a decoded string view of its latest value.

use tokio::sync::watch;
use uuid::Uuid;

use crate::core::bluetooth::{
    CharacteristicRef, UUID_NOTIFY_CHAR, UUID_READABLE_CHAR, UUID_TEST_SERVICE, UUID_WRITABLE_CHAR,
};
use crate::core::session::catalog::ServiceTag;
use crate::core::session::mirror::{CharacteristicRole, decode_utf8};
use crate::core::session::state::SessionState;

/// Binds a subscription to one characteristic of one service
pub trait CharacteristicBinding {
    fn uuid(&self) -> Uuid;
    fn service(&self) -> ServiceTag;
    fn service_uuid(&self) -> Uuid;
    fn role(&self) -> CharacteristicRole;

    fn characteristic(&self) -> CharacteristicRef {
        CharacteristicRef::new(self.service_uuid(), self.uuid())
    }
}

/// The readable characteristic of the test service
#[derive(Debug, Clone, Copy, Default)]
pub struct Readable;

/// The writable characteristic of the test service
#[derive(Debug, Clone, Copy, Default)]
pub struct Writable;

/// The notifying characteristic of the test service
#[derive(Debug, Clone, Copy, Default)]
pub struct Notify;

/// Any characteristic of any catalog service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generic {
    pub uuid: Uuid,
    pub service: ServiceTag,
    pub service_uuid: Uuid,
}

impl CharacteristicBinding for Readable {
    fn uuid(&self) -> Uuid {
        UUID_READABLE_CHAR
    }
    fn service(&self) -> ServiceTag {
        ServiceTag::test()
    }
    fn service_uuid(&self) -> Uuid {
        UUID_TEST_SERVICE
    }
    fn role(&self) -> CharacteristicRole {
        CharacteristicRole::Read
    }
}

impl CharacteristicBinding for Writable {
    fn uuid(&self) -> Uuid {
        UUID_WRITABLE_CHAR
    }
    fn service(&self) -> ServiceTag {
        ServiceTag::test()
    }
    fn service_uuid(&self) -> Uuid {
        UUID_TEST_SERVICE
    }
    fn role(&self) -> CharacteristicRole {
        CharacteristicRole::Write
    }
}

impl CharacteristicBinding for Notify {
    fn uuid(&self) -> Uuid {
        UUID_NOTIFY_CHAR
    }
    fn service(&self) -> ServiceTag {
        ServiceTag::test()
    }
    fn service_uuid(&self) -> Uuid {
        UUID_TEST_SERVICE
    }
    fn role(&self) -> CharacteristicRole {
        CharacteristicRole::Notify
    }
}

impl CharacteristicBinding for Generic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
    fn service(&self) -> ServiceTag {
        self.service.clone()
    }
    fn service_uuid(&self) -> Uuid {
        self.service_uuid
    }
    fn role(&self) -> CharacteristicRole {
        CharacteristicRole::Generic
    }
}

/// Decoded view of one characteristic.
///
/// The value is re-derived from the whole characteristic list on every
/// state change, which is fine for the handful of characteristics a
/// service exposes.
pub struct CharacteristicSubscription<B> {
    binding: B,
    state: watch::Receiver<SessionState>,
    value: String,
}

pub type ReadableSubscription = CharacteristicSubscription<Readable>;
pub type WritableSubscription = CharacteristicSubscription<Writable>;
pub type NotifySubscription = CharacteristicSubscription<Notify>;
pub type GenericSubscription = CharacteristicSubscription<Generic>;

impl<B: CharacteristicBinding> CharacteristicSubscription<B> {
    pub fn new(binding: B, state: watch::Receiver<SessionState>) -> Self {
        let mut subscription = Self {
            binding,
            state,
            value: String::new(),
        };
        subscription.refresh();
        subscription
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    /// Last derived value; empty when absent or not valid UTF-8
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Re-derives the value from the latest state. Returns true if it changed.
    pub fn refresh(&mut self) -> bool {
        let characteristic = self.binding.characteristic();
        let derived = {
            let state = self.state.borrow_and_update();
            decode_utf8(
                state
                    .characteristic(&characteristic)
                    .and_then(|mirror| mirror.value.as_deref()),
            )
        };
        let changed = derived != self.value;
        self.value = derived;
        changed
    }

    /// Waits for the next state change and re-derives the value.
    /// Returns `None` once the session has ended.
    pub async fn changed(&mut self) -> Option<&str> {
        self.state.changed().await.ok()?;
        self.refresh();
        Some(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::{Peripheral, PeripheralId, RadioEvent};
    use crate::core::session::controller::SessionController;
    use crate::core::session::test_utils::RecordingRadio;

    fn connected_controller() -> SessionController<RecordingRadio> {
        let mut c = SessionController::new(RecordingRadio::default(), vec![UUID_TEST_SERVICE]);
        c.handle_event(RadioEvent::PeripheralDiscovered {
            id: "X".into(),
            name: None,
            rssi: Some(-50),
        });
        c.handle_event(RadioEvent::PeripheralConnected { id: "X".into() });
        c
    }

    fn push(c: &mut SessionController<RecordingRadio>, uuid: Uuid, payload: &[u8]) {
        push_to(c, CharacteristicRef::new(UUID_TEST_SERVICE, uuid), payload);
    }

    fn push_to(c: &mut SessionController<RecordingRadio>, characteristic: CharacteristicRef, payload: &[u8]) {
        c.handle_event(RadioEvent::CharacteristicValueUpdated {
            id: PeripheralId::from("X"),
            characteristic,
            value: Ok(payload.to_vec()),
        });
    }

    #[test]
    fn typed_bindings_match_test_service() {
        assert_eq!(Readable.uuid(), UUID_READABLE_CHAR);
        assert_eq!(Writable.role(), CharacteristicRole::Write);
        assert_eq!(Notify.service(), ServiceTag::test());
        assert_eq!(
            Readable.characteristic(),
            CharacteristicRef::new(UUID_TEST_SERVICE, UUID_READABLE_CHAR)
        );
    }

    #[test]
    fn value_is_empty_until_first_update() {
        let c = connected_controller();
        let readable = ReadableSubscription::new(Readable, c.subscribe());
        assert_eq!(readable.value(), "");
    }

    #[test]
    fn refresh_follows_own_uuid_only() {
        let mut c = connected_controller();
        let mut readable = ReadableSubscription::new(Readable, c.subscribe());
        let mut notify = NotifySubscription::new(Notify, c.subscribe());

        push(&mut c, UUID_READABLE_CHAR, b"42");
        assert!(readable.refresh());
        assert!(!notify.refresh());
        assert_eq!(readable.value(), "42");
        assert_eq!(notify.value(), "");

        push(&mut c, UUID_NOTIFY_CHAR, &[0xc3, 0x28]);
        assert!(!notify.refresh());
        assert_eq!(notify.value(), "");
    }

    #[test]
    fn generic_binding_reads_arbitrary_uuid() {
        let custom = Uuid::from_u128(0x1234);
        let custom_service = Uuid::from_u128(0x1200);
        let mut c = connected_controller();
        let mut generic = GenericSubscription::new(
            Generic {
                uuid: custom,
                service: ServiceTag::new("custom"),
                service_uuid: custom_service,
            },
            c.subscribe(),
        );

        push(&mut c, custom, "wrong service".as_bytes());
        assert!(!generic.refresh());
        push_to(&mut c, CharacteristicRef::new(custom_service, custom), "ok".as_bytes());
        generic.refresh();
        assert_eq!(generic.value(), "ok");
        assert_eq!(generic.binding().service, ServiceTag::new("custom"));
    }

    #[tokio::test]
    async fn changed_resolves_after_update_and_ends_with_session() {
        let mut c = connected_controller();
        let mut writable = WritableSubscription::new(Writable, c.subscribe());

        push(&mut c, UUID_WRITABLE_CHAR, b"v1");
        assert_eq!(writable.changed().await, Some("v1"));

        drop(c);
        assert_eq!(writable.changed().await, None);
    }

    #[test]
    fn disconnect_empties_values() {
        let mut c = connected_controller();
        let mut readable = ReadableSubscription::new(Readable, c.subscribe());
        push(&mut c, UUID_READABLE_CHAR, b"42");
        readable.refresh();

        c.handle_event(RadioEvent::PeripheralDisconnected { id: "X".into(), error: None });
        assert!(readable.refresh());
        assert_eq!(readable.value(), "");

        let bare = Peripheral::from_id("X".into());
        c.connect(&bare);
        assert!(!readable.refresh());
    }
}
