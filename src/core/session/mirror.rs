//! Mirrored characteristic values of the connected peripheral.

use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::{CharacteristicProperties, CharacteristicRef};

/// Logical role of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacteristicRole {
    Read,
    Write,
    Notify,
    Generic,
}

impl CharacteristicRole {
    /// Picks the most specific role the properties allow: push beats write
    /// beats read.
    pub fn from_properties(properties: &CharacteristicProperties) -> Self {
        if properties.supports_notify() {
            Self::Notify
        } else if properties.write || properties.write_without_response {
            Self::Write
        } else if properties.read {
            Self::Read
        } else {
            Self::Generic
        }
    }
}

/// Latest known value of one characteristic. Identified by its UUID within
/// its service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicMirror {
    pub service: Uuid,
    pub uuid: Uuid,
    pub role: CharacteristicRole,
    pub value: Option<Vec<u8>>,
}

impl CharacteristicMirror {
    pub fn new(
        characteristic: CharacteristicRef,
        role: CharacteristicRole,
        value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            service: characteristic.service,
            uuid: characteristic.uuid,
            role,
            value,
        }
    }

    pub fn characteristic(&self) -> CharacteristicRef {
        CharacteristicRef::new(self.service, self.uuid)
    }

    /// UTF-8 view of the payload; empty when absent or not valid UTF-8
    pub fn decoded(&self) -> String {
        decode_utf8(self.value.as_deref())
    }
}

pub fn decode_utf8(value: Option<&[u8]>) -> String {
    value
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .map(str::to_owned)
        .unwrap_or_default()
}

/// Inserts or overwrites the mirror for `characteristic`. Returns true if
/// anything changed.
pub(crate) fn upsert(
    mirrors: &mut Vec<CharacteristicMirror>,
    characteristic: CharacteristicRef,
    role: CharacteristicRole,
    value: Vec<u8>,
) -> bool {
    match mirrors.iter_mut().find(|m| m.characteristic() == characteristic) {
        Some(existing) => {
            let changed = existing.value.as_deref() != Some(value.as_slice()) || existing.role != role;
            existing.value = Some(value);
            existing.role = role;
            changed
        }
        None => {
            mirrors.push(CharacteristicMirror::new(characteristic, role, Some(value)));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: Uuid = Uuid::from_u128(0x5);
    const OTHER_SERVICE: Uuid = Uuid::from_u128(0x6);
    const CHAR_A: CharacteristicRef = CharacteristicRef::new(SERVICE, Uuid::from_u128(0xa));
    const CHAR_B: CharacteristicRef = CharacteristicRef::new(SERVICE, Uuid::from_u128(0xb));

    #[test]
    fn decoding_falls_back_to_empty() {
        assert_eq!(decode_utf8(None), "");
        assert_eq!(decode_utf8(Some(&[0xff, 0xfe])), "");
        assert_eq!(decode_utf8(Some("héllo".as_bytes())), "héllo");
    }

    #[test]
    fn upsert_appends_then_overwrites_in_place() {
        let mut mirrors = Vec::new();
        assert!(upsert(&mut mirrors, CHAR_A, CharacteristicRole::Read, b"one".to_vec()));
        assert!(upsert(&mut mirrors, CHAR_B, CharacteristicRole::Notify, b"x".to_vec()));
        assert!(upsert(&mut mirrors, CHAR_A, CharacteristicRole::Read, b"two".to_vec()));

        assert_eq!(mirrors.len(), 2);
        assert_eq!(mirrors[0].characteristic(), CHAR_A);
        assert_eq!(mirrors[0].decoded(), "two");
    }

    #[test]
    fn same_uuid_in_another_service_is_a_separate_mirror() {
        let shadow = CharacteristicRef::new(OTHER_SERVICE, CHAR_A.uuid);
        let mut mirrors = Vec::new();
        upsert(&mut mirrors, CHAR_A, CharacteristicRole::Read, b"test".to_vec());
        assert!(upsert(&mut mirrors, shadow, CharacteristicRole::Read, b"auth".to_vec()));

        assert_eq!(mirrors.len(), 2);
        assert_eq!(mirrors[0].decoded(), "test");
        assert_eq!(mirrors[1].decoded(), "auth");
    }

    #[test]
    fn identical_value_reports_no_change() {
        let mut mirrors = Vec::new();
        upsert(&mut mirrors, CHAR_A, CharacteristicRole::Read, b"same".to_vec());
        assert!(!upsert(&mut mirrors, CHAR_A, CharacteristicRole::Read, b"same".to_vec()));
    }

    #[test]
    fn role_follows_properties() {
        let notify = CharacteristicProperties { read: true, notify: true, ..Default::default() };
        let write = CharacteristicProperties { read: true, write: true, ..Default::default() };
        let read = CharacteristicProperties { read: true, ..Default::default() };

        assert_eq!(CharacteristicRole::from_properties(&notify), CharacteristicRole::Notify);
        assert_eq!(CharacteristicRole::from_properties(&write), CharacteristicRole::Write);
        assert_eq!(CharacteristicRole::from_properties(&read), CharacteristicRole::Read);
        assert_eq!(
            CharacteristicRole::from_properties(&CharacteristicProperties::default()),
            CharacteristicRole::Generic
        );
    }
}
