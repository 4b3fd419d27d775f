use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::{
    BLUETOOTH_OPERATION_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, UUID_NOTIFY_CHAR,
    UUID_READABLE_CHAR, UUID_TEST_SERVICE, UUID_WRITABLE_CHAR,
};
use crate::core::session::ServiceTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Seconds to wait for a connection before reporting it as failed.
    pub connect_timeout_secs: u64,

    /// Seconds to wait for a single read or write.
    pub operation_timeout_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            operation_timeout_secs: BLUETOOTH_OPERATION_TIMEOUT_SECS,
        }
    }
}

/// One row of the service catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub tag: ServiceTag,
    pub uuid: Uuid,
    /// Characteristics of interest
    #[serde(default)]
    pub characteristics: Vec<Uuid>,
}

impl ServiceConfig {
    /// The test service with its readable, writable and notify characteristics
    pub fn test_service() -> Self {
        Self {
            tag: ServiceTag::test(),
            uuid: UUID_TEST_SERVICE,
            characteristics: vec![UUID_READABLE_CHAR, UUID_WRITABLE_CHAR, UUID_NOTIFY_CHAR],
        }
    }
}
