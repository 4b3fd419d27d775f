//! Constants used throughout the application
//! This module contains the constant values used by the bluetooth layer,
//! such as UUIDs and timeouts.

use uuid::Uuid;

/// Tag of the test service in the service catalog
pub const TEST_SERVICE_TAG: &str = "test";

/// The UUID of the test GATT service
pub const UUID_TEST_SERVICE: Uuid = Uuid::from_u128(0x00ff0000_1000_1000_1000_ffffffff0000);

/// The UUID of the writable test characteristic
pub const UUID_WRITABLE_CHAR: Uuid = Uuid::from_u128(0x00ff0000_1000_1000_1000_000000000001);

/// The UUID of the readable test characteristic
pub const UUID_READABLE_CHAR: Uuid = Uuid::from_u128(0x00ff0000_1000_1000_1000_000000000002);

/// The UUID of the notifying test characteristic
pub const UUID_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x00ff0000_1000_1000_1000_000000000003);

/// Timeout for establishing a connection in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Timeout for Bluetooth operations in seconds
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 10;

/// How long the adapter watcher waits before reporting the adapter as off
pub const ADAPTER_AVAILABILITY_WAIT_MS: u64 = 500;
