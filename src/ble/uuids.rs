//! BLE Service, Characteristic and Descriptor UUIDs.
//!
//! Contains the UUID constants used by the Current Time Service client.

use uuid::Uuid;

/// Base UUID used to expand 16-bit SIG-assigned numbers.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG-assigned number to a full 128-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Extract the 16-bit SIG-assigned number if `uuid` is based on the Bluetooth base UUID.
pub fn short_uuid(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & !(0xFFFF_u128 << 96) == BLUETOOTH_BASE_UUID {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

// Current Time Service (Standard BLE)
/// Current Time Service UUID (0x1805).
pub const CURRENT_TIME_SERVICE_UUID: Uuid = uuid_from_u16(0x1805);
/// Current Time characteristic UUID (0x2A2B, Read, Notify).
pub const CURRENT_TIME_UUID: Uuid = uuid_from_u16(0x2A2B);
/// Local Time Information characteristic UUID (0x2A0F, Read).
pub const LOCAL_TIME_INFORMATION_UUID: Uuid = uuid_from_u16(0x2A0F);

// Descriptors
/// Client Characteristic Configuration descriptor UUID (0x2902).
pub const CLIENT_CHARACTERISTIC_CONFIGURATION_UUID: Uuid = uuid_from_u16(0x2902);

/// Check if a service UUID is the Current Time Service.
pub fn is_cts_service(uuid: &Uuid) -> bool {
    *uuid == CURRENT_TIME_SERVICE_UUID
}
