//! Bluetooth UUID helpers.
//!
//! Service filters are usually written in their 16-bit short form ("180D").
//! These helpers expand short forms against the Bluetooth base UUID and
//! shorten base-derived UUIDs back for display.

use uuid::Uuid;

use crate::error::{Error, Result};

const BASE_UUID_BITS: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

/// The Bluetooth base UUID (`00000000-0000-1000-8000-00805f9b34fb`).
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(BASE_UUID_BITS);

/// Mask covering the 32 bits a short UUID replaces in the base UUID.
const SHORT_UUID_MASK: u128 = 0xffff_ffff_u128 << 96;

// Common services, mostly useful in filters and tests.
/// Heart Rate service.
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Battery service.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Device Information service.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);

/// Expand a 16-bit or 32-bit short UUID into a full UUID.
pub const fn from_short(short: u32) -> Uuid {
    Uuid::from_u128(BASE_UUID_BITS | ((short as u128) << 96))
}

/// Parse a service UUID from its 16-bit, 32-bit or full textual form.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the string is not a valid UUID.
///
/// # Example
///
/// ```
/// use ble_scan_manager::ble::uuids::{parse_uuid, HEART_RATE_SERVICE_UUID};
///
/// assert_eq!(parse_uuid("180D").unwrap(), HEART_RATE_SERVICE_UUID);
/// ```
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    let trimmed = value.trim();
    let short = match trimmed.len() {
        4 | 8 if trimmed.chars().all(|c| c.is_ascii_hexdigit()) => {
            u32::from_str_radix(trimmed, 16).ok()
        }
        _ => None,
    };

    match short {
        Some(short) => Ok(from_short(short)),
        None => Uuid::parse_str(trimmed).map_err(|_| Error::invalid_parameter("uuid", value)),
    }
}

/// Check if a UUID is derived from the Bluetooth base UUID.
pub fn is_base_derived(uuid: &Uuid) -> bool {
    uuid.as_u128() & !SHORT_UUID_MASK == BASE_UUID_BITS
}

/// Return the 16-bit short form where possible, otherwise the full UUID.
pub fn short_form(uuid: &Uuid) -> String {
    let short = (uuid.as_u128() >> 96) as u32;
    if is_base_derived(uuid) && short <= 0xffff {
        format!("{:04x}", short)
    } else {
        uuid.to_string()
    }
}
