//! Client Characteristic Configuration descriptor values.
//!
//! The CCCD is a 2-byte little-endian bitmask:
//! - Bit 0: Notifications enabled
//! - Bit 1: Indications enabled
//! - Bits 2-15: Reserved

use bytes::Bytes;

use crate::error::{Error, Result};

/// Value written to (or read from) a Client Characteristic Configuration descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CccdValue(u16);

impl CccdValue {
    /// Size of the descriptor value in bytes.
    pub const SIZE: usize = 2;

    /// Notification enable bit.
    pub const NOTIFY: u16 = 0x0001;

    /// Indication enable bit.
    pub const INDICATE: u16 = 0x0002;

    /// Neither notifications nor indications.
    pub const DISABLED: Self = Self(0);

    /// Notifications only.
    pub const NOTIFICATIONS: Self = Self(Self::NOTIFY);

    /// Get raw bits.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Check whether notifications are enabled.
    pub fn notifications_enabled(self) -> bool {
        self.0 & Self::NOTIFY != 0
    }

    /// Check whether indications are enabled.
    pub fn indications_enabled(self) -> bool {
        self.0 & Self::INDICATE != 0
    }

    /// Parse from the 2-byte wire layout.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        match data {
            [lo, hi] => Ok(Self(u16::from_le_bytes([*lo, *hi]))),
            _ => Err(Error::malformed(format!(
                "CCCD value must be {} bytes, got {}",
                Self::SIZE,
                data.len()
            ))),
        }
    }

    /// Encode to the 2-byte wire layout.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }

    /// Encode as a write payload.
    pub fn to_payload(self) -> Bytes {
        Bytes::copy_from_slice(&self.to_bytes())
    }
}
