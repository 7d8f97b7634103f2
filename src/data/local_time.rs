//! Local Time Information characteristic data structures.

use bytes::{Buf, BufMut};
use chrono::FixedOffset;

use crate::error::{Error, Result};
use crate::utils::{minutes_to_quarter_hours, quarter_hours_to_minutes};

/// Value of the Local Time Information characteristic.
///
/// Both offsets are expressed in 15-minute increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalTime {
    /// Offset from UTC (-48..=56, -128 = unknown).
    pub time_zone: i8,
    /// Daylight saving offset (0, 2, 4 or 8, 255 = unknown).
    pub dst_offset: u8,
}

impl LocalTime {
    /// Size of the encoded characteristic value in bytes.
    pub const SIZE: usize = 2;

    /// Raw time zone value meaning "unknown".
    pub const TIME_ZONE_UNKNOWN: i8 = -128;

    /// Raw DST offset value meaning "unknown".
    pub const DST_OFFSET_UNKNOWN: u8 = 255;

    /// Create a new local time value.
    pub fn new(time_zone: i8, dst_offset: u8) -> Self {
        Self {
            time_zone,
            dst_offset,
        }
    }

    /// Build from offsets in minutes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the time zone is not a multiple
    /// of 15 minutes in -12:00..=+14:00, or the DST offset is not 0, 30, 60
    /// or 120 minutes.
    pub fn from_minutes(time_zone_minutes: i32, dst_minutes: i32) -> Result<Self> {
        let time_zone = minutes_to_quarter_hours(time_zone_minutes)
            .filter(|units| (-48..=56).contains(units))
            .ok_or_else(|| Error::InvalidParameter {
                name: "time_zone_minutes".to_string(),
                value: time_zone_minutes.to_string(),
            })?;

        let dst_offset = minutes_to_quarter_hours(dst_minutes)
            .filter(|units| matches!(units, 0 | 2 | 4 | 8))
            .ok_or_else(|| Error::InvalidParameter {
                name: "dst_minutes".to_string(),
                value: dst_minutes.to_string(),
            })?;

        Ok(Self::new(time_zone, dst_offset as u8))
    }

    /// Parse from the 2-byte wire layout.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(Error::malformed(format!(
                "Local Time Information must be {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        let mut buf = data;
        Ok(Self {
            time_zone: buf.get_i8(),
            dst_offset: buf.get_u8(),
        })
    }

    /// Encode to the 2-byte wire layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_i8(self.time_zone);
        buf.put_u8(self.dst_offset);
        out
    }

    /// Offset from UTC in minutes, excluding DST.
    pub fn time_zone_minutes(&self) -> Option<i32> {
        (self.time_zone != Self::TIME_ZONE_UNKNOWN)
            .then(|| quarter_hours_to_minutes(self.time_zone as i16))
    }

    /// Daylight saving offset in minutes.
    pub fn dst_minutes(&self) -> Option<i32> {
        (self.dst_offset != Self::DST_OFFSET_UNKNOWN)
            .then(|| quarter_hours_to_minutes(self.dst_offset as i16))
    }

    /// Total offset from UTC (time zone plus DST) as a chrono offset.
    ///
    /// Returns `None` if either component is unknown.
    pub fn to_fixed_offset(&self) -> Option<FixedOffset> {
        let minutes = self.time_zone_minutes()? + self.dst_minutes()?;
        FixedOffset::east_opt(minutes * 60)
    }
}
