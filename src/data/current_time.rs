//! Current Time characteristic data structures.
//!
//! Wire layout (10 bytes, little-endian):
//! - Bytes 0-1: Year
//! - Byte 2: Month (1-12, 0 = unknown)
//! - Byte 3: Day (1-31, 0 = unknown)
//! - Bytes 4-6: Hours, Minutes, Seconds
//! - Byte 7: Day of week (1 = Monday .. 7 = Sunday, 0 = unknown)
//! - Byte 8: Fractions256 (1/256th of a second)
//! - Byte 9: Adjust reason (bits 0-3 meaningful, bits 4-7 reserved)

use bytes::{Buf, BufMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Error, Result};

/// Day of the week as encoded by the Current Time characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DayOfWeek {
    /// Day of week is not known.
    #[default]
    Unknown,
    /// Monday (1).
    Monday,
    /// Tuesday (2).
    Tuesday,
    /// Wednesday (3).
    Wednesday,
    /// Thursday (4).
    Thursday,
    /// Friday (5).
    Friday,
    /// Saturday (6).
    Saturday,
    /// Sunday (7).
    Sunday,
}

impl DayOfWeek {
    /// Create from raw value. Values outside 1-7 map to `Unknown`.
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Monday,
            2 => Self::Tuesday,
            3 => Self::Wednesday,
            4 => Self::Thursday,
            5 => Self::Friday,
            6 => Self::Saturday,
            7 => Self::Sunday,
            _ => Self::Unknown,
        }
    }

    /// Convert to raw value.
    pub fn to_raw(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Monday => 1,
            Self::Tuesday => 2,
            Self::Wednesday => 3,
            Self::Thursday => 4,
            Self::Friday => 5,
            Self::Saturday => 6,
            Self::Sunday => 7,
        }
    }
}

/// Reason the peer's clock was last adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdjustReason {
    /// Time was set manually.
    pub manual_time_update: bool,
    /// Time was synchronized from an external reference.
    pub external_reference_time_update: bool,
    /// Time zone changed.
    pub change_of_time_zone: bool,
    /// Daylight savings changed.
    pub change_of_daylight_savings_time: bool,
}

impl AdjustReason {
    /// Bits of the adjust reason byte that carry meaning.
    pub const MASK: u8 = 0x0F;

    /// Decode from the adjust reason byte, ignoring reserved bits.
    pub fn from_raw(value: u8) -> Self {
        Self {
            manual_time_update: value & 0x01 != 0,
            external_reference_time_update: value & 0x02 != 0,
            change_of_time_zone: value & 0x04 != 0,
            change_of_daylight_savings_time: value & 0x08 != 0,
        }
    }

    /// Encode to the adjust reason byte.
    pub fn to_raw(self) -> u8 {
        (self.manual_time_update as u8)
            | (self.external_reference_time_update as u8) << 1
            | (self.change_of_time_zone as u8) << 2
            | (self.change_of_daylight_savings_time as u8) << 3
    }
}

/// "Exact Time 256" field of the Current Time characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExactTime256 {
    /// Year (1582-9999, 0 = unknown).
    pub year: u16,
    /// Month of the year (1-12, 0 = unknown).
    pub month: u8,
    /// Day of the month (1-31, 0 = unknown).
    pub day: u8,
    /// Hours (0-23).
    pub hours: u8,
    /// Minutes (0-59).
    pub minutes: u8,
    /// Seconds (0-59).
    pub seconds: u8,
    /// Raw day of week (see [`DayOfWeek`]).
    pub day_of_week: u8,
    /// Fractions of a second in 1/256 units.
    pub fractions256: u8,
}

impl ExactTime256 {
    /// Get the day of week.
    pub fn weekday(&self) -> DayOfWeek {
        DayOfWeek::from_raw(self.day_of_week)
    }
}

/// Value of the Current Time characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurrentTime {
    /// Date and time on the peer.
    pub exact_time: ExactTime256,
    /// Why the peer's clock was last changed.
    pub adjust_reason: AdjustReason,
}

impl CurrentTime {
    /// Size of the encoded characteristic value in bytes.
    pub const SIZE: usize = 10;

    /// Parse a Current Time value, rejecting reserved adjust reason bits.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::decode(data, true)
    }

    /// Parse a Current Time value.
    ///
    /// When `reject_reserved_bits` is false, adjust reason bits 4-7 are masked off
    /// instead of failing the decode.
    pub fn decode(data: &[u8], reject_reserved_bits: bool) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(Error::malformed(format!(
                "Current Time must be {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        let mut buf = data;
        let exact_time = ExactTime256 {
            year: buf.get_u16_le(),
            month: buf.get_u8(),
            day: buf.get_u8(),
            hours: buf.get_u8(),
            minutes: buf.get_u8(),
            seconds: buf.get_u8(),
            day_of_week: buf.get_u8(),
            fractions256: buf.get_u8(),
        };

        let reason = buf.get_u8();
        if reject_reserved_bits && reason & !AdjustReason::MASK != 0 {
            return Err(Error::malformed(format!(
                "reserved adjust reason bits set: {:#04x}",
                reason
            )));
        }

        Ok(Self {
            exact_time,
            adjust_reason: AdjustReason::from_raw(reason),
        })
    }

    /// Encode to the 10-byte wire layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        let t = &self.exact_time;

        buf.put_u16_le(t.year);
        buf.put_u8(t.month);
        buf.put_u8(t.day);
        buf.put_u8(t.hours);
        buf.put_u8(t.minutes);
        buf.put_u8(t.seconds);
        buf.put_u8(t.day_of_week);
        buf.put_u8(t.fractions256);
        buf.put_u8(self.adjust_reason.to_raw());

        out
    }

    /// Convert to a calendar date and time.
    ///
    /// Returns `None` when any of the date or time fields is unknown or out of range.
    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        let t = &self.exact_time;
        let millis = t.fractions256 as u32 * 1000 / 256;

        NaiveDate::from_ymd_opt(t.year as i32, t.month as u32, t.day as u32)?.and_hms_milli_opt(
            t.hours as u32,
            t.minutes as u32,
            t.seconds as u32,
            millis,
        )
    }

    /// Build a Current Time value from a calendar date and time.
    ///
    /// Returns `None` if the year does not fit the 16-bit field.
    pub fn from_naive_datetime(datetime: &NaiveDateTime, adjust_reason: AdjustReason) -> Option<Self> {
        let year = u16::try_from(datetime.year()).ok()?;
        let fractions256 = (datetime.nanosecond().min(999_999_999) as u64 * 256 / 1_000_000_000) as u8;

        Some(Self {
            exact_time: ExactTime256 {
                year,
                month: datetime.month() as u8,
                day: datetime.day() as u8,
                hours: datetime.hour() as u8,
                minutes: datetime.minute() as u8,
                seconds: datetime.second() as u8,
                day_of_week: datetime.weekday().number_from_monday() as u8,
                fractions256,
            },
            adjust_reason,
        })
    }
}

impl std::fmt::Display for CurrentTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = &self.exact_time;
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            t.year,
            t.month,
            t.day,
            t.hours,
            t.minutes,
            t.seconds,
            t.fractions256 as u32 * 1000 / 256
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample() -> CurrentTime {
        CurrentTime {
            exact_time: ExactTime256 {
                year: 2024,
                month: 3,
                day: 15,
                hours: 10,
                minutes: 30,
                seconds: 0,
                day_of_week: 5,
                fractions256: 128,
            },
            adjust_reason: AdjustReason {
                manual_time_update: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_current_time_wire_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes, [0xE8, 0x07, 3, 15, 10, 30, 0, 5, 128, 0x01]);
    }

    #[test]
    fn test_current_time_roundtrip() {
        let original = sample();
        let decoded = CurrentTime::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.exact_time.weekday(), DayOfWeek::Friday);
    }

    #[test]
    fn test_current_time_wrong_length() {
        assert!(matches!(
            CurrentTime::from_bytes(&[0u8; 9]),
            Err(Error::MalformedResponse { .. })
        ));
        assert!(matches!(
            CurrentTime::from_bytes(&[0u8; 11]),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_current_time_reserved_bits() {
        let mut bytes = sample().to_bytes();
        bytes[9] = 0x31;

        assert!(matches!(
            CurrentTime::from_bytes(&bytes),
            Err(Error::MalformedResponse { .. })
        ));

        let lenient = CurrentTime::decode(&bytes, false).unwrap();
        assert_eq!(lenient.adjust_reason, sample().adjust_reason);
    }

    #[test]
    fn test_adjust_reason_bits() {
        let reason = AdjustReason::from_raw(0x0A);
        assert!(!reason.manual_time_update);
        assert!(reason.external_reference_time_update);
        assert!(!reason.change_of_time_zone);
        assert!(reason.change_of_daylight_savings_time);
        assert_eq!(reason.to_raw(), 0x0A);
    }

    #[test]
    fn test_to_naive_datetime() {
        let datetime = sample().to_naive_datetime().unwrap();
        assert_eq!(datetime.to_string(), "2024-03-15 10:30:00.500");
        assert_eq!(
            datetime.weekday().number_from_monday(),
            sample().exact_time.day_of_week as u32
        );
    }

    #[test]
    fn test_unknown_date_has_no_datetime() {
        let unknown = CurrentTime::default();
        assert!(unknown.to_naive_datetime().is_none());
    }

    #[test]
    fn test_from_naive_datetime() {
        let datetime = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_milli_opt(10, 30, 0, 500)
            .unwrap();
        let manual = AdjustReason {
            manual_time_update: true,
            ..Default::default()
        };
        assert_eq!(CurrentTime::from_naive_datetime(&datetime, manual), Some(sample()));
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "2024-03-15 10:30:00.500");
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..16)) {
            let _ = CurrentTime::from_bytes(&data);
        }

        #[test]
        fn prop_valid_reason_roundtrips(bytes in any::<[u8; 9]>(), reason in 0u8..16) {
            let mut payload = bytes.to_vec();
            payload.push(reason);
            let decoded = CurrentTime::from_bytes(&payload).unwrap();
            prop_assert_eq!(decoded.to_bytes().to_vec(), payload);
        }
    }
}
