//! Utility functions for the cts-client-ble crate.

/// Number of minutes in one offset unit used by the Local Time Information characteristic.
pub const MINUTES_PER_OFFSET_UNIT: i32 = 15;

/// Convert an offset expressed in 15-minute units to minutes.
///
/// # Arguments
///
/// * `units` - Offset in 15-minute increments
///
/// # Returns
///
/// Offset in minutes
///
/// # Example
///
/// ```
/// use cts_client_ble::quarter_hours_to_minutes;
///
/// assert_eq!(quarter_hours_to_minutes(-20), -300);
/// ```
#[inline]
pub fn quarter_hours_to_minutes(units: i16) -> i32 {
    units as i32 * MINUTES_PER_OFFSET_UNIT
}

/// Convert minutes to 15-minute offset units.
///
/// Returns `None` if `minutes` is not a whole number of units or does not
/// fit the signed byte used on the wire.
///
/// # Example
///
/// ```
/// use cts_client_ble::minutes_to_quarter_hours;
///
/// assert_eq!(minutes_to_quarter_hours(330), Some(22));
/// assert_eq!(minutes_to_quarter_hours(10), None);
/// ```
#[inline]
pub fn minutes_to_quarter_hours(minutes: i32) -> Option<i8> {
    if minutes % MINUTES_PER_OFFSET_UNIT != 0 {
        return None;
    }
    i8::try_from(minutes / MINUTES_PER_OFFSET_UNIT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_hours_to_minutes() {
        assert_eq!(quarter_hours_to_minutes(0), 0);
        assert_eq!(quarter_hours_to_minutes(4), 60);
        assert_eq!(quarter_hours_to_minutes(-32), -480);
    }

    #[test]
    fn test_minutes_to_quarter_hours() {
        assert_eq!(minutes_to_quarter_hours(60), Some(4));
        assert_eq!(minutes_to_quarter_hours(-480), Some(-32));
        assert_eq!(minutes_to_quarter_hours(7), None);
        assert_eq!(minutes_to_quarter_hours(15 * 200), None);
    }

    #[test]
    fn test_offset_roundtrip() {
        for units in [-48i8, -1, 0, 1, 22, 56] {
            let minutes = quarter_hours_to_minutes(units as i16);
            assert_eq!(minutes_to_quarter_hours(minutes), Some(units));
        }
    }
}
