//! Data structures for Current Time Service values.
//!
//! This module contains the decoded values of the Current Time and
//! Local Time Information characteristics.

pub mod current_time;
pub mod local_time;

pub use current_time::{AdjustReason, CurrentTime, DayOfWeek, ExactTime256};
pub use local_time::LocalTime;
