//! Protocol module for GATT descriptor values.
//!
//! Characteristic value codecs live next to their types in [`crate::data`].

pub mod cccd;

pub use cccd::CccdValue;
