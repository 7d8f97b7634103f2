//! BLE communication module.
//!
//! The client core only depends on [`transport`] and [`discovery`]. The
//! btleplug adapter and connection manager provide a ready-made transport
//! for real hardware.

pub mod btleplug_transport;
pub mod connection;
pub mod discovery;
pub mod transport;
pub mod uuids;

pub use btleplug_transport::BtleplugTransport;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use discovery::{DiscoveredCharacteristic, DiscoveredDescriptor, DiscoveredService};
pub use transport::GattTransport;
pub use uuids::*;
