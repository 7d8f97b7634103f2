// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # cts-client-ble
//!
//! A Bluetooth Low Energy client for the Current Time Service (CTS), reading
//! a peer's Current Time and Local Time Information characteristics and
//! receiving Current Time notifications.
//!
//! The core is a small state machine, [`CtsClient`], that serializes requests
//! against a single outstanding operation and reports every outcome through
//! callbacks. It talks to the radio through the [`GattTransport`] trait; a
//! btleplug implementation is provided in [`ble::btleplug_transport`].
//!
//! ## Features
//!
//! - **Single-flight requests**: at most one read or subscription change in flight
//! - **Exactly-once callbacks**: every accepted request completes once, even on disconnect
//! - **Notifications**: gated on a confirmed CCCD write
//! - **Async wrappers**: `*_async` variants built on the callback API
//! - **chrono conversions**: Current Time to `NaiveDateTime`, Local Time to `FixedOffset`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use btleplug::api::{Central, Manager as _, ScanFilter};
//! use btleplug::platform::Manager;
//! use cts_client_ble::{ConnectionManager, CtsClient, Error, Result, CURRENT_TIME_SERVICE_UUID};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = Manager::new().await?;
//!     let adapter = manager
//!         .adapters()
//!         .await?
//!         .into_iter()
//!         .next()
//!         .ok_or(Error::BluetoothUnavailable)?;
//!
//!     adapter
//!         .start_scan(ScanFilter { services: vec![CURRENT_TIME_SERVICE_UUID] })
//!         .await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     let peripheral = adapter
//!         .peripherals()
//!         .await?
//!         .into_iter()
//!         .next()
//!         .ok_or(Error::ServiceNotFound { uuid: CURRENT_TIME_SERVICE_UUID.to_string() })?;
//!
//!     let client = CtsClient::new();
//!     let connection = ConnectionManager::new(adapter, peripheral);
//!     connection.connect(&client).await?;
//!
//!     let now = client.read_current_time_async().await?;
//!     println!("Peer time: {}", now);
//!
//!     connection.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod protocol;
pub mod utils;

// Re-exports for convenience
pub use client::{CtsClient, HandleTable, OperationState, ReadTarget, SubscriptionChange};
pub use config::ClientConfig;
pub use error::{Error, Result, TransportError};
pub use utils::{minutes_to_quarter_hours, quarter_hours_to_minutes};

// Re-export commonly used types from submodules
pub use ble::connection::{ConnectionManager, ConnectionState};
pub use ble::discovery::{DiscoveredCharacteristic, DiscoveredDescriptor, DiscoveredService};
pub use ble::transport::GattTransport;
pub use ble::uuids::{
    CLIENT_CHARACTERISTIC_CONFIGURATION_UUID, CURRENT_TIME_SERVICE_UUID, CURRENT_TIME_UUID,
    LOCAL_TIME_INFORMATION_UUID,
};
pub use data::{AdjustReason, CurrentTime, DayOfWeek, ExactTime256, LocalTime};
