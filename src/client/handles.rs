//! Per-connection attribute handle table.

use tracing::debug;

use crate::ble::discovery::DiscoveredService;
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// Attribute handles resolved from discovery.
///
/// Set once when the client is bound and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleTable {
    /// Current Time characteristic value handle.
    pub current_time: Option<u16>,
    /// Local Time Information characteristic value handle.
    pub local_time: Option<u16>,
    /// CCCD handle of the Current Time characteristic.
    pub current_time_ccc: Option<u16>,
}

impl HandleTable {
    /// Resolve handles from a discovered Current Time Service.
    ///
    /// The Current Time characteristic is mandatory. A missing Local Time
    /// Information characteristic or CCCD is recorded as unresolved.
    pub fn from_discovery(service: &DiscoveredService) -> Result<Self> {
        if !is_cts_service(&service.uuid) {
            return Err(Error::ServiceNotFound {
                uuid: CURRENT_TIME_SERVICE_UUID.to_string(),
            });
        }

        let current_time = service
            .characteristic(&CURRENT_TIME_UUID)
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: CURRENT_TIME_UUID.to_string(),
            })?;

        let current_time_ccc = current_time
            .descriptor(&CLIENT_CHARACTERISTIC_CONFIGURATION_UUID)
            .map(|d| d.handle);

        let local_time = service
            .characteristic(&LOCAL_TIME_INFORMATION_UUID)
            .map(|c| c.value_handle);

        let table = Self {
            current_time: Some(current_time.value_handle),
            local_time,
            current_time_ccc,
        };

        debug!("Resolved CTS handles: {:?}", table);

        Ok(table)
    }
}
