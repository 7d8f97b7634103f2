//! [`GattTransport`] over a btleplug peripheral.
//!
//! btleplug addresses attributes by UUID and hides ATT handles, so this
//! transport numbers the discovered attributes itself, in discovery order and
//! following the ATT layout (service, then declaration, value and descriptors
//! for each characteristic). Requests are spawned onto the tokio runtime the
//! transport was created on and their continuations run on its worker threads.

use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, Service, WriteType};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::ble::discovery::{DiscoveredCharacteristic, DiscoveredService};
use crate::ble::transport::{
    GattTransport, NotificationHandler, ReadContinuation, WriteContinuation,
};
use crate::ble::uuids::*;
use crate::error::{Error, Result, TransportError};
use crate::protocol::CccdValue;

/// ATT error: the handle does not exist.
const ATT_INVALID_HANDLE: u8 = 0x01;
/// ATT error: the request is not supported for the attribute.
const ATT_REQUEST_NOT_SUPPORTED: u8 = 0x06;
/// ATT error: the value length is invalid.
const ATT_INVALID_ATTRIBUTE_VALUE_LENGTH: u8 = 0x0D;

/// Attribute a local handle refers to.
#[derive(Debug, Clone)]
enum Attribute {
    Value(Characteristic),
    Cccd(Characteristic),
}

/// Local handle assignment for a set of discovered services.
#[derive(Debug, Default)]
struct AttributeTable {
    services: Vec<DiscoveredService>,
    attributes: HashMap<u16, Attribute>,
}

impl AttributeTable {
    fn build(services: &BTreeSet<Service>) -> Self {
        let mut table = Self::default();
        let mut next: u16 = 1;
        let mut take = || {
            let handle = next;
            next = next.saturating_add(1);
            handle
        };

        for service in services {
            let _declaration = take();
            let mut discovered = DiscoveredService::new(service.uuid);

            for characteristic in &service.characteristics {
                let _declaration = take();
                let value_handle = take();
                table
                    .attributes
                    .insert(value_handle, Attribute::Value(characteristic.clone()));

                let mut entry = DiscoveredCharacteristic::new(characteristic.uuid, value_handle);

                let mut has_cccd = false;
                for descriptor in &characteristic.descriptors {
                    let handle = take();
                    if descriptor.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION_UUID {
                        has_cccd = true;
                        table
                            .attributes
                            .insert(handle, Attribute::Cccd(characteristic.clone()));
                    }
                    entry = entry.with_descriptor(descriptor.uuid, handle);
                }

                // Some backends do not report the CCCD even though the
                // characteristic can notify.
                let notifies = characteristic
                    .properties
                    .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE);
                if notifies && !has_cccd {
                    let handle = take();
                    table
                        .attributes
                        .insert(handle, Attribute::Cccd(characteristic.clone()));
                    entry = entry.with_descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION_UUID, handle);
                }

                trace!(
                    "Characteristic {} in service {} at handle {:#06x}",
                    uuid_label(&characteristic.uuid),
                    uuid_label(&service.uuid),
                    value_handle
                );

                discovered = discovered.with_characteristic(entry);
            }

            table.services.push(discovered);
        }

        table
    }

    fn service(&self, uuid: &Uuid) -> Option<&DiscoveredService> {
        self.services.iter().find(|s| s.uuid == *uuid)
    }

    fn value_characteristic(&self, handle: u16) -> Option<&Characteristic> {
        match self.attributes.get(&handle) {
            Some(Attribute::Value(c)) => Some(c),
            _ => None,
        }
    }
}

/// Short form for SIG-assigned UUIDs in log output.
fn uuid_label(uuid: &Uuid) -> String {
    match short_uuid(uuid) {
        Some(short) => format!("{:#06x}", short),
        None => uuid.to_string(),
    }
}

fn bluetooth_error(e: btleplug::Error) -> TransportError {
    TransportError::Bluetooth(e.to_string())
}

/// GATT transport backed by a connected btleplug peripheral.
pub struct BtleplugTransport {
    peripheral: Peripheral,
    runtime: Handle,
    table: RwLock<AttributeTable>,
    /// Notification handlers by characteristic UUID.
    handlers: Arc<RwLock<HashMap<Uuid, NotificationHandler>>>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugTransport {
    /// Create a transport for a connected peripheral whose services have been discovered.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(peripheral: Peripheral) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("No tokio runtime: {}", e)))?;

        let table = AttributeTable::build(&peripheral.services());
        debug!(
            "Numbered {} attributes in {} services",
            table.attributes.len(),
            table.services.len()
        );

        let transport = Arc::new(Self {
            peripheral,
            runtime,
            table: RwLock::new(table),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            listener_handle: Mutex::new(None),
        });

        transport.start_notifications();

        Ok(transport)
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Get the discovered services with their local handles.
    pub fn services(&self) -> Vec<DiscoveredService> {
        self.table.read().services.clone()
    }

    /// Get the discovered Current Time Service.
    pub fn cts_service(&self) -> Result<DiscoveredService> {
        self.table
            .read()
            .service(&CURRENT_TIME_SERVICE_UUID)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: CURRENT_TIME_SERVICE_UUID.to_string(),
            })
    }

    fn start_notifications(&self) {
        let peripheral = self.peripheral.clone();
        let handlers = self.handlers.clone();

        let handle = self.runtime.spawn(async move {
            debug!("Notification listener task starting");

            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification received from {}: {:02X?}",
                    notification.uuid,
                    notification.value
                );

                let handler = handlers.read().get(&notification.uuid).cloned();
                match handler {
                    Some(handler) => handler(Bytes::from(notification.value)),
                    None => trace!("No handler for {}", notification.uuid),
                }
            }

            debug!("Notification listener stopped");
        });

        *self.listener_handle.lock() = Some(handle);
    }
}

impl GattTransport for BtleplugTransport {
    fn submit_read(
        &self,
        handle: u16,
        continuation: ReadContinuation,
    ) -> std::result::Result<(), TransportError> {
        let characteristic = match self.table.read().attributes.get(&handle) {
            Some(Attribute::Value(c)) => c.clone(),
            Some(Attribute::Cccd(_)) => return Err(TransportError::Att(ATT_REQUEST_NOT_SUPPORTED)),
            None => return Err(TransportError::Att(ATT_INVALID_HANDLE)),
        };

        let peripheral = self.peripheral.clone();
        self.runtime.spawn(async move {
            let result = peripheral
                .read(&characteristic)
                .await
                .map(Bytes::from)
                .map_err(bluetooth_error);

            trace!("Read {} complete: {:?}", characteristic.uuid, result);
            continuation(result);
        });

        Ok(())
    }

    fn submit_write(
        &self,
        handle: u16,
        payload: Bytes,
        continuation: WriteContinuation,
    ) -> std::result::Result<(), TransportError> {
        let attribute = self
            .table
            .read()
            .attributes
            .get(&handle)
            .cloned()
            .ok_or(TransportError::Att(ATT_INVALID_HANDLE))?;

        let peripheral = self.peripheral.clone();

        match attribute {
            Attribute::Value(characteristic) => {
                self.runtime.spawn(async move {
                    let result = peripheral
                        .write(&characteristic, &payload, WriteType::WithResponse)
                        .await
                        .map_err(bluetooth_error);
                    continuation(result);
                });
            }
            Attribute::Cccd(characteristic) => {
                // btleplug owns the CCCD; map the requested bits onto subscribe.
                let value = CccdValue::from_bytes(&payload)
                    .map_err(|_| TransportError::Att(ATT_INVALID_ATTRIBUTE_VALUE_LENGTH))?;

                self.runtime.spawn(async move {
                    let result = if value.notifications_enabled() || value.indications_enabled() {
                        peripheral.subscribe(&characteristic).await
                    } else {
                        peripheral.unsubscribe(&characteristic).await
                    };

                    if let Err(e) = &result {
                        warn!("CCCD write for {} failed: {}", characteristic.uuid, e);
                    }
                    continuation(result.map_err(bluetooth_error));
                });
            }
        }

        Ok(())
    }

    fn register_notifications(&self, value_handle: u16, handler: NotificationHandler) {
        let uuid = match self.table.read().value_characteristic(value_handle) {
            Some(c) => c.uuid,
            None => {
                warn!("Ignoring handler for unknown handle {:#06x}", value_handle);
                return;
            }
        };

        debug!("Routing notifications from {} to handler", uuid);
        self.handlers.write().insert(uuid, handler);
    }

    fn unregister_notifications(&self, value_handle: u16) {
        let uuid = self
            .table
            .read()
            .value_characteristic(value_handle)
            .map(|c| c.uuid);

        if let Some(uuid) = uuid {
            self.handlers.write().remove(&uuid);
        }
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
    }
}
