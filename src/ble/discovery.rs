//! Results of GATT service discovery.
//!
//! Discovery itself is performed by the transport layer; the client only
//! consumes the handles it produced.

use uuid::Uuid;

/// A descriptor found under a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDescriptor {
    /// Descriptor type.
    pub uuid: Uuid,
    /// Attribute handle of the descriptor.
    pub handle: u16,
}

/// A characteristic found in a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    /// Characteristic type.
    pub uuid: Uuid,
    /// Attribute handle of the characteristic value.
    pub value_handle: u16,
    /// Descriptors following the value.
    pub descriptors: Vec<DiscoveredDescriptor>,
}

impl DiscoveredCharacteristic {
    /// Create a characteristic with no descriptors.
    pub fn new(uuid: Uuid, value_handle: u16) -> Self {
        Self {
            uuid,
            value_handle,
            descriptors: Vec::new(),
        }
    }

    /// Add a descriptor.
    pub fn with_descriptor(mut self, uuid: Uuid, handle: u16) -> Self {
        self.descriptors.push(DiscoveredDescriptor { uuid, handle });
        self
    }

    /// Find a descriptor by type.
    pub fn descriptor(&self, uuid: &Uuid) -> Option<&DiscoveredDescriptor> {
        self.descriptors.iter().find(|d| d.uuid == *uuid)
    }
}

/// A primary service and the attributes discovered inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    /// Service type.
    pub uuid: Uuid,
    /// Characteristics in handle order.
    pub characteristics: Vec<DiscoveredCharacteristic>,
}

impl DiscoveredService {
    /// Create a service with no characteristics.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    /// Add a characteristic.
    pub fn with_characteristic(mut self, characteristic: DiscoveredCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Find a characteristic by type.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&DiscoveredCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}
