//! GATT attribute model
//!
//! This module defines the service/characteristic/descriptor tree in two
//! layers: transport-facing definition structs carrying UUIDs as strings
//! (`ServiceDef` and friends), and the canonical parsed model the engine and
//! platform bindings operate on (`Service` and friends). Parsing happens once
//! at the command boundary; everything downstream works with `uuid::Uuid`,
//! which makes lookups case-insensitive by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GattwayError, Result};

// ----------------------------------------------------------------------------
// Well-known UUIDs
// ----------------------------------------------------------------------------

/// Client Characteristic Configuration descriptor UUID
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Trailing ten bytes of the Bluetooth base UUID, used to expand 16-bit and
/// 32-bit short forms into full 128-bit identifiers
const BLUETOOTH_BASE_NODE: [u8; 8] = [0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb];

/// Parse an attribute UUID from its transport string form
///
/// Accepts full 128-bit forms in any case, with or without hyphens, plus the
/// 4- and 8-hex-digit short forms used for SIG-assigned numbers ("2902",
/// "180F"), which are expanded onto the Bluetooth base UUID.
pub fn parse_ble_uuid(text: &str) -> Result<Uuid> {
    let trimmed = text.trim();
    let is_short =
        matches!(trimmed.len(), 4 | 8) && trimmed.chars().all(|c| c.is_ascii_hexdigit());
    if is_short {
        let short = u32::from_str_radix(trimmed, 16)
            .map_err(|_| GattwayError::invalid_identifier(text))?;
        return Ok(Uuid::from_fields(short, 0x0000, 0x1000, &BLUETOOTH_BASE_NODE));
    }
    Uuid::parse_str(trimmed).map_err(|_| GattwayError::invalid_identifier(text))
}

// ----------------------------------------------------------------------------
// Properties and Permissions
// ----------------------------------------------------------------------------

/// GATT characteristic property flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacteristicProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    AuthenticatedSignedWrites,
    ExtendedProperties,
    NotifyEncryptionRequired,
    IndicateEncryptionRequired,
}

impl CharacteristicProperty {
    /// Whether this property lets centrals subscribe to value updates
    pub fn is_subscribable(&self) -> bool {
        matches!(
            self,
            CharacteristicProperty::Notify
                | CharacteristicProperty::Indicate
                | CharacteristicProperty::NotifyEncryptionRequired
                | CharacteristicProperty::IndicateEncryptionRequired
        )
    }
}

/// GATT attribute permission flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributePermission {
    Readable,
    Writeable,
    ReadEncryptionRequired,
    WriteEncryptionRequired,
}

// ----------------------------------------------------------------------------
// Transport-facing Definitions
// ----------------------------------------------------------------------------

/// Service definition as received from the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    /// Service UUID as a transport string
    pub uuid: String,
    /// Whether this is a primary service
    pub primary: bool,
    /// Characteristics in declaration order
    pub characteristics: Vec<CharacteristicDef>,
}

impl ServiceDef {
    /// Create a primary service definition with no characteristics
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            primary: true,
            characteristics: Vec::new(),
        }
    }

    /// Mark the service as secondary
    pub fn secondary(mut self) -> Self {
        self.primary = false;
        self
    }

    /// Append a characteristic definition
    pub fn with_characteristic(mut self, characteristic: CharacteristicDef) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

/// Characteristic definition as received from the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicDef {
    /// Characteristic UUID as a transport string
    pub uuid: String,
    /// Property flags
    pub properties: Vec<CharacteristicProperty>,
    /// Permission flags
    pub permissions: Vec<AttributePermission>,
    /// Initial cached value
    pub value: Option<Vec<u8>>,
    /// Descriptors in declaration order
    pub descriptors: Vec<DescriptorDef>,
}

impl CharacteristicDef {
    /// Create a characteristic definition with no flags set
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            properties: Vec::new(),
            permissions: Vec::new(),
            value: None,
            descriptors: Vec::new(),
        }
    }

    /// Set the property flags
    pub fn with_properties(mut self, properties: Vec<CharacteristicProperty>) -> Self {
        self.properties = properties;
        self
    }

    /// Set the permission flags
    pub fn with_permissions(mut self, permissions: Vec<AttributePermission>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set the initial cached value
    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }

    /// Append a descriptor definition
    pub fn with_descriptor(mut self, descriptor: DescriptorDef) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}

/// Descriptor definition as received from the host application
///
/// Permissions default to readable and writeable when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorDef {
    /// Descriptor UUID as a transport string
    pub uuid: String,
    /// Permission flags, or None for the readable+writeable default
    pub permissions: Option<Vec<AttributePermission>>,
    /// Initial cached value
    pub value: Option<Vec<u8>>,
}

impl DescriptorDef {
    /// Create a descriptor definition with default permissions
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            permissions: None,
            value: None,
        }
    }

    /// Set explicit permission flags
    pub fn with_permissions(mut self, permissions: Vec<AttributePermission>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Set the initial cached value
    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }
}

// ----------------------------------------------------------------------------
// Canonical Model
// ----------------------------------------------------------------------------

/// Canonical parsed service held by the attribute registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    /// Parse a definition into the canonical model
    ///
    /// Fails with `InvalidIdentifier` on the first malformed UUID. Descriptor
    /// permission defaults are applied here; CCCD synthesis is the registry's
    /// responsibility.
    pub fn from_def(def: ServiceDef) -> Result<Self> {
        let uuid = parse_ble_uuid(&def.uuid)?;
        let mut characteristics = Vec::with_capacity(def.characteristics.len());
        for characteristic in def.characteristics {
            characteristics.push(Characteristic::from_def(characteristic)?);
        }
        Ok(Self {
            uuid,
            primary: def.primary,
            characteristics,
        })
    }

    /// Find a characteristic of this service by UUID
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    /// Find a characteristic of this service by UUID, mutably
    pub fn characteristic_mut(&mut self, uuid: Uuid) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.uuid == uuid)
    }
}

/// Canonical parsed characteristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: Vec<CharacteristicProperty>,
    pub permissions: Vec<AttributePermission>,
    /// Cached value, replaced by host-issued updates
    pub value: Option<Vec<u8>>,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    /// Parse a definition into the canonical model
    pub fn from_def(def: CharacteristicDef) -> Result<Self> {
        let uuid = parse_ble_uuid(&def.uuid)?;
        let mut descriptors = Vec::with_capacity(def.descriptors.len());
        for descriptor in def.descriptors {
            descriptors.push(Descriptor::from_def(descriptor)?);
        }
        Ok(Self {
            uuid,
            properties: def.properties,
            permissions: def.permissions,
            value: def.value,
            descriptors,
        })
    }

    /// Whether centrals may subscribe to this characteristic
    pub fn is_subscribable(&self) -> bool {
        self.properties.iter().any(|p| p.is_subscribable())
    }

    /// Whether a CCCD is already declared
    pub fn has_cccd(&self) -> bool {
        self.descriptors.iter().any(|d| d.uuid == CCCD_UUID)
    }

    /// Find a descriptor by UUID
    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }

    /// Find a descriptor by UUID, mutably
    pub fn descriptor_mut(&mut self, uuid: Uuid) -> Option<&mut Descriptor> {
        self.descriptors.iter_mut().find(|d| d.uuid == uuid)
    }
}

/// Canonical parsed descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub permissions: Vec<AttributePermission>,
    pub value: Option<Vec<u8>>,
}

impl Descriptor {
    /// Parse a definition into the canonical model, applying the
    /// readable+writeable permission default
    pub fn from_def(def: DescriptorDef) -> Result<Self> {
        let uuid = parse_ble_uuid(&def.uuid)?;
        let permissions = def.permissions.unwrap_or_else(|| {
            vec![
                AttributePermission::Readable,
                AttributePermission::Writeable,
            ]
        });
        Ok(Self {
            uuid,
            permissions,
            value: def.value,
        })
    }

    /// Synthesized Client Characteristic Configuration descriptor
    ///
    /// Initial value is the two-byte disabled configuration.
    pub fn client_characteristic_configuration() -> Self {
        Self {
            uuid: CCCD_UUID,
            permissions: vec![
                AttributePermission::Readable,
                AttributePermission::Writeable,
            ],
            value: Some(vec![0x00, 0x00]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uuid_case_insensitive() {
        let lower = parse_ble_uuid("0000180f-0000-1000-8000-00805f9b34fb").unwrap();
        let upper = parse_ble_uuid("0000180F-0000-1000-8000-00805F9B34FB").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), "0000180f-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn test_parse_short_uuid_expansion() {
        let short = parse_ble_uuid("2902").unwrap();
        assert_eq!(short, CCCD_UUID);

        let wide = parse_ble_uuid("0000180F").unwrap();
        assert_eq!(
            wide.to_string(),
            "0000180f-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_parse_malformed_uuid() {
        let err = parse_ble_uuid("not-a-uuid").unwrap_err();
        assert!(matches!(err, GattwayError::InvalidIdentifier { .. }));

        let err = parse_ble_uuid("29z2").unwrap_err();
        assert!(matches!(err, GattwayError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_cccd_constant() {
        assert_eq!(
            CCCD_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_descriptor_permission_default() {
        let descriptor = Descriptor::from_def(DescriptorDef::new("2901")).unwrap();
        assert_eq!(
            descriptor.permissions,
            vec![
                AttributePermission::Readable,
                AttributePermission::Writeable
            ]
        );

        let explicit = Descriptor::from_def(
            DescriptorDef::new("2901")
                .with_permissions(vec![AttributePermission::Readable]),
        )
        .unwrap();
        assert_eq!(explicit.permissions, vec![AttributePermission::Readable]);
    }

    #[test]
    fn test_service_from_def() {
        let def = ServiceDef::new("180F").with_characteristic(
            CharacteristicDef::new("2A19")
                .with_properties(vec![
                    CharacteristicProperty::Read,
                    CharacteristicProperty::Notify,
                ])
                .with_value(vec![0x64]),
        );

        let service = Service::from_def(def).unwrap();
        assert!(service.primary);
        assert_eq!(service.characteristics.len(), 1);

        let characteristic = &service.characteristics[0];
        assert!(characteristic.is_subscribable());
        assert!(!characteristic.has_cccd());
        assert_eq!(characteristic.value, Some(vec![0x64]));
    }

    #[test]
    fn test_service_from_def_rejects_bad_characteristic_uuid() {
        let def = ServiceDef::new("180F")
            .with_characteristic(CharacteristicDef::new("garbage"));
        assert!(matches!(
            Service::from_def(def),
            Err(GattwayError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_encrypted_notify_is_subscribable() {
        let characteristic = Characteristic::from_def(
            CharacteristicDef::new("2A19").with_properties(vec![
                CharacteristicProperty::IndicateEncryptionRequired,
            ]),
        )
        .unwrap();
        assert!(characteristic.is_subscribable());
    }
}
