//! Attribute registry: the peripheral's GATT database.
//!
//! Holds every hosted service in registration order together with lookup
//! indices for services and characteristics. Service definitions arrive as
//! string-keyed [`ServiceDef`] values from the host, are parsed into canonical
//! [`Service`] entries exactly once, and are enriched with a synthesized CCCD
//! on every subscribable characteristic that does not already declare one.

use std::collections::{HashMap, HashSet};

use gattway_core::{Characteristic, Descriptor, GattwayError, Result, Service, ServiceDef};
use tracing::debug;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Attribute Registry
// ----------------------------------------------------------------------------

/// Ordered store of hosted services with characteristic lookup indices.
pub struct AttributeRegistry {
    /// Service UUIDs in registration order.
    order: Vec<Uuid>,
    /// Canonical service entries keyed by service UUID.
    services: HashMap<Uuid, Service>,
    /// Characteristic UUID to owning service UUID.
    characteristic_index: HashMap<Uuid, Uuid>,
    /// Services dispatched to the platform but not yet confirmed.
    pending_adds: HashSet<Uuid>,
    /// Registry statistics.
    stats: RegistryStats,
}

impl AttributeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            services: HashMap::new(),
            characteristic_index: HashMap::new(),
            pending_adds: HashSet::new(),
            stats: RegistryStats::default(),
        }
    }

    // ------------------------------------------------------------------------
    // Service registration
    // ------------------------------------------------------------------------

    /// Parse and register a service definition, returning the canonical entry.
    ///
    /// Subscribable characteristics without an explicit CCCD get one
    /// synthesized. Registering a UUID that already exists replaces the old
    /// entry and moves the service to the end of the registration order.
    pub fn add_service(&mut self, definition: ServiceDef) -> Result<Service> {
        let mut service = Service::from_def(definition)?;
        self.synthesize_cccds(&mut service);

        if self.services.contains_key(&service.uuid) {
            debug!("Replacing existing service {}", service.uuid);
            self.unregister(&service.uuid);
            self.stats.services_replaced += 1;
        }

        for characteristic in &service.characteristics {
            self.characteristic_index
                .insert(characteristic.uuid, service.uuid);
        }
        self.order.push(service.uuid);
        self.services.insert(service.uuid, service.clone());
        self.stats.services_added += 1;

        debug!(
            "Registered service {} with {} characteristic(s)",
            service.uuid,
            service.characteristics.len()
        );
        Ok(service)
    }

    /// Remove a service by UUID, returning the entry if it existed.
    pub fn remove_service(&mut self, uuid: &Uuid) -> Option<Service> {
        let removed = self.unregister(uuid);
        if removed.is_some() {
            self.stats.services_removed += 1;
            debug!("Removed service {}", uuid);
        }
        removed
    }

    /// Drop every service and pending marker, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.services.len();
        self.order.clear();
        self.services.clear();
        self.characteristic_index.clear();
        self.pending_adds.clear();
        self.stats.services_removed += count as u64;
        count
    }

    fn unregister(&mut self, uuid: &Uuid) -> Option<Service> {
        let service = self.services.remove(uuid)?;
        self.order.retain(|u| u != uuid);
        self.characteristic_index.retain(|_, owner| owner != uuid);
        self.pending_adds.remove(uuid);
        Some(service)
    }

    fn synthesize_cccds(&mut self, service: &mut Service) {
        for characteristic in &mut service.characteristics {
            if characteristic.is_subscribable() && !characteristic.has_cccd() {
                characteristic
                    .descriptors
                    .push(Descriptor::client_characteristic_configuration());
                self.stats.cccds_synthesized += 1;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Pending platform confirmations
    // ------------------------------------------------------------------------

    /// Mark a service as dispatched to the platform and awaiting confirmation.
    pub fn mark_pending_add(&mut self, uuid: Uuid) {
        self.pending_adds.insert(uuid);
    }

    /// Clear a pending marker, returning whether the service was pending.
    pub fn confirm_add(&mut self, uuid: &Uuid) -> bool {
        self.pending_adds.remove(uuid)
    }

    /// Check whether any dispatched service is still unconfirmed.
    pub fn has_pending_adds(&self) -> bool {
        !self.pending_adds.is_empty()
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Look up a service by UUID.
    pub fn find_service(&self, uuid: &Uuid) -> Option<&Service> {
        self.services.get(uuid)
    }

    /// Look up a characteristic across all services.
    pub fn find_characteristic(&self, uuid: &Uuid) -> Option<&Characteristic> {
        let owner = self.characteristic_index.get(uuid)?;
        self.services.get(owner)?.characteristic(*uuid)
    }

    /// UUID of the service owning a characteristic.
    pub fn owning_service(&self, characteristic: &Uuid) -> Option<Uuid> {
        self.characteristic_index.get(characteristic).copied()
    }

    /// Look up a descriptor on a specific characteristic.
    pub fn find_descriptor(&self, characteristic: &Uuid, descriptor: &Uuid) -> Option<&Descriptor> {
        self.find_characteristic(characteristic)?
            .descriptor(*descriptor)
    }

    /// Hosted service UUIDs in registration order.
    pub fn service_uuids(&self) -> Vec<String> {
        self.order.iter().map(|u| u.to_string()).collect()
    }

    /// Number of hosted services.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    // ------------------------------------------------------------------------
    // Cached values
    // ------------------------------------------------------------------------

    /// Replace the cached value of a characteristic.
    pub fn update_cached_value(&mut self, characteristic: &Uuid, value: &[u8]) -> Result<()> {
        let owner = self
            .characteristic_index
            .get(characteristic)
            .copied()
            .ok_or_else(|| GattwayError::not_found(characteristic.to_string()))?;
        let entry = self
            .services
            .get_mut(&owner)
            .and_then(|s| s.characteristic_mut(*characteristic))
            .ok_or_else(|| GattwayError::not_found(characteristic.to_string()))?;
        entry.value = Some(value.to_vec());
        Ok(())
    }

    /// Cached value of a characteristic, if any.
    pub fn cached_value(&self, characteristic: &Uuid) -> Option<Vec<u8>> {
        self.find_characteristic(characteristic)?.value.clone()
    }

    /// Replace the cached value of a descriptor.
    pub fn update_descriptor_value(
        &mut self,
        characteristic: &Uuid,
        descriptor: &Uuid,
        value: &[u8],
    ) -> Result<()> {
        let owner = self
            .characteristic_index
            .get(characteristic)
            .copied()
            .ok_or_else(|| GattwayError::not_found(characteristic.to_string()))?;
        let entry = self
            .services
            .get_mut(&owner)
            .and_then(|s| s.characteristic_mut(*characteristic))
            .and_then(|c| c.descriptor_mut(*descriptor))
            .ok_or_else(|| GattwayError::not_found(descriptor.to_string()))?;
        entry.value = Some(value.to_vec());
        Ok(())
    }

    /// Registry statistics.
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters describing registry activity.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Services registered (including replacements).
    pub services_added: u64,
    /// Registrations that displaced an existing entry.
    pub services_replaced: u64,
    /// Services removed (individually or via clear).
    pub services_removed: u64,
    /// CCCDs synthesized onto subscribable characteristics.
    pub cccds_synthesized: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gattway_core::{CharacteristicDef, CharacteristicProperty, DescriptorDef, CCCD_UUID};

    const SERVICE_UUID: &str = "0000180d-0000-1000-8000-00805f9b34fb";
    const CHAR_UUID: &str = "00002a37-0000-1000-8000-00805f9b34fb";

    fn create_test_service() -> ServiceDef {
        ServiceDef::new(SERVICE_UUID).with_characteristic(
            CharacteristicDef::new(CHAR_UUID)
                .with_properties(vec![
                    CharacteristicProperty::Read,
                    CharacteristicProperty::Notify,
                ])
                .with_value(vec![0x01]),
        )
    }

    #[test]
    fn test_add_and_find_service() {
        let mut registry = AttributeRegistry::new();
        let service = registry.add_service(create_test_service()).unwrap();

        assert_eq!(registry.service_count(), 1);
        assert!(registry.find_service(&service.uuid).is_some());
        assert_eq!(registry.stats().services_added, 1);
    }

    #[test]
    fn test_find_characteristic_ignores_case() {
        let mut registry = AttributeRegistry::new();
        registry.add_service(create_test_service()).unwrap();

        let lower = CHAR_UUID.parse::<Uuid>().unwrap();
        let upper = CHAR_UUID.to_uppercase().parse::<Uuid>().unwrap();
        assert_eq!(lower, upper);
        assert!(registry.find_characteristic(&lower).is_some());
    }

    #[test]
    fn test_short_uuid_resolves_to_expanded_form() {
        let mut registry = AttributeRegistry::new();
        let definition = ServiceDef::new("180D").with_characteristic(
            CharacteristicDef::new("2A37")
                .with_properties(vec![CharacteristicProperty::Notify]),
        );
        registry.add_service(definition).unwrap();

        let expanded = CHAR_UUID.parse::<Uuid>().unwrap();
        assert!(registry.find_characteristic(&expanded).is_some());
    }

    #[test]
    fn test_cccd_synthesized_for_notify() {
        let mut registry = AttributeRegistry::new();
        let service = registry.add_service(create_test_service()).unwrap();

        let characteristic = &service.characteristics[0];
        assert!(characteristic.has_cccd());
        assert_eq!(registry.stats().cccds_synthesized, 1);

        let cccd = registry
            .find_descriptor(&characteristic.uuid, &CCCD_UUID)
            .unwrap();
        assert_eq!(cccd.value, Some(vec![0x00, 0x00]));
    }

    #[test]
    fn test_cccd_not_duplicated_when_declared() {
        let mut registry = AttributeRegistry::new();
        let definition = ServiceDef::new(SERVICE_UUID).with_characteristic(
            CharacteristicDef::new(CHAR_UUID)
                .with_properties(vec![CharacteristicProperty::Notify])
                .with_descriptor(DescriptorDef::new("2902").with_value(vec![0x00, 0x00])),
        );
        let service = registry.add_service(definition).unwrap();

        let descriptors = &service.characteristics[0].descriptors;
        let cccds = descriptors.iter().filter(|d| d.uuid == CCCD_UUID).count();
        assert_eq!(cccds, 1);
        assert_eq!(registry.stats().cccds_synthesized, 0);
    }

    #[test]
    fn test_read_only_characteristic_gets_no_cccd() {
        let mut registry = AttributeRegistry::new();
        let definition = ServiceDef::new(SERVICE_UUID).with_characteristic(
            CharacteristicDef::new(CHAR_UUID)
                .with_properties(vec![CharacteristicProperty::Read]),
        );
        let service = registry.add_service(definition).unwrap();

        assert!(!service.characteristics[0].has_cccd());
    }

    #[test]
    fn test_replace_on_duplicate_uuid() {
        let mut registry = AttributeRegistry::new();
        registry.add_service(create_test_service()).unwrap();

        let replacement = ServiceDef::new(SERVICE_UUID).with_characteristic(
            CharacteristicDef::new("2A38").with_properties(vec![CharacteristicProperty::Read]),
        );
        registry.add_service(replacement).unwrap();

        assert_eq!(registry.service_count(), 1);
        assert_eq!(registry.stats().services_replaced, 1);

        // The replaced service's characteristics are unindexed.
        let old_char = CHAR_UUID.parse::<Uuid>().unwrap();
        assert!(registry.find_characteristic(&old_char).is_none());
    }

    #[test]
    fn test_remove_service() {
        let mut registry = AttributeRegistry::new();
        let service = registry.add_service(create_test_service()).unwrap();

        assert!(registry.remove_service(&service.uuid).is_some());
        assert!(registry.remove_service(&service.uuid).is_none());
        assert_eq!(registry.service_count(), 0);

        let characteristic = CHAR_UUID.parse::<Uuid>().unwrap();
        assert!(registry.find_characteristic(&characteristic).is_none());
    }

    #[test]
    fn test_clear_services() {
        let mut registry = AttributeRegistry::new();
        registry.add_service(create_test_service()).unwrap();
        registry
            .add_service(ServiceDef::new("1800"))
            .unwrap();

        assert_eq!(registry.clear(), 2);
        assert_eq!(registry.service_count(), 0);
        assert!(!registry.has_pending_adds());
    }

    #[test]
    fn test_service_uuids_in_registration_order() {
        let mut registry = AttributeRegistry::new();
        registry.add_service(ServiceDef::new("1800")).unwrap();
        registry.add_service(ServiceDef::new("180D")).unwrap();

        let uuids = registry.service_uuids();
        assert_eq!(uuids.len(), 2);
        assert!(uuids[0].starts_with("00001800"));
        assert!(uuids[1].starts_with("0000180d"));
    }

    #[test]
    fn test_replacement_moves_service_to_end() {
        let mut registry = AttributeRegistry::new();
        registry.add_service(ServiceDef::new("1800")).unwrap();
        registry.add_service(ServiceDef::new("180D")).unwrap();
        registry.add_service(ServiceDef::new("1800")).unwrap();

        let uuids = registry.service_uuids();
        assert_eq!(uuids.len(), 2);
        assert!(uuids[1].starts_with("00001800"));
    }

    #[test]
    fn test_pending_add_markers() {
        let mut registry = AttributeRegistry::new();
        let service = registry.add_service(create_test_service()).unwrap();

        assert!(!registry.has_pending_adds());
        registry.mark_pending_add(service.uuid);
        assert!(registry.has_pending_adds());

        assert!(registry.confirm_add(&service.uuid));
        assert!(!registry.confirm_add(&service.uuid));
        assert!(!registry.has_pending_adds());
    }

    #[test]
    fn test_update_and_read_cached_value() {
        let mut registry = AttributeRegistry::new();
        registry.add_service(create_test_service()).unwrap();
        let characteristic = CHAR_UUID.parse::<Uuid>().unwrap();

        assert_eq!(registry.cached_value(&characteristic), Some(vec![0x01]));
        registry
            .update_cached_value(&characteristic, &[0xAA, 0xBB])
            .unwrap();
        assert_eq!(
            registry.cached_value(&characteristic),
            Some(vec![0xAA, 0xBB])
        );
    }

    #[test]
    fn test_update_unknown_characteristic_fails() {
        let mut registry = AttributeRegistry::new();
        let unknown = Uuid::new_v4();
        let result = registry.update_cached_value(&unknown, &[0x00]);
        assert!(matches!(result, Err(GattwayError::NotFound { .. })));
    }

    #[test]
    fn test_malformed_definition_rejected() {
        let mut registry = AttributeRegistry::new();
        let result = registry.add_service(ServiceDef::new("not-a-uuid"));
        assert!(matches!(
            result,
            Err(GattwayError::InvalidIdentifier { .. })
        ));
        assert_eq!(registry.service_count(), 0);
    }

    #[test]
    fn test_descriptor_value_update() {
        let mut registry = AttributeRegistry::new();
        let definition = ServiceDef::new(SERVICE_UUID).with_characteristic(
            CharacteristicDef::new(CHAR_UUID)
                .with_properties(vec![CharacteristicProperty::Read])
                .with_descriptor(DescriptorDef::new("2901").with_value(b"label".to_vec())),
        );
        registry.add_service(definition).unwrap();

        let characteristic = CHAR_UUID.parse::<Uuid>().unwrap();
        let descriptor = "00002901-0000-1000-8000-00805f9b34fb".parse::<Uuid>().unwrap();
        registry
            .update_descriptor_value(&characteristic, &descriptor, b"renamed")
            .unwrap();
        let stored = registry.find_descriptor(&characteristic, &descriptor).unwrap();
        assert_eq!(stored.value.as_deref(), Some(b"renamed".as_ref()));
    }
}
