//! Peripheral engine state.
//!
//! All mutable engine state lives here, owned exclusively by the peripheral
//! task. The managers never reach outside themselves; the task wires their
//! decisions to platform calls and host events.

use crate::managers::{
    AdvertisingController, AttributeRegistry, ConnectionCoordinator, SubscriptionTracker,
    UpdateQueue,
};

// ----------------------------------------------------------------------------
// Peripheral State
// ----------------------------------------------------------------------------

/// State owned by the peripheral task.
pub struct PeripheralState {
    /// Hosted services and cached attribute values.
    pub registry: AttributeRegistry,
    /// Who is subscribed to what.
    pub subscriptions: SubscriptionTracker,
    /// Pending characteristic updates.
    pub queue: UpdateQueue,
    /// Connected centrals and their bond state.
    pub connections: ConnectionCoordinator,
    /// Advertising lifecycle.
    pub advertising: AdvertisingController,
    /// Engine statistics.
    pub stats: EngineStats,
}

impl PeripheralState {
    /// Create empty engine state.
    pub fn new() -> Self {
        Self {
            registry: AttributeRegistry::new(),
            subscriptions: SubscriptionTracker::new(),
            queue: UpdateQueue::new(),
            connections: ConnectionCoordinator::new(),
            advertising: AdvertisingController::new(),
            stats: EngineStats::default(),
        }
    }
}

impl Default for PeripheralState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for the peripheral task.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub commands_processed: u64,
    pub events_processed: u64,
    pub events_emitted: u64,
}
