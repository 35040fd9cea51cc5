//! Subscription tracker: who is listening to what.
//!
//! Maintains the (central, characteristic) subscription relation driven by
//! CCCD writes. The raw two-byte configuration is kept per pair so descriptor
//! reads can echo back exactly what the central wrote; a pair counts as
//! subscribed while either the notification or the indication bit is set.

use std::collections::HashMap;

use gattway_core::CentralId;
use tracing::debug;
use uuid::Uuid;

/// CCCD bit enabling notifications.
pub const CCCD_NOTIFY_BIT: u16 = 0x0001;
/// CCCD bit enabling indications.
pub const CCCD_INDICATE_BIT: u16 = 0x0002;

const ENABLE_MASK: u16 = CCCD_NOTIFY_BIT | CCCD_INDICATE_BIT;

// ----------------------------------------------------------------------------
// Subscription Tracker
// ----------------------------------------------------------------------------

/// Tracks which centrals are subscribed to which characteristics.
pub struct SubscriptionTracker {
    /// Raw CCCD configuration per central and characteristic.
    subscriptions: HashMap<CentralId, HashMap<Uuid, u16>>,
    /// Tracker statistics.
    stats: SubscriptionStats,
}

impl SubscriptionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            stats: SubscriptionStats::default(),
        }
    }

    /// Apply a CCCD write and report the resulting transition.
    ///
    /// The value is decoded as a little-endian u16, zero-extended when shorter
    /// than two bytes. Returns `Some(true)` on a fresh subscription,
    /// `Some(false)` on an unsubscription, and `None` when the subscribed
    /// state did not change (the stored configuration is still updated, so a
    /// notify-to-indicate switch is recorded without emitting an event).
    pub fn apply_cccd_write(
        &mut self,
        central: &CentralId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Option<bool> {
        let bits = decode_cccd(value);
        let enabled = bits & ENABLE_MASK != 0;
        let currently = self.is_subscribed(central, &characteristic);

        match (currently, enabled) {
            (false, true) => {
                self.subscriptions
                    .entry(central.clone())
                    .or_default()
                    .insert(characteristic, bits);
                self.stats.subscriptions += 1;
                debug!("{} subscribed to {}", central, characteristic);
                Some(true)
            }
            (true, false) => {
                self.drop_pair(central, &characteristic);
                self.stats.unsubscriptions += 1;
                debug!("{} unsubscribed from {}", central, characteristic);
                Some(false)
            }
            (true, true) => {
                // Still subscribed; remember the new configuration bits.
                self.subscriptions
                    .entry(central.clone())
                    .or_default()
                    .insert(characteristic, bits);
                self.stats.redundant_writes += 1;
                None
            }
            (false, false) => {
                self.stats.redundant_writes += 1;
                None
            }
        }
    }

    /// Drop every subscription held by a central, returning the affected
    /// characteristic UUIDs in sorted order.
    pub fn remove_central(&mut self, central: &CentralId) -> Vec<Uuid> {
        let Some(held) = self.subscriptions.remove(central) else {
            return Vec::new();
        };
        let mut characteristics: Vec<Uuid> = held.into_keys().collect();
        characteristics.sort();
        self.stats.centrals_purged += 1;
        debug!(
            "Purged {} subscription(s) held by {}",
            characteristics.len(),
            central
        );
        characteristics
    }

    /// Whether a central is subscribed to a characteristic.
    pub fn is_subscribed(&self, central: &CentralId, characteristic: &Uuid) -> bool {
        self.subscriptions
            .get(central)
            .and_then(|held| held.get(characteristic))
            .map(|bits| bits & ENABLE_MASK != 0)
            .unwrap_or(false)
    }

    /// Raw CCCD configuration for a pair, zero when absent.
    pub fn config_bits(&self, central: &CentralId, characteristic: &Uuid) -> u16 {
        self.subscriptions
            .get(central)
            .and_then(|held| held.get(characteristic))
            .copied()
            .unwrap_or(0)
    }

    /// Subscribers of a characteristic in sorted order.
    pub fn subscribers_of(&self, characteristic: &Uuid) -> Vec<CentralId> {
        let mut subscribers: Vec<CentralId> = self
            .subscriptions
            .iter()
            .filter(|(_, held)| {
                held.get(characteristic)
                    .map(|bits| bits & ENABLE_MASK != 0)
                    .unwrap_or(false)
            })
            .map(|(central, _)| central.clone())
            .collect();
        subscribers.sort();
        subscribers
    }

    /// Centrals holding at least one subscription, in sorted order.
    pub fn subscribed_centrals(&self) -> Vec<CentralId> {
        let mut centrals: Vec<CentralId> = self
            .subscriptions
            .iter()
            .filter(|(_, held)| !held.is_empty())
            .map(|(central, _)| central.clone())
            .collect();
        centrals.sort();
        centrals
    }

    /// Total number of live (central, characteristic) pairs.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(HashMap::len).sum()
    }

    /// Tracker statistics.
    pub fn stats(&self) -> &SubscriptionStats {
        &self.stats
    }

    fn drop_pair(&mut self, central: &CentralId, characteristic: &Uuid) {
        if let Some(held) = self.subscriptions.get_mut(central) {
            held.remove(characteristic);
            if held.is_empty() {
                self.subscriptions.remove(central);
            }
        }
    }
}

impl Default for SubscriptionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a CCCD value as a little-endian u16, zero-extending short writes.
fn decode_cccd(value: &[u8]) -> u16 {
    match value {
        [] => 0,
        [low] => *low as u16,
        [low, high, ..] => u16::from_le_bytes([*low, *high]),
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters describing subscription activity.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStats {
    /// Fresh subscriptions established.
    pub subscriptions: u64,
    /// Subscriptions dropped by CCCD writes.
    pub unsubscriptions: u64,
    /// CCCD writes that did not change the subscribed state.
    pub redundant_writes: u64,
    /// Centrals purged on disconnect.
    pub centrals_purged: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
