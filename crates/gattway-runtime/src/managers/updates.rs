//! Update queue: ordered, single-in-flight notification dispatch.
//!
//! Characteristic updates join a global FIFO and are pushed out one
//! notification at a time. Targets are resolved when an entry reaches the head
//! of the queue, not when it is enqueued, so subscribers gained while an
//! update waited still receive it. A platform buffer-full report parks the
//! queue until the platform signals readiness, and the rejected notification
//! is retried with the identical bytes to the identical target.

use std::collections::VecDeque;

use gattway_core::CentralId;
use tracing::debug;
use uuid::Uuid;

use crate::managers::connections::ConnectionCoordinator;
use crate::managers::subscriptions::SubscriptionTracker;

// ----------------------------------------------------------------------------
// Queue entries
// ----------------------------------------------------------------------------

/// A queued characteristic update awaiting dispatch.
#[derive(Debug, Clone)]
struct PendingUpdate {
    characteristic: Uuid,
    payload: Vec<u8>,
    /// Explicit target, or None to fan out to all subscribers.
    target: Option<CentralId>,
    /// Targets still owed a notification. None until the entry reaches the
    /// head of the queue and is resolved.
    remaining: Option<Vec<CentralId>>,
}

/// A single notification ready to hand to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSend {
    pub central: CentralId,
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Update Queue
// ----------------------------------------------------------------------------

/// FIFO of pending updates with single-in-flight drain semantics.
pub struct UpdateQueue {
    entries: VecDeque<PendingUpdate>,
    /// Guards against a second drain starting while one is running.
    processing: bool,
    /// Set on buffer-full, cleared when the platform reports ready.
    blocked: bool,
    stats: QueueStats,
}

impl UpdateQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            processing: false,
            blocked: false,
            stats: QueueStats::default(),
        }
    }

    /// Append an update to the queue. Never sends; the caller drives the
    /// drain separately.
    pub fn enqueue(&mut self, characteristic: Uuid, payload: Vec<u8>, target: Option<CentralId>) {
        self.entries.push_back(PendingUpdate {
            characteristic,
            payload,
            target,
            remaining: None,
        });
        self.stats.enqueued += 1;
    }

    /// Try to claim the drain. Returns false while another drain is running
    /// or the queue is parked waiting for the platform to drain its buffer.
    pub fn begin_drain(&mut self) -> bool {
        if self.processing || self.blocked {
            return false;
        }
        self.processing = true;
        true
    }

    /// Release the drain claim.
    pub fn finish_drain(&mut self) {
        self.processing = false;
    }

    /// Resolve the next notification to send, dropping entries whose targets
    /// have disappeared.
    ///
    /// An entry's target set is fixed the first time it reaches the head;
    /// retries keep that set and only skip members that disconnected or
    /// unsubscribed in the meantime, so no target is notified twice and no
    /// late subscriber is spliced into a half-finished fan-out.
    pub fn prepare_head(
        &mut self,
        subscriptions: &SubscriptionTracker,
        connections: &ConnectionCoordinator,
    ) -> Option<OutboundSend> {
        loop {
            let entry = self.entries.front_mut()?;

            if entry.remaining.is_none() {
                let resolved = match &entry.target {
                    Some(central) if connections.is_connected(central) => vec![central.clone()],
                    Some(central) => {
                        debug!(
                            "Dropping update for {}: {} is not connected",
                            entry.characteristic, central
                        );
                        self.stats.targets_skipped += 1;
                        Vec::new()
                    }
                    None => {
                        let subscribers = subscriptions.subscribers_of(&entry.characteristic);
                        if subscribers.is_empty() {
                            debug!(
                                "Dropping update for {}: no subscribers",
                                entry.characteristic
                            );
                        }
                        subscribers
                    }
                };
                entry.remaining = Some(resolved);
            }

            if let Some(remaining) = entry.remaining.as_mut() {
                while let Some(next) = remaining.first() {
                    let live = match &entry.target {
                        Some(_) => connections.is_connected(next),
                        None => subscriptions.is_subscribed(next, &entry.characteristic),
                    };
                    if live {
                        return Some(OutboundSend {
                            central: next.clone(),
                            characteristic: entry.characteristic,
                            payload: entry.payload.clone(),
                        });
                    }
                    debug!(
                        "Skipping stale target {} for {}",
                        next, entry.characteristic
                    );
                    remaining.remove(0);
                    self.stats.targets_skipped += 1;
                }
            }

            // Every target handled or gone; retire the entry.
            self.entries.pop_front();
        }
    }

    /// Record an accepted notification and advance past its target.
    pub fn mark_sent(&mut self) {
        self.stats.notifications_sent += 1;
        self.advance_target();
    }

    /// Record a per-target send failure and advance past the target.
    pub fn mark_send_failed(&mut self) {
        self.stats.send_failures += 1;
        self.advance_target();
    }

    /// Park the queue after a buffer-full report. The head entry keeps its
    /// current target so the retry repeats the identical notification.
    pub fn mark_buffer_full(&mut self) {
        self.blocked = true;
        self.stats.buffer_full_pauses += 1;
    }

    /// Clear the buffer-full park; the caller should drain again.
    pub fn unblock(&mut self) {
        self.blocked = false;
    }

    /// Whether the queue is parked waiting for the platform.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Number of queued entries (not individual targets).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue statistics.
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn advance_target(&mut self) {
        let exhausted = match self.entries.front_mut() {
            Some(entry) => match entry.remaining.as_mut() {
                Some(remaining) => {
                    if !remaining.is_empty() {
                        remaining.remove(0);
                    }
                    remaining.is_empty()
                }
                None => true,
            },
            None => return,
        };
        if exhausted {
            self.entries.pop_front();
        }
    }
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters describing dispatch activity.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Updates enqueued.
    pub enqueued: u64,
    /// Notifications accepted by the platform.
    pub notifications_sent: u64,
    /// Per-target platform send errors.
    pub send_failures: u64,
    /// Times the queue parked on a buffer-full report.
    pub buffer_full_pauses: u64,
    /// Targets dropped because they disconnected or unsubscribed.
    pub targets_skipped: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
