//! Advertising controller.
//!
//! Small state machine around the platform's asynchronous advertising
//! lifecycle. A start issued while service registrations are still awaiting
//! platform confirmation is parked and dispatched once the last confirmation
//! lands, so the advertisement never names a service the native GATT server
//! does not host yet.

use gattway_core::Advertisement;
use tracing::debug;

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

/// Advertising lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AdvertisingState {
    /// Not advertising and nothing in flight.
    #[default]
    Idle,
    /// Start requested; parked on pending service adds or awaiting the
    /// platform's confirmation.
    Starting,
    /// The platform confirmed the advertisement is broadcasting.
    Advertising,
    /// The last start attempt failed with the given reason; a new start may
    /// be issued.
    Failed(String),
}

/// How the engine should act on an accepted start request.
#[derive(Debug, Clone, PartialEq)]
pub enum StartAction {
    /// Hand the advertisement to the platform now.
    Dispatch(Advertisement),
    /// Parked until pending service registrations are confirmed.
    Deferred,
}

// ----------------------------------------------------------------------------
// Advertising Controller
// ----------------------------------------------------------------------------

/// Tracks the advertising lifecycle and the parked advertisement, if any.
pub struct AdvertisingController {
    state: AdvertisingState,
    parked: Option<Advertisement>,
    stats: AdvertisingStats,
}

impl AdvertisingController {
    /// Create an idle controller.
    pub fn new() -> Self {
        Self {
            state: AdvertisingState::Idle,
            parked: None,
            stats: AdvertisingStats::default(),
        }
    }

    /// Accept or reject a start request.
    ///
    /// `defer` is true while service registrations await confirmation; the
    /// advertisement is then parked instead of dispatched. Starting while a
    /// start is in flight or the advertisement is live is an error.
    pub fn request_start(
        &mut self,
        advertisement: Advertisement,
        defer: bool,
    ) -> gattway_core::Result<StartAction> {
        match self.state {
            AdvertisingState::Starting => Err(gattway_core::GattwayError::invalid_state(
                "Advertising start already in flight",
            )),
            AdvertisingState::Advertising => Err(gattway_core::GattwayError::invalid_state(
                "Already advertising",
            )),
            AdvertisingState::Idle | AdvertisingState::Failed(_) => {
                self.state = AdvertisingState::Starting;
                self.stats.starts_requested += 1;
                if defer {
                    debug!("Parking advertisement until service adds are confirmed");
                    self.parked = Some(advertisement);
                    self.stats.starts_deferred += 1;
                    Ok(StartAction::Deferred)
                } else {
                    Ok(StartAction::Dispatch(advertisement))
                }
            }
        }
    }

    /// Take the parked advertisement for dispatch once the last pending
    /// service add has been confirmed.
    pub fn take_parked(&mut self) -> Option<Advertisement> {
        if self.state == AdvertisingState::Starting {
            self.parked.take()
        } else {
            None
        }
    }

    /// Record a successful start confirmation from the platform.
    pub fn mark_started(&mut self) {
        if self.state != AdvertisingState::Starting {
            debug!(
                "Advertising start confirmed in unexpected state {:?}",
                self.state
            );
        }
        self.parked = None;
        self.state = AdvertisingState::Advertising;
        self.stats.started += 1;
    }

    /// Record a failed start, keeping the reason for inspection.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.parked = None;
        self.state = AdvertisingState::Failed(reason.into());
        self.stats.failures += 1;
    }

    /// Handle a host-issued stop. Discards any parked advertisement; the
    /// status announcement is the caller's job, once per stop command.
    pub fn request_stop(&mut self) -> bool {
        let was_active = self.state != AdvertisingState::Idle;
        self.parked = None;
        self.state = AdvertisingState::Idle;
        self.stats.stops += 1;
        was_active
    }

    /// Handle a platform-initiated stop (for example an advertising timeout
    /// elapsing). Returns whether the host must be told; stops that merely
    /// confirm a host-issued stop are swallowed.
    pub fn on_stopped_by_platform(&mut self) -> bool {
        match self.state {
            AdvertisingState::Idle => false,
            _ => {
                self.parked = None;
                self.state = AdvertisingState::Idle;
                true
            }
        }
    }

    /// Whether the advertisement is confirmed live.
    pub fn is_advertising(&self) -> bool {
        self.state == AdvertisingState::Advertising
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AdvertisingState {
        self.state.clone()
    }

    /// Controller statistics.
    pub fn stats(&self) -> &AdvertisingStats {
        &self.stats
    }
}

impl Default for AdvertisingController {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters describing advertising lifecycle activity.
#[derive(Debug, Clone, Default)]
pub struct AdvertisingStats {
    /// Start requests accepted.
    pub starts_requested: u64,
    /// Starts parked on pending service adds.
    pub starts_deferred: u64,
    /// Starts confirmed by the platform.
    pub started: u64,
    /// Starts that failed.
    pub failures: u64,
    /// Host-issued stops.
    pub stops: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
