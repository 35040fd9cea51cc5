//! Connection coordinator: the bond-then-connect state machine.
//!
//! A central only becomes logically connected once the platform reports it
//! bonded. Unbonded centrals are parked in `AwaitingBond` while pairing runs;
//! the `ConnectionStateChanged` announcement fires exactly once, either
//! straight away (already bonded) or when the bond completes. Bond state and
//! negotiated MTU are remembered per central and survive disconnects.

use std::collections::HashMap;

use gattway_core::{BondState, CentralId};
use tracing::{debug, warn};

// ----------------------------------------------------------------------------
// Per-central state
// ----------------------------------------------------------------------------

/// Logical connection state of a central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link, or a link the engine has not accepted yet.
    #[default]
    Disconnected,
    /// Link established, parked until the platform reports a bond.
    AwaitingBond,
    /// Bonded and announced to the host.
    Connected,
}

#[derive(Debug, Clone)]
struct CentralInfo {
    state: ConnectionState,
    bond_state: BondState,
    mtu: Option<u16>,
}

impl CentralInfo {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            bond_state: BondState::None,
            mtu: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Transition outcomes
// ----------------------------------------------------------------------------

/// What the engine should do after a raw connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAction {
    /// Accept the link and announce the connection to the host.
    Connected,
    /// Park the central until a bond is reported, optionally requesting one.
    AwaitBond { request_bond: bool },
    /// Nothing to do.
    None,
}

/// What the engine should do after a bond state report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondAction {
    /// A parked central finished bonding; accept and announce it.
    Connect,
    /// A parked central failed to bond; it returns to disconnected.
    Dropped,
    /// No connection-side effect.
    None,
}

// ----------------------------------------------------------------------------
// Connection Coordinator
// ----------------------------------------------------------------------------

/// Tracks connected centrals, their bond state, and their negotiated MTU.
pub struct ConnectionCoordinator {
    centrals: HashMap<CentralId, CentralInfo>,
    stats: ConnectionStats,
}

impl ConnectionCoordinator {
    /// Create a coordinator with no known centrals.
    pub fn new() -> Self {
        Self {
            centrals: HashMap::new(),
            stats: ConnectionStats::default(),
        }
    }

    /// Handle a raw link-connected event from the platform.
    pub fn on_central_connected(
        &mut self,
        central: &CentralId,
        bond_state: BondState,
    ) -> ConnectAction {
        let info = self
            .centrals
            .entry(central.clone())
            .or_insert_with(CentralInfo::new);
        info.bond_state = bond_state;

        match bond_state {
            BondState::Bonded => {
                if info.state == ConnectionState::Connected {
                    debug!("{} already connected, ignoring duplicate event", central);
                    return ConnectAction::None;
                }
                info.state = ConnectionState::Connected;
                self.stats.connections += 1;
                debug!("{} connected (bonded)", central);
                ConnectAction::Connected
            }
            BondState::None => match info.state {
                ConnectionState::Disconnected => {
                    info.state = ConnectionState::AwaitingBond;
                    self.stats.bonds_requested += 1;
                    debug!("{} unbonded, requesting bond before connect", central);
                    ConnectAction::AwaitBond { request_bond: true }
                }
                ConnectionState::AwaitingBond => ConnectAction::None,
                ConnectionState::Connected => {
                    warn!("{} reported connected without bond, ignoring", central);
                    ConnectAction::None
                }
            },
            BondState::Bonding => match info.state {
                ConnectionState::Disconnected => {
                    info.state = ConnectionState::AwaitingBond;
                    debug!("{} pairing in progress, waiting for bond", central);
                    ConnectAction::AwaitBond {
                        request_bond: false,
                    }
                }
                _ => ConnectAction::None,
            },
        }
    }

    /// Handle a bond state report from the platform.
    pub fn on_bond_state_changed(
        &mut self,
        central: &CentralId,
        bond_state: BondState,
    ) -> BondAction {
        let info = self
            .centrals
            .entry(central.clone())
            .or_insert_with(CentralInfo::new);
        info.bond_state = bond_state;

        match bond_state {
            BondState::Bonded => {
                if info.state == ConnectionState::AwaitingBond {
                    info.state = ConnectionState::Connected;
                    self.stats.bonds_completed += 1;
                    self.stats.connections += 1;
                    debug!("{} bonded, promoting to connected", central);
                    BondAction::Connect
                } else {
                    BondAction::None
                }
            }
            BondState::None => {
                if info.state == ConnectionState::AwaitingBond {
                    info.state = ConnectionState::Disconnected;
                    self.stats.bonds_failed += 1;
                    warn!("{} failed to bond, dropping", central);
                    BondAction::Dropped
                } else {
                    BondAction::None
                }
            }
            BondState::Bonding => BondAction::None,
        }
    }

    /// Handle a raw link-disconnected event, returning whether the central
    /// was logically connected (and the host must be told it left).
    pub fn on_central_disconnected(&mut self, central: &CentralId) -> bool {
        let Some(info) = self.centrals.get_mut(central) else {
            return false;
        };
        let was_connected = info.state == ConnectionState::Connected;
        info.state = ConnectionState::Disconnected;
        info.mtu = None;
        if was_connected {
            self.stats.disconnections += 1;
        }
        debug!("{} disconnected (was_connected: {})", central, was_connected);
        was_connected
    }

    /// Record the negotiated MTU for a central.
    pub fn set_mtu(&mut self, central: &CentralId, mtu: u16) {
        self.centrals
            .entry(central.clone())
            .or_insert_with(CentralInfo::new)
            .mtu = Some(mtu);
    }

    /// Negotiated MTU, if one was reported for this link.
    pub fn mtu_of(&self, central: &CentralId) -> Option<u16> {
        self.centrals.get(central).and_then(|info| info.mtu)
    }

    /// Whether a central is logically connected.
    pub fn is_connected(&self, central: &CentralId) -> bool {
        self.state_of(central) == ConnectionState::Connected
    }

    /// Logical connection state of a central.
    pub fn state_of(&self, central: &CentralId) -> ConnectionState {
        self.centrals
            .get(central)
            .map(|info| info.state)
            .unwrap_or_default()
    }

    /// Last reported bond state of a central.
    pub fn bond_state(&self, central: &CentralId) -> BondState {
        self.centrals
            .get(central)
            .map(|info| info.bond_state)
            .unwrap_or(BondState::None)
    }

    /// Logically connected centrals in sorted order.
    pub fn connected_centrals(&self) -> Vec<CentralId> {
        let mut connected: Vec<CentralId> = self
            .centrals
            .iter()
            .filter(|(_, info)| info.state == ConnectionState::Connected)
            .map(|(central, _)| central.clone())
            .collect();
        connected.sort();
        connected
    }

    /// Coordinator statistics.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}

impl Default for ConnectionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters describing connection and bonding activity.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Logical connections announced.
    pub connections: u64,
    /// Logical disconnections announced.
    pub disconnections: u64,
    /// Bonds requested for unbonded centrals.
    pub bonds_requested: u64,
    /// Bonds that completed while a central was parked.
    pub bonds_completed: u64,
    /// Bonds that failed while a central was parked.
    pub bonds_failed: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
