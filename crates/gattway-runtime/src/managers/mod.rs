//! State managers for the peripheral engine.
//!
//! Each manager is a synchronous state machine owned by the peripheral
//! task. Managers hold state and decide transitions; they never touch the
//! platform or the channels. Handlers in `logic::task` translate the
//! actions they return into platform calls and host events.

pub mod advertising;
pub mod connections;
pub mod registry;
pub mod subscriptions;
pub mod updates;

pub use advertising::{AdvertisingController, AdvertisingState, AdvertisingStats, StartAction};
pub use connections::{
    BondAction, ConnectAction, ConnectionCoordinator, ConnectionState, ConnectionStats,
};
pub use registry::{AttributeRegistry, RegistryStats};
pub use subscriptions::{
    SubscriptionStats, SubscriptionTracker, CCCD_INDICATE_BIT, CCCD_NOTIFY_BIT,
};
pub use updates::{OutboundSend, QueueStats, UpdateQueue};
