//! Core peripheral logic.
//!
//! This module contains the single-task engine that owns all GATT server
//! state. Commands from the host and events from the platform binding are
//! funneled through one `tokio::select!` loop, so managers never need
//! locks: the task is the only writer.
//!
//! ## Architecture
//!
//! ```text
//! Host API  ──commands──▶ ┌────────────────┐ ──events──▶  Host
//!                         │ PeripheralTask │
//! Platform ──events─────▶ │  (select loop) │ ──calls───▶  Platform
//!                         └────────────────┘
//! ```
//!
//! - `state` holds [`PeripheralState`]: the five managers plus counters.
//! - `task` holds [`PeripheralTask`]: the select loop and its handlers.
//!
//! Read and write requests are the one place work leaves the task: each
//! suspended request gets a oneshot responder, and a spawned waiter
//! forwards the host's answer (or the drop default) back to the platform
//! without stalling the loop.

pub mod state;
pub mod task;

pub use state::{EngineStats, PeripheralState};
pub use task::PeripheralTask;
