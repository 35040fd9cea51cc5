//! Gattway Harness
//!
//! Provides the deterministic mock platform and shared fixtures that
//! engine and binding tests depend on.

pub mod fixtures;
pub mod mock;

pub use fixtures::*;
pub use mock::*;
