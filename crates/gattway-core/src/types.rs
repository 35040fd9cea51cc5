//! Core identifier types for the gattway peripheral engine
//!
//! This module defines the fundamental types shared between the engine, the
//! platform bindings, and host applications, using newtype patterns for
//! semantic validation and type safety.

use core::fmt;
use core::ops::Deref;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Central Identifier
// ----------------------------------------------------------------------------

/// Opaque identifier for a remote central (GATT client)
///
/// The underlying string is whatever the platform binding uses to address a
/// connection: a MAC address on Android, a CBCentral identifier on Darwin, a
/// session handle elsewhere. The engine never interprets it beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CentralId(String);

impl CentralId {
    /// Create a new central identifier from a platform address string
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the underlying address string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CentralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CentralId {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

impl From<String> for CentralId {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl Deref for CentralId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Bond State
// ----------------------------------------------------------------------------

/// Pairing state of a remote central as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondState {
    /// No bond exists and no pairing is in progress
    None,
    /// Pairing is in progress
    Bonding,
    /// A bond is established
    Bonded,
}

impl fmt::Display for BondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BondState::None => write!(f, "none"),
            BondState::Bonding => write!(f, "bonding"),
            BondState::Bonded => write!(f, "bonded"),
        }
    }
}

// ----------------------------------------------------------------------------
// Request Identifier
// ----------------------------------------------------------------------------

/// Correlation identifier for an outstanding ATT read or write request
///
/// Issued by the platform binding when a central's request suspends, and
/// passed back through `Platform::respond_to_read`/`respond_to_write` once the
/// host produces an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Create a request identifier from a raw platform value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_central_id_equality_and_hash() {
        let a = CentralId::new("AA:BB:CC:DD:EE:FF");
        let b = CentralId::from("AA:BB:CC:DD:EE:FF");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
    }

    #[test]
    fn test_central_id_display() {
        let id = CentralId::new("central-7");
        assert_eq!(id.to_string(), "central-7");
        assert_eq!(id.as_str(), "central-7");
    }

    #[test]
    fn test_bond_state_display() {
        assert_eq!(BondState::None.to_string(), "none");
        assert_eq!(BondState::Bonding.to_string(), "bonding");
        assert_eq!(BondState::Bonded.to_string(), "bonded");
    }

    #[test]
    fn test_request_id_roundtrip() {
        let id = RequestId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(id.to_string(), "req-42");
    }
}
