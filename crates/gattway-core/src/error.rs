//! Error types for the gattway peripheral engine
//!
//! This module contains all error types surfaced by the engine, from attribute
//! registration failures through platform capability errors, unified under the
//! main GattwayError type.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by the gattway peripheral engine
#[derive(Error, Debug)]
pub enum GattwayError {
    #[error("Attribute not found: {id}")]
    NotFound { id: String },

    #[error("Invalid identifier: {value}")]
    InvalidIdentifier { value: String },

    #[error("Operation not supported: {reason}")]
    NotSupported { reason: String },

    #[error("Device not found: {central}")]
    DeviceNotFound { central: String },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Platform send buffer full")]
    BufferFull,

    #[error("Platform error: {reason}")]
    Platform { reason: String },

    #[error("Channel error: {message}")]
    Channel { message: String },
}

impl GattwayError {
    /// Construct a NotFound error for an attribute identifier
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Construct an InvalidIdentifier error for a malformed UUID string
    pub fn invalid_identifier(value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
        }
    }

    /// Construct a NotSupported error with a reason
    pub fn not_supported(reason: impl Into<String>) -> Self {
        Self::NotSupported {
            reason: reason.into(),
        }
    }

    /// Construct a DeviceNotFound error for an unknown central
    pub fn device_not_found(central: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            central: central.into(),
        }
    }

    /// Construct an InvalidState error with a reason
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Construct a Platform error with a reason
    pub fn platform(reason: impl Into<String>) -> Self {
        Self::Platform {
            reason: reason.into(),
        }
    }

    /// Construct a Channel error with a message
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, GattwayError>;

/// Alias used where a bare `Result` would shadow module-local types
pub type GattwayResult<T> = core::result::Result<T, GattwayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GattwayError::not_found("180f");
        assert_eq!(err.to_string(), "Attribute not found: 180f");

        let err = GattwayError::invalid_identifier("not-a-uuid");
        assert_eq!(err.to_string(), "Invalid identifier: not-a-uuid");

        let err = GattwayError::BufferFull;
        assert_eq!(err.to_string(), "Platform send buffer full");
    }

    #[test]
    fn test_error_constructors() {
        match GattwayError::device_not_found("AA:BB:CC") {
            GattwayError::DeviceNotFound { central } => assert_eq!(central, "AA:BB:CC"),
            other => panic!("Unexpected variant: {:?}", other),
        }
    }
}
