//! Error types for pagegate RBAC

use pagegate_core::Identity;
use thiserror::Error;

/// Errors that can occur in gate operations
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Access denied for '{identity}': {requirement}")]
    AccessDenied {
        identity: Identity,
        requirement: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] pagegate_core::Error),
}

impl GateError {
    /// Whether this error is a permission decision rather than a fault.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}
