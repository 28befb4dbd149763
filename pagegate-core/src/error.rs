//! Error types for pagegate.
//!
//! This module defines the crate-wide [`Error`] enum and the narrower
//! [`FetchError`] taxonomy returned by permission fetchers.
//!
//! # Error Handling Philosophy
//!
//! Fetch failures never reach callers of the permission decision surface:
//! `Transport` and `Malformed` are absorbed by the cache fallback policy and
//! `Denied` is a legitimate, cacheable outcome. [`Error`] covers everything
//! else (configuration, invalid identities, carrier problems).
//!
//! # Examples
//!
//! ```rust
//! use pagegate_core::error::{Error, FetchError, Result};
//!
//! fn example_function() -> Result<String> {
//!     Err(Error::Fetch(FetchError::transport("backend unreachable")))
//! }
//! ```

use crate::types::{Identity, PermissionSnapshot};
use thiserror::Error;

/// Result type alias for pagegate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pagegate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A permission fetch failed.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An identity token was empty or otherwise unusable.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Configuration error (invalid settings, missing config, etc.).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// URL parsing failed.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Input/output error from the underlying system.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for other error types.
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a new configuration error.
    ///
    /// ```rust
    /// use pagegate_core::error::Error;
    ///
    /// let error = Error::configuration("ttl must be positive");
    /// assert!(error.to_string().contains("ttl"));
    /// ```
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new invalid identity error.
    pub fn invalid_identity(msg: impl Into<String>) -> Self {
        Self::InvalidIdentity(msg.into())
    }
}

/// Failure modes of a single authoritative permission query.
///
/// The three variants are distinct:
///
/// - `Transport`: the backend was unreachable, answered with a non-success
///   status, or did not answer within the fetch timeout.
/// - `Malformed`: the backend answered but the payload does not have the
///   expected shape.
/// - `Denied`: the backend explicitly reported that the identity holds no
///   permissions. It carries a deny-all snapshot which is cached like any
///   other authoritative answer.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Backend unreachable, non-success status or timeout.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Payload does not conform to the expected shape.
    #[error("Malformed permission payload: {0}")]
    Malformed(String),

    /// Backend explicitly reports no permissions for the identity.
    #[error("Permission denied for '{}'", .snapshot.identity)]
    Denied {
        /// Deny-all snapshot for the identity that was queried.
        snapshot: Box<PermissionSnapshot>,
        /// Message reported by the backend, if any.
        reason: Option<String>,
    },
}

impl FetchError {
    /// Create a transport failure.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a malformed payload failure.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a denial for `identity`, carrying a deny-all snapshot.
    ///
    /// ```rust
    /// use pagegate_core::error::FetchError;
    /// use pagegate_core::types::Identity;
    ///
    /// let identity = Identity::new("mallory").unwrap();
    /// let error = FetchError::denied(&identity, Some("no roles".to_string()));
    /// assert!(!error.is_fallback_worthy());
    /// ```
    pub fn denied(identity: &Identity, reason: Option<String>) -> Self {
        Self::Denied {
            snapshot: Box::new(PermissionSnapshot::deny_all(identity.clone())),
            reason,
        }
    }

    /// Whether the fallback policy should absorb this failure.
    ///
    /// `Denied` is an authoritative answer and is not fallback-worthy.
    pub fn is_fallback_worthy(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Malformed(_))
    }

    /// Short label used in structured logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
            Self::Denied { .. } => "denied",
        }
    }
}
