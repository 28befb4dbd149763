//! # pagegate - role and page permissions with a fail-closed cache
//!
//! This crate re-exports the functionality of the constituent crates:
//! - `pagegate-core`: identities, permission snapshots, identity carriers and the fetch contract
//! - `pagegate-client`: the HTTP permission fetcher
//! - `pagegate-rbac`: cache, staleness monitor, evaluator and the gate builder

pub use pagegate_client as client;
pub use pagegate_core as core;
pub use pagegate_rbac as rbac;

pub use pagegate_client::HttpPermissionFetcher;
pub use pagegate_rbac::{GateError, PermissionGate};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::client::HttpPermissionFetcher;
    pub use crate::rbac::prelude::*;
}
