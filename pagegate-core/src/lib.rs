//! # pagegate core
//!
//! Core types for resolving which roles a caller holds and which page-level
//! operations it may perform.
//!
//! This crate provides the building blocks shared by the fetcher and cache
//! crates:
//!
//! - [`types`]: identities, roles, page grants and immutable permission
//!   snapshots, plus the JSON payload of the permission query
//! - [`identity`]: pluggable identity resolution over cookies and headers
//! - [`fetcher`]: the single-query fetch contract
//! - [`error`]: the error taxonomy, including the three fetch failure modes
//!
//! ## API Stability
//!
//! **Current Status: EXPERIMENTAL (v0.x.x)**

#![warn(missing_docs)]

pub mod error;
pub mod fetcher;
pub mod identity;
pub mod types;

pub use error::{Error, FetchError, Result};
pub use fetcher::PermissionFetcher;
pub use identity::{
    CarrierIdentityResolver, CookieCarrier, CookieJar, FixedIdentity, HeaderCarrier,
    IdentityCarrier, IdentityResolver,
};
pub use types::{Identity, PageGrant, PermissionSnapshot, Role};

/// Common imports
pub mod prelude {
    pub use crate::error::{Error, FetchError, Result};
    pub use crate::fetcher::PermissionFetcher;
    pub use crate::identity::{
        CarrierIdentityResolver, CookieCarrier, CookieJar, FixedIdentity, HeaderCarrier,
        IdentityCarrier, IdentityResolver,
    };
    pub use crate::types::{Identity, PageGrant, PermissionSnapshot, Role};
}
