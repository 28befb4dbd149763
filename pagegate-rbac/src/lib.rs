//! Permission caching and decisions for pagegate
//!
//! This crate composes the pagegate building blocks into a per-session
//! permission subsystem:
//!
//! - **Permission cache**: one snapshot per process, TTL-bounded, keyed by the
//!   identity it was fetched for, with request coalescing on a miss
//! - **Fallback policy**: stale-but-same-identity snapshots on failure,
//!   fail-closed otherwise
//! - **Staleness monitor**: polling and cross-process signals that catch
//!   identity changes between checks
//! - **Evaluator**: boolean role and page checks, plus `require_*` guards
//! - **Audit logging**: optional logging of every decision
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pagegate_rbac::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let gate = PermissionGate::builder()
//!         .with_base_url("http://localhost:8080")
//!         .with_audit_logging(true)
//!         .build()?;
//!
//!     let _monitor = gate.start_monitor();
//!
//!     let evaluator = gate.evaluator();
//!     if evaluator
//!         .has_page_permission(Pages::USER_MANAGEMENT, Some(Operations::EDIT))
//!         .await
//!     {
//!         println!("{} may edit users", evaluator.username());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Custom Fetcher
//!
//! ```rust
//! use async_trait::async_trait;
//! use pagegate_rbac::prelude::*;
//!
//! struct ReadOnly;
//!
//! #[async_trait]
//! impl PermissionFetcher for ReadOnly {
//!     async fn fetch(&self, identity: &Identity) -> std::result::Result<PermissionSnapshot, FetchError> {
//!         Ok(PermissionSnapshot::new(identity.clone(), [Role::from(Roles::BROWSER)], []))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let gate = PermissionGate::builder()
//!         .with_fetcher(ReadOnly)
//!         .with_resolver(FixedIdentity(Identity::new("viewer")?))
//!         .build()?;
//!
//!     assert!(gate.evaluator().has_role(Roles::BROWSER).await);
//!     assert!(!gate.evaluator().has_any_role(&[Roles::ADMIN, Roles::OPERATOR]).await);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod fallback;
pub mod gate;
pub mod monitor;
pub mod requirement;
pub mod signal;

pub mod prelude {
    //! Common imports for pagegate RBAC

    pub use crate::cache::{CacheStats, PermissionCache};
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::evaluator::PermissionEvaluator;
    pub use crate::fallback::{FallbackPolicy, FetchOutcome};
    pub use crate::gate::{PermissionGate, PermissionGateBuilder};
    pub use crate::monitor::{MonitorAction, MonitorHandle, StalenessMonitor};
    pub use crate::requirement::*;
    pub use crate::signal::{InvalidationBus, InvalidationSignal};

    pub use pagegate_core::prelude::{
        CarrierIdentityResolver, CookieCarrier, CookieJar, FetchError, FixedIdentity,
        HeaderCarrier, Identity, IdentityCarrier, IdentityResolver, PageGrant, PermissionFetcher,
        PermissionSnapshot, Role,
    };

    // Common Result type
    pub type Result<T> = std::result::Result<T, GateError>;
}

pub use error::GateError;
pub use gate::PermissionGate;
pub use prelude::Result;
