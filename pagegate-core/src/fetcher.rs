//! The permission query contract.

use crate::error::FetchError;
use crate::types::{Identity, PermissionSnapshot};
use async_trait::async_trait;
use std::sync::Arc;

/// Issues one authoritative permission query per call.
///
/// Implementations must not retry internally; retry policy belongs to the
/// cache and the staleness monitor. An explicit denial is reported as
/// [`FetchError::Denied`], which still carries a deny-all snapshot.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use pagegate_core::prelude::*;
///
/// struct Everyone;
///
/// #[async_trait]
/// impl PermissionFetcher for Everyone {
///     async fn fetch(&self, identity: &Identity) -> std::result::Result<PermissionSnapshot, FetchError> {
///         Ok(PermissionSnapshot::new(identity.clone(), [Role::from("BROWSER")], []))
///     }
/// }
/// ```
#[async_trait]
pub trait PermissionFetcher: Send + Sync {
    /// Fetch the full permission snapshot for `identity`.
    async fn fetch(&self, identity: &Identity) -> Result<PermissionSnapshot, FetchError>;

    /// Short label for logs.
    fn fetcher_type(&self) -> &'static str {
        "custom"
    }
}

#[async_trait]
impl<T: PermissionFetcher + ?Sized> PermissionFetcher for Arc<T> {
    async fn fetch(&self, identity: &Identity) -> Result<PermissionSnapshot, FetchError> {
        (**self).fetch(identity).await
    }

    fn fetcher_type(&self) -> &'static str {
        (**self).fetcher_type()
    }
}
