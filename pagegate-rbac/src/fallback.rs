//! What to answer when a permission fetch does not succeed.
//!
//! | Fetch result | Answer | Cached for |
//! |--------------|--------|------------|
//! | snapshot | the snapshot | TTL |
//! | `Denied` | the deny-all snapshot | TTL |
//! | `Transport` / `Malformed` with a prior snapshot for the same identity | the prior snapshot, marked stale | stale retry interval |
//! | `Transport` / `Malformed` otherwise | a synthesized deny-all snapshot | not cached |

use pagegate_core::{FetchError, Identity, PermissionSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How a fetch was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Authoritative snapshot from the backend
    Fresh,
    /// Authoritative "no permissions" answer
    Denied,
    /// Previous snapshot served after a failure
    Stale,
    /// Fail-closed snapshot synthesized after a failure
    DenyAll,
}

impl FetchOutcome {
    /// Whether the backend actually answered for the identity.
    pub fn is_authoritative(self) -> bool {
        matches!(self, Self::Fresh | Self::Denied)
    }
}

/// Result of applying the fallback policy to one fetch.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub snapshot: Arc<PermissionSnapshot>,
    pub outcome: FetchOutcome,
    /// `None` means the snapshot must not be cached
    pub cache_for: Option<Duration>,
}

/// Decides what callers see after each fetch.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    ttl: Duration,
    stale_retry: Duration,
}

impl FallbackPolicy {
    pub fn new(ttl: Duration, stale_retry: Duration) -> Self {
        Self { ttl, stale_retry }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve a fetch for `identity`, given the last authoritative snapshot.
    pub fn resolve(
        &self,
        identity: &Identity,
        result: Result<PermissionSnapshot, FetchError>,
        last_good: Option<&Arc<PermissionSnapshot>>,
    ) -> Resolution {
        match result {
            Ok(snapshot) => Resolution {
                snapshot: Arc::new(snapshot),
                outcome: FetchOutcome::Fresh,
                cache_for: Some(self.ttl),
            },
            Err(FetchError::Denied { snapshot, .. }) => Resolution {
                snapshot: Arc::new(*snapshot),
                outcome: FetchOutcome::Denied,
                cache_for: Some(self.ttl),
            },
            Err(error) => match last_good.filter(|snapshot| &snapshot.identity == identity) {
                Some(previous) => {
                    warn!(
                        identity = %identity,
                        kind = error.kind(),
                        error = %error,
                        fetched_at = %previous.fetched_at,
                        "Permission fetch failed, serving previous snapshot"
                    );
                    Resolution {
                        snapshot: Arc::clone(previous),
                        outcome: FetchOutcome::Stale,
                        cache_for: Some(self.stale_retry),
                    }
                }
                None => {
                    warn!(
                        identity = %identity,
                        kind = error.kind(),
                        error = %error,
                        "Permission fetch failed with no previous snapshot, denying all"
                    );
                    Resolution {
                        snapshot: Arc::new(PermissionSnapshot::deny_all(identity.clone())),
                        outcome: FetchOutcome::DenyAll,
                        cache_for: None,
                    }
                }
            },
        }
    }
}
