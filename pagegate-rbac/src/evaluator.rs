//! Permission evaluator: the decision surface used by CRUD features.
//!
//! Every decision resolves the current identity, reads the cache for it
//! (fetching at most once on a miss) and answers a plain boolean. Fetch
//! failures never surface here; under total failure every answer is `false`.

use crate::cache::PermissionCache;
use crate::error::GateError;
use crate::requirement::{PageRequirement, RoleRequirement};
use pagegate_core::{Identity, IdentityResolver, PermissionSnapshot, Role};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

type GateResult<T> = std::result::Result<T, GateError>;

/// Answers role and page checks for the current identity
#[derive(Clone)]
pub struct PermissionEvaluator {
    cache: PermissionCache,
    resolver: Arc<dyn IdentityResolver>,
    audit_enabled: bool,
}

impl PermissionEvaluator {
    pub fn new(cache: PermissionCache, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            cache,
            resolver,
            audit_enabled: false,
        }
    }

    /// Log every decision at info/warn instead of debug
    pub fn with_audit_logging(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    /// Snapshot for the current identity, fetching on a miss
    pub async fn snapshot(&self) -> Arc<PermissionSnapshot> {
        let identity = self.resolver.resolve();
        self.cache.get(&identity).await
    }

    pub async fn has_role(&self, role: &str) -> bool {
        self.check_roles(&RoleRequirement::any(&[role])).await
    }

    /// False for an empty list
    pub async fn has_any_role(&self, roles: &[&str]) -> bool {
        self.check_roles(&RoleRequirement::any(roles)).await
    }

    /// True for an empty list
    pub async fn has_all_roles(&self, roles: &[&str]) -> bool {
        self.check_roles(&RoleRequirement::all(roles)).await
    }

    /// Page access, or a single operation on the page when `operation` is given.
    ///
    /// Unknown pages are denied. An operation check consults only the
    /// page's operation set, not its access flag.
    pub async fn has_page_permission(&self, page: &str, operation: Option<&str>) -> bool {
        let requirement = match operation {
            Some(operation) => PageRequirement::operation(page, operation),
            None => PageRequirement::access(page),
        };
        self.check_page(&requirement).await
    }

    pub async fn check_page(&self, requirement: &PageRequirement) -> bool {
        let snapshot = self.snapshot().await;
        let granted = requirement.is_satisfied_by(&snapshot);
        self.audit(&snapshot.identity, requirement, granted);
        granted
    }

    pub async fn check_roles(&self, requirement: &RoleRequirement) -> bool {
        let snapshot = self.snapshot().await;
        let granted = requirement.is_satisfied_by(&snapshot);
        self.audit(&snapshot.identity, requirement, granted);
        granted
    }

    /// Like [`check_page`](Self::check_page), but a refusal is an error.
    pub async fn require_page(
        &self,
        requirement: &PageRequirement,
    ) -> GateResult<Arc<PermissionSnapshot>> {
        let snapshot = self.snapshot().await;
        let granted = requirement.is_satisfied_by(&snapshot);
        self.audit(&snapshot.identity, requirement, granted);
        if granted {
            Ok(snapshot)
        } else {
            Err(GateError::AccessDenied {
                identity: snapshot.identity.clone(),
                requirement: requirement.to_string(),
            })
        }
    }

    /// Like [`check_roles`](Self::check_roles), but a refusal is an error.
    pub async fn require_roles(
        &self,
        requirement: &RoleRequirement,
    ) -> GateResult<Arc<PermissionSnapshot>> {
        let snapshot = self.snapshot().await;
        let granted = requirement.is_satisfied_by(&snapshot);
        self.audit(&snapshot.identity, requirement, granted);
        if granted {
            Ok(snapshot)
        } else {
            Err(GateError::AccessDenied {
                identity: snapshot.identity.clone(),
                requirement: requirement.to_string(),
            })
        }
    }

    /// Drop the cached entry and fetch again for the current identity.
    pub async fn refresh(&self) -> Arc<PermissionSnapshot> {
        let identity = self.resolver.resolve();
        info!(identity = %identity, "Refreshing permissions");
        self.cache.invalidate();
        self.cache.get(&identity).await
    }

    /// The identity decisions are currently made for.
    pub fn username(&self) -> Identity {
        self.resolver.resolve()
    }

    pub async fn roles(&self) -> BTreeSet<Role> {
        self.snapshot().await.roles.clone()
    }

    /// Whatever the cache holds for the current identity, without fetching.
    pub fn current_snapshot(&self) -> Option<Arc<PermissionSnapshot>> {
        self.cache.peek(&self.resolver.resolve())
    }

    pub fn is_loading(&self) -> bool {
        self.cache.is_loading()
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    fn audit(&self, identity: &Identity, requirement: &dyn Display, granted: bool) {
        let result = if granted { "granted" } else { "denied" };
        if !self.audit_enabled {
            debug!(identity = %identity, requirement = %requirement, result, "Permission check");
        } else if granted {
            info!(identity = %identity, requirement = %requirement, result, "Permission check");
        } else {
            warn!(identity = %identity, requirement = %requirement, result, "Permission check");
        }
    }
}
