//! Data model for permission resolution.
//!
//! A [`PermissionSnapshot`] is the unit of caching: the complete, immutable
//! result of one authoritative permission query for one [`Identity`].
//! Snapshots are shared behind `Arc` and are never patched; a new fetch
//! always produces a new snapshot.

pub mod wire;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub use wire::{PermissionData, PermissionEnvelope, WirePageGrant};

/// Opaque, non-empty token naming the caller (usually a username).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity, rejecting empty or whitespace-only tokens.
    ///
    /// ```rust
    /// use pagegate_core::types::Identity;
    ///
    /// assert!(Identity::new("alice").is_ok());
    /// assert!(Identity::new("   ").is_err());
    /// ```
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_identity("identity token is empty"));
        }
        if trimmed.len() == token.len() {
            Ok(Self(token))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Coarse-grained group membership (e.g. `ADMIN`, `OPERATOR`).
///
/// The set of valid roles is configuration, so this is a thin wrapper over
/// the backend's role name rather than a closed Rust enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Create a role from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the role name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fine-grained access to a single page or resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGrant {
    /// Whether the page may be opened at all
    pub has_access: bool,
    /// Operation names allowed on the page (`create`, `edit`, ...)
    pub operations: BTreeSet<String>,
}

impl PageGrant {
    /// Create a grant from an access flag and a list of operations.
    pub fn new<I, S>(has_access: bool, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            has_access,
            operations: operations.into_iter().map(Into::into).collect(),
        }
    }

    /// A grant that allows nothing.
    pub fn denied() -> Self {
        Self::default()
    }

    /// Whether `operation` is in the allowed set.
    pub fn allows(&self, operation: &str) -> bool {
        self.operations.contains(operation)
    }
}

/// Immutable result of one authoritative permission query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    /// Identity the query was issued for
    pub identity: Identity,
    /// Roles held by the identity
    pub roles: BTreeSet<Role>,
    /// Per-page grants; pages the backend does not know are omitted
    pub page_grants: BTreeMap<String, PageGrant>,
    /// Wall-clock time the snapshot was produced
    pub fetched_at: DateTime<Utc>,
}

impl PermissionSnapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(
        identity: Identity,
        roles: impl IntoIterator<Item = Role>,
        page_grants: impl IntoIterator<Item = (String, PageGrant)>,
    ) -> Self {
        Self {
            identity,
            roles: roles.into_iter().collect(),
            page_grants: page_grants.into_iter().collect(),
            fetched_at: Utc::now(),
        }
    }

    /// Fail-closed snapshot: no roles, no page access.
    ///
    /// Omitted pages are treated as denied, so an empty grant map denies
    /// every page.
    pub fn deny_all(identity: Identity) -> Self {
        Self::new(identity, std::iter::empty(), std::iter::empty())
    }

    /// Whether this snapshot grants nothing at all.
    pub fn is_deny_all(&self) -> bool {
        self.roles.is_empty()
            && self
                .page_grants
                .values()
                .all(|grant| !grant.has_access && grant.operations.is_empty())
    }

    /// Whether the identity holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held.as_str() == role)
    }

    /// Grant for `page_id`, if the backend reported one.
    pub fn grant(&self, page_id: &str) -> Option<&PageGrant> {
        self.page_grants.get(page_id)
    }

    /// Page-level check.
    ///
    /// Without an operation this is the page's `has_access` flag. With an
    /// operation it is membership of the operation set, independent of
    /// `has_access`. Unknown pages always answer `false`.
    pub fn allows(&self, page_id: &str, operation: Option<&str>) -> bool {
        match (self.grant(page_id), operation) {
            (None, _) => false,
            (Some(grant), None) => grant.has_access,
            (Some(grant), Some(operation)) => grant.allows(operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator_snapshot() -> PermissionSnapshot {
        PermissionSnapshot::new(
            Identity::new("alice").unwrap(),
            [Role::from("OPERATOR")],
            [(
                "user-role-management".to_string(),
                PageGrant::new(true, ["edit"]),
            )],
        )
    }

    #[test]
    fn test_identity_validation() {
        assert_eq!(Identity::new(" bob ").unwrap().as_str(), "bob");
        assert!(Identity::new("").is_err());
        assert!("carol".parse::<Identity>().is_ok());
    }

    #[test]
    fn test_snapshot_page_checks() {
        let snapshot = operator_snapshot();

        assert!(snapshot.allows("user-role-management", None));
        assert!(snapshot.allows("user-role-management", Some("edit")));
        assert!(!snapshot.allows("user-role-management", Some("delete")));
        assert!(!snapshot.allows("operation-log-management", None));
        assert!(!snapshot.allows("operation-log-management", Some("view")));
    }

    #[test]
    fn test_operation_check_ignores_access_flag() {
        let snapshot = PermissionSnapshot::new(
            Identity::new("dave").unwrap(),
            [],
            [("reports".to_string(), PageGrant::new(false, ["export"]))],
        );

        assert!(!snapshot.allows("reports", None));
        assert!(snapshot.allows("reports", Some("export")));
    }

    #[test]
    fn test_deny_all() {
        let snapshot = PermissionSnapshot::deny_all(Identity::new("eve").unwrap());
        assert!(snapshot.is_deny_all());
        assert!(!snapshot.has_role("ADMIN"));
        assert!(!operator_snapshot().is_deny_all());
    }
}
