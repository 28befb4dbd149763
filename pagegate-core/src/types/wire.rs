//! JSON payload returned by the permission query.
//!
//! ```json
//! {
//!   "success": true,
//!   "message": "ok",
//!   "data": {
//!     "username": "alice",
//!     "roles": ["OPERATOR"],
//!     "pagePermissions": {
//!       "user-role-management": { "hasAccess": true, "operations": ["edit"] }
//!     }
//!   }
//! }
//! ```

use super::{Identity, PageGrant, PermissionSnapshot, Role};
use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Response envelope shared by the backend's API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEnvelope {
    /// Success indicator; a payload without it is malformed
    pub success: bool,
    /// Permission data, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PermissionData>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Backend error code, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Roles and page grants for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionData {
    /// Username the backend resolved
    #[serde(default)]
    pub username: String,
    /// Role names
    pub roles: Vec<String>,
    /// Per-page grants; absent or null means no pages
    #[serde(default)]
    pub page_permissions: Option<BTreeMap<String, WirePageGrant>>,
}

/// Wire form of a [`PageGrant`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePageGrant {
    /// Page access flag
    #[serde(default)]
    pub has_access: bool,
    /// Allowed operations
    #[serde(default)]
    pub operations: Vec<String>,
}

impl From<WirePageGrant> for PageGrant {
    fn from(grant: WirePageGrant) -> Self {
        PageGrant::new(grant.has_access, grant.operations)
    }
}

impl PermissionEnvelope {
    /// Parse a response body, mapping any decode failure to `Malformed`.
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        serde_json::from_str(body)
            .map_err(|e| FetchError::malformed(format!("invalid permission payload: {e}")))
    }

    /// Build an envelope for a successful answer.
    pub fn success(data: PermissionData) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error_code: None,
        }
    }

    /// Convert the envelope into a snapshot for `identity`.
    ///
    /// `accept_role` decides which role names are kept; the rest are dropped
    /// with a warning. A `success: false` envelope is an explicit denial.
    pub fn into_snapshot<F>(
        self,
        identity: &Identity,
        accept_role: F,
    ) -> Result<PermissionSnapshot, FetchError>
    where
        F: Fn(&str) -> bool,
    {
        if !self.success {
            return Err(FetchError::denied(identity, self.message));
        }

        let data = self
            .data
            .ok_or_else(|| FetchError::malformed("success payload without data"))?;

        if !data.username.is_empty() && data.username != identity.as_str() {
            warn!(
                requested = %identity,
                reported = %data.username,
                "Permission payload reports a different username"
            );
        }

        let roles = data.roles.into_iter().filter_map(|name| {
            if accept_role(&name) {
                Some(Role::from(name))
            } else {
                warn!(identity = %identity, role = %name, "Dropping role outside the catalog");
                None
            }
        });

        let grants = data
            .page_permissions
            .unwrap_or_default()
            .into_iter()
            .map(|(page, grant)| (page, PageGrant::from(grant)));

        Ok(PermissionSnapshot::new(identity.clone(), roles, grants))
    }
}
