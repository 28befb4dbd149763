//! Access requirements and the well-known page, operation and role names

use pagegate_core::PermissionSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access to a page, optionally narrowed to one operation on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequirement {
    /// Page identifier
    pub page: String,
    /// Operation on the page; `None` checks page access only
    pub operation: Option<String>,
}

impl PageRequirement {
    /// Require access to a page
    pub fn access(page: &str) -> Self {
        Self {
            page: page.to_string(),
            operation: None,
        }
    }

    /// Require an operation on a page
    pub fn operation(page: &str, operation: &str) -> Self {
        Self {
            page: page.to_string(),
            operation: Some(operation.to_string()),
        }
    }

    pub fn is_satisfied_by(&self, snapshot: &PermissionSnapshot) -> bool {
        snapshot.allows(&self.page, self.operation.as_deref())
    }
}

impl fmt::Display for PageRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(operation) => write!(f, "page:{}:{}", self.page, operation),
            None => write!(f, "page:{}", self.page),
        }
    }
}

/// A set of roles, of which any one or all must be held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirement {
    pub roles: Vec<String>,
    pub require_all: bool,
}

impl RoleRequirement {
    /// Satisfied by holding at least one of `roles`
    pub fn any(roles: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|role| role.to_string()).collect(),
            require_all: false,
        }
    }

    /// Satisfied by holding every one of `roles`
    pub fn all(roles: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|role| role.to_string()).collect(),
            require_all: true,
        }
    }

    /// An empty `any` is never satisfied; an empty `all` always is.
    pub fn is_satisfied_by(&self, snapshot: &PermissionSnapshot) -> bool {
        if self.require_all {
            self.roles.iter().all(|role| snapshot.has_role(role))
        } else {
            self.roles.iter().any(|role| snapshot.has_role(role))
        }
    }
}

impl fmt::Display for RoleRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.require_all { "all" } else { "any" };
        write!(f, "roles:{}({})", mode, self.roles.join(","))
    }
}

/// Page identifiers used by the dial-testing console
pub struct Pages;

impl Pages {
    pub const USER_MANAGEMENT: &'static str = "user-management";
    pub const USER_ROLE_MANAGEMENT: &'static str = "user-role-management";
    pub const TEST_CASE_SET_MANAGEMENT: &'static str = "test-case-set-management";
    pub const SOFTWARE_PACKAGE_MANAGEMENT: &'static str = "software-package-management";
    pub const OPERATION_LOG_MANAGEMENT: &'static str = "operation-log-management";
}

/// Page operations
pub struct Operations;

impl Operations {
    pub const CREATE: &'static str = "create";
    pub const EDIT: &'static str = "edit";
    pub const DELETE: &'static str = "delete";
    pub const VIEW: &'static str = "view";
    pub const UPLOAD: &'static str = "upload";
    pub const DOWNLOAD: &'static str = "download";
}

/// Role names of the default catalog
pub struct Roles;

impl Roles {
    pub const ADMIN: &'static str = "ADMIN";
    pub const OPERATOR: &'static str = "OPERATOR";
    pub const BROWSER: &'static str = "BROWSER";
    pub const EXECUTOR: &'static str = "EXECUTOR";
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagegate_core::{Identity, PageGrant, Role};

    fn operator() -> PermissionSnapshot {
        PermissionSnapshot::new(
            Identity::new("alice").unwrap(),
            [Role::from(Roles::OPERATOR), Role::from(Roles::BROWSER)],
            [
                (
                    Pages::TEST_CASE_SET_MANAGEMENT.to_string(),
                    PageGrant::new(true, [Operations::VIEW, Operations::UPLOAD]),
                ),
                (Pages::USER_MANAGEMENT.to_string(), PageGrant::denied()),
            ],
        )
    }

    #[test]
    fn test_page_requirement() {
        let snapshot = operator();

        assert!(PageRequirement::access(Pages::TEST_CASE_SET_MANAGEMENT).is_satisfied_by(&snapshot));
        assert!(
            PageRequirement::operation(Pages::TEST_CASE_SET_MANAGEMENT, Operations::UPLOAD)
                .is_satisfied_by(&snapshot)
        );
        assert!(
            !PageRequirement::operation(Pages::TEST_CASE_SET_MANAGEMENT, Operations::DELETE)
                .is_satisfied_by(&snapshot)
        );
        assert!(!PageRequirement::access(Pages::USER_MANAGEMENT).is_satisfied_by(&snapshot));
        assert!(!PageRequirement::access("unknown-page").is_satisfied_by(&snapshot));
    }

    #[test]
    fn test_role_requirement() {
        let snapshot = operator();

        assert!(RoleRequirement::any(&[Roles::ADMIN, Roles::OPERATOR]).is_satisfied_by(&snapshot));
        assert!(!RoleRequirement::all(&[Roles::ADMIN, Roles::OPERATOR]).is_satisfied_by(&snapshot));
        assert!(RoleRequirement::all(&[Roles::BROWSER, Roles::OPERATOR]).is_satisfied_by(&snapshot));
        assert!(!RoleRequirement::any(&[]).is_satisfied_by(&snapshot));
        assert!(RoleRequirement::all(&[]).is_satisfied_by(&snapshot));

        let nobody = PermissionSnapshot::deny_all(snapshot.identity.clone());
        assert!(RoleRequirement::all(&[]).is_satisfied_by(&nobody));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            PageRequirement::operation(Pages::USER_MANAGEMENT, Operations::EDIT).to_string(),
            "page:user-management:edit"
        );
        assert_eq!(
            RoleRequirement::all(&[Roles::ADMIN, Roles::EXECUTOR]).to_string(),
            "roles:all(ADMIN,EXECUTOR)"
        );
    }
}
