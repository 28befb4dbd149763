//! Configuration types for pagegate

use pagegate_client::{DEFAULT_IDENTITY_HEADER, DEFAULT_PERMISSION_PATH};
use pagegate_core::identity::{DEFAULT_COOKIE_NAME, DEFAULT_IDENTITY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::error::GateError;

/// Gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Identity resolution settings
    pub identity: IdentityConfig,
    /// Cache settings
    pub cache: CacheConfig,
    /// Staleness monitor settings
    pub monitor: MonitorConfig,
    /// Permission backend settings
    pub endpoint: EndpointConfig,
    /// Closed role catalog; empty accepts any role
    pub roles: Vec<RoleConfig>,
    /// Log every permission decision
    pub audit_decisions: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
            endpoint: EndpointConfig::default(),
            roles: RoleConfig::defaults(),
            audit_decisions: false,
        }
    }
}

/// Where the caller's identity comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Cookie carrying the username
    pub cookie_name: String,
    /// Header carrying the username
    pub header_name: String,
    /// Identity used when the carrier is empty
    pub default_identity: String,
    /// Write the default back into a missing carrier
    pub seed_missing: bool,
    /// Lifetime of a seeded cookie, in days
    pub cookie_max_age_days: i64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            header_name: DEFAULT_IDENTITY_HEADER.to_string(),
            default_identity: DEFAULT_IDENTITY.to_string(),
            seed_missing: true,
            cookie_max_age_days: 30,
        }
    }
}

/// Permission cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot TTL in seconds
    pub ttl_seconds: u64,
    /// Fetches slower than this count as transport failures
    pub fetch_timeout_ms: u64,
    /// How long a stale fallback is served before the next retry
    pub stale_retry_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300, // 5 minutes
            fetch_timeout_ms: 10_000,
            stale_retry_seconds: 30,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn stale_retry(&self) -> Duration {
        Duration::from_secs(self.stale_retry_seconds)
    }
}

/// Staleness monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Run the background monitor at all
    pub enabled: bool,
    /// Identity polling interval in seconds
    pub poll_interval_seconds: u64,
    /// React to cross-process invalidation signals
    pub listen_for_signals: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 30,
            listen_for_signals: true,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

/// Permission backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Backend origin, e.g. `http://localhost:8080`
    pub base_url: Option<String>,
    /// Path of the permission query
    pub permission_path: String,
    /// Append a timestamp parameter to defeat intermediate caches
    pub cache_busting: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            permission_path: DEFAULT_PERMISSION_PATH.to_string(),
            cache_busting: true,
        }
    }
}

/// Role catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Role name as reported by the backend
    pub name: String,
    /// Role description
    pub description: Option<String>,
}

impl RoleConfig {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
        }
    }

    /// The four roles of the dial-testing console.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("ADMIN", "Full access"),
            Self::new("OPERATOR", "All dial-test task operations"),
            Self::new("BROWSER", "Read only"),
            Self::new("EXECUTOR", "Execution host registration"),
        ]
    }
}

impl GateConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> std::result::Result<Self, GateError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GateError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: GateConfig = serde_json::from_str(&content).map_err(|e| {
            GateError::Configuration(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file(&self, path: &str) -> std::result::Result<(), GateError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            GateError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content).map_err(|e| {
            GateError::Configuration(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Short TTLs and a local backend for development
    pub fn development() -> Self {
        Self {
            identity: IdentityConfig::default(),
            cache: CacheConfig {
                ttl_seconds: 30,
                fetch_timeout_ms: 2_000,
                stale_retry_seconds: 5,
            },
            monitor: MonitorConfig {
                enabled: true,
                poll_interval_seconds: 5,
                listen_for_signals: true,
            },
            endpoint: EndpointConfig {
                base_url: Some("http://localhost:8080".to_string()),
                ..EndpointConfig::default()
            },
            roles: RoleConfig::defaults(),
            audit_decisions: true,
        }
    }

    /// Production configuration template
    pub fn production_template() -> Self {
        Self {
            identity: IdentityConfig {
                seed_missing: false,
                ..IdentityConfig::default()
            },
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
            endpoint: EndpointConfig {
                base_url: Some("https://permissions.example.com".to_string()),
                ..EndpointConfig::default()
            },
            roles: RoleConfig::defaults(),
            audit_decisions: false,
        }
    }

    /// Names of the catalog roles
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.name.clone()).collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), GateError> {
        if self.identity.default_identity.trim().is_empty() {
            return Err(GateError::Configuration(
                "Default identity must not be empty".to_string(),
            ));
        }

        if self.identity.cookie_name.trim().is_empty() {
            return Err(GateError::Configuration(
                "Identity cookie name must not be empty".to_string(),
            ));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(GateError::Configuration(
                "Cache TTL must be positive".to_string(),
            ));
        }

        if self.cache.fetch_timeout_ms == 0 {
            return Err(GateError::Configuration(
                "Fetch timeout must be positive".to_string(),
            ));
        }

        if self.monitor.enabled && self.monitor.poll_interval_seconds == 0 {
            return Err(GateError::Configuration(
                "Monitor poll interval must be positive".to_string(),
            ));
        }

        if let Some(base_url) = &self.endpoint.base_url {
            url::Url::parse(base_url).map_err(|e| {
                GateError::Configuration(format!("Invalid backend URL '{}': {}", base_url, e))
            })?;
        }

        // Check for duplicate role names
        let mut role_names = HashSet::new();
        for role in &self.roles {
            if role.name.trim().is_empty() {
                return Err(GateError::Configuration(
                    "Role names must not be empty".to_string(),
                ));
            }
            if !role_names.insert(&role.name) {
                return Err(GateError::Configuration(format!(
                    "Duplicate role name: {}",
                    role.name
                )));
            }
        }

        Ok(())
    }
}
