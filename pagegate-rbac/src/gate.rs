//! Composition root: wires resolver, fetcher, cache, monitor and evaluator

use crate::cache::PermissionCache;
use crate::config::GateConfig;
use crate::error::GateError;
use crate::evaluator::PermissionEvaluator;
use crate::monitor::{MonitorHandle, StalenessMonitor};
use crate::signal::InvalidationBus;
use pagegate_client::HttpPermissionFetcher;
use pagegate_core::{
    CarrierIdentityResolver, CookieCarrier, CookieJar, Identity, IdentityResolver,
    PermissionFetcher,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

type GateResult<T> = std::result::Result<T, GateError>;

/// One session's permission subsystem
pub struct PermissionGate {
    config: GateConfig,
    origin: Uuid,
    resolver: Arc<dyn IdentityResolver>,
    cache: PermissionCache,
    evaluator: PermissionEvaluator,
    bus: Option<InvalidationBus>,
}

impl PermissionGate {
    /// Create a new gate builder
    pub fn builder() -> PermissionGateBuilder {
        PermissionGateBuilder::new()
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn resolver(&self) -> Arc<dyn IdentityResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Origin stamped on signals published by this gate
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn invalidation_bus(&self) -> Option<&InvalidationBus> {
        self.bus.as_ref()
    }

    /// Start the staleness monitor; `None` if disabled in the configuration.
    pub fn start_monitor(&self) -> Option<MonitorHandle> {
        if !self.config.monitor.enabled {
            debug!("Staleness monitor disabled");
            return None;
        }

        let mut monitor = StalenessMonitor::new(
            self.cache.clone(),
            Arc::clone(&self.resolver),
            self.config.monitor.poll_interval(),
        );
        if self.config.monitor.listen_for_signals
            && let Some(bus) = &self.bus
        {
            monitor = monitor.with_signals(bus.clone(), self.origin);
        }

        Some(monitor.spawn())
    }
}

/// Builder for [`PermissionGate`]
pub struct PermissionGateBuilder {
    config: GateConfig,
    fetcher: Option<Arc<dyn PermissionFetcher>>,
    resolver: Option<Arc<dyn IdentityResolver>>,
    cookie_jar: Option<CookieJar>,
    bus: Option<InvalidationBus>,
}

impl PermissionGateBuilder {
    pub fn new() -> Self {
        Self {
            config: GateConfig::default(),
            fetcher: None,
            resolver: None,
            cookie_jar: None,
            bus: None,
        }
    }

    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    /// Backend origin for the HTTP fetcher
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.endpoint.base_url = Some(base_url.into());
        self
    }

    /// Use a custom fetcher instead of the HTTP backend
    pub fn with_fetcher<F>(mut self, fetcher: F) -> Self
    where
        F: PermissionFetcher + 'static,
    {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Use a custom resolver instead of the identity cookie
    pub fn with_resolver<R>(mut self, resolver: R) -> Self
    where
        R: IdentityResolver + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Cookie jar holding the identity cookie
    pub fn with_cookie_jar(mut self, jar: CookieJar) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Share invalidation signals with other gates on `bus`
    pub fn with_invalidation_bus(mut self, bus: InvalidationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Enable audit logging
    pub fn with_audit_logging(mut self, enabled: bool) -> Self {
        self.config.audit_decisions = enabled;
        self
    }

    /// Build the gate
    pub fn build(self) -> GateResult<PermissionGate> {
        let config = self.config;
        config.validate()?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Self::http_fetcher(&config)?,
        };

        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => {
                let jar = self.cookie_jar.unwrap_or_default();
                let carrier = CookieCarrier::new(jar, config.identity.cookie_name.as_str())
                    .with_max_age_days(config.identity.cookie_max_age_days);
                let default_identity = Identity::new(config.identity.default_identity.as_str())?;
                Arc::new(
                    CarrierIdentityResolver::new(carrier, default_identity)
                        .with_seed_missing(config.identity.seed_missing),
                ) as Arc<dyn IdentityResolver>
            }
        };

        let origin = Uuid::new_v4();
        let cache = match &self.bus {
            Some(bus) => PermissionCache::with_notifier(fetcher.clone(), &config.cache, bus.clone(), origin),
            None => PermissionCache::new(fetcher.clone(), &config.cache),
        };

        let evaluator = PermissionEvaluator::new(cache.clone(), Arc::clone(&resolver))
            .with_audit_logging(config.audit_decisions);

        info!(
            origin = %origin,
            fetcher = fetcher.fetcher_type(),
            ttl = ?config.cache.ttl(),
            signals = self.bus.is_some(),
            "Permission gate ready"
        );

        Ok(PermissionGate {
            config,
            origin,
            resolver,
            cache,
            evaluator,
            bus: self.bus,
        })
    }

    fn http_fetcher(config: &GateConfig) -> GateResult<Arc<dyn PermissionFetcher>> {
        let Some(base_url) = &config.endpoint.base_url else {
            return Err(GateError::Configuration(
                "No permission fetcher supplied and no backend base_url configured".to_string(),
            ));
        };

        let fetcher = HttpPermissionFetcher::builder(base_url.as_str())
            .permission_path(config.endpoint.permission_path.as_str())
            .identity_header(config.identity.header_name.as_str())
            .cache_busting(config.endpoint.cache_busting)
            .timeout(config.cache.fetch_timeout())
            .accept_roles(config.role_names())
            .build()?;

        Ok(Arc::new(fetcher))
    }
}

impl Default for PermissionGateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pagegate_core::{FetchError, FixedIdentity, PermissionSnapshot, Role};

    struct AdminBackend;

    #[async_trait]
    impl PermissionFetcher for AdminBackend {
        async fn fetch(&self, identity: &Identity) -> Result<PermissionSnapshot, FetchError> {
            Ok(PermissionSnapshot::new(
                identity.clone(),
                [Role::from("ADMIN")],
                std::iter::empty(),
            ))
        }

        fn fetcher_type(&self) -> &'static str {
            "admin"
        }
    }

    #[tokio::test]
    async fn test_build_seeds_identity_cookie() {
        let jar = CookieJar::new();
        let gate = PermissionGate::builder()
            .with_fetcher(AdminBackend)
            .with_cookie_jar(jar.clone())
            .build()
            .unwrap();

        assert!(gate.evaluator().has_role("ADMIN").await);
        assert_eq!(jar.get("xUsername").as_deref(), Some("admin"));
        assert_eq!(gate.evaluator().username().as_str(), "admin");
    }

    #[test]
    fn test_build_without_backend_fails() {
        let err = PermissionGate::builder().build().err().unwrap();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = GateConfig::default();
        config.cache.ttl_seconds = 0;
        let result = PermissionGate::builder()
            .with_config(config)
            .with_fetcher(AdminBackend)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_http_backend() {
        let gate = PermissionGate::builder()
            .with_base_url("http://localhost:8080")
            .with_resolver(FixedIdentity(Identity::new("alice").unwrap()))
            .build()
            .unwrap();
        assert_eq!(gate.evaluator().username().as_str(), "alice");
    }

    #[tokio::test]
    async fn test_monitor_respects_config() {
        let mut config = GateConfig::default();
        config.monitor.enabled = false;
        let gate = PermissionGate::builder()
            .with_config(config)
            .with_fetcher(AdminBackend)
            .build()
            .unwrap();
        assert!(gate.start_monitor().is_none());

        let gate = PermissionGate::builder()
            .with_fetcher(AdminBackend)
            .with_invalidation_bus(InvalidationBus::new())
            .build()
            .unwrap();
        let handle = gate.start_monitor().unwrap();
        handle.shutdown().await;
    }
}
