//! # pagegate client
//!
//! HTTP implementation of the permission query contract.
//!
//! The backend exposes one endpoint that, given the caller's username in a
//! request header, answers with the caller's roles and per-page grants:
//!
//! ```text
//! GET /dialingtest/api/user-roles/permission?t=1718000000000
//! X-Username: alice
//! Cache-Control: no-cache
//! Pragma: no-cache
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pagegate_client::HttpPermissionFetcher;
//! use pagegate_core::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> pagegate_core::Result<()> {
//! let fetcher = HttpPermissionFetcher::builder("http://localhost:8080")
//!     .accept_roles(["ADMIN", "OPERATOR", "BROWSER", "EXECUTOR"])
//!     .build()?;
//!
//! let identity = Identity::new("alice")?;
//! let snapshot = fetcher.fetch(&identity).await?;
//! println!("roles: {:?}", snapshot.roles);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure mapping
//!
//! - connect errors, timeouts and non-success statuses other than 401/403
//!   are [`FetchError::Transport`]
//! - 401/403, or a `success: false` envelope, are [`FetchError::Denied`]
//! - a non-JSON body, a missing `success` flag, or `success: true` without
//!   `data` are [`FetchError::Malformed`]

#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use pagegate_core::error::{Error, FetchError, Result};
use pagegate_core::types::{Identity, PermissionEnvelope, PermissionSnapshot};
use pagegate_core::PermissionFetcher;
use reqwest::header::{self, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use url::Url;

/// Default path of the permission endpoint.
pub const DEFAULT_PERMISSION_PATH: &str = "/dialingtest/api/user-roles/permission";

/// Default header carrying the identity.
pub const DEFAULT_IDENTITY_HEADER: &str = "X-Username";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const BODY_PREVIEW_LEN: usize = 200;

/// Counters describing fetcher usage.
#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    /// Requests issued
    pub requests: u64,
    /// Snapshots produced
    pub successes: u64,
    /// Explicit denials
    pub denials: u64,
    /// Transport or payload failures
    pub failures: u64,
    /// Time of the most recent request
    pub last_request: Option<chrono::DateTime<Utc>>,
}

/// Fetches permission snapshots over HTTP.
pub struct HttpPermissionFetcher {
    client: Client,
    endpoint: Url,
    identity_header: HeaderName,
    cache_busting: bool,
    accepted_roles: BTreeSet<String>,
    stats: Arc<Mutex<FetchStats>>,
}

impl HttpPermissionFetcher {
    /// Start building a fetcher for the backend at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> HttpPermissionFetcherBuilder {
        HttpPermissionFetcherBuilder::new(base_url)
    }

    /// The resolved permission endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Current usage statistics.
    pub async fn stats(&self) -> FetchStats {
        self.stats.lock().await.clone()
    }

    fn accepts_role(&self, role: &str) -> bool {
        self.accepted_roles.is_empty() || self.accepted_roles.contains(role)
    }

    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if self.cache_busting {
            url.query_pairs_mut()
                .append_pair("t", &Utc::now().timestamp_millis().to_string());
        }
        url
    }

    async fn query(&self, identity: &Identity) -> std::result::Result<PermissionSnapshot, FetchError> {
        let identity_value = HeaderValue::from_str(identity.as_str()).map_err(|e| {
            FetchError::transport(format!("Identity cannot be sent as a header: {e}"))
        })?;

        let url = self.request_url();
        trace!(url = %url, identity = %identity, "Sending permission request");

        let response = self
            .client
            .get(url)
            .header(self.identity_header.clone(), identity_value)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                FetchError::transport(format!("Failed to send permission request: {e}"))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::denied(
                identity,
                Some(format!("permission endpoint returned status: {status}")),
            ));
        }
        if !status.is_success() {
            return Err(FetchError::transport(format!(
                "Permission endpoint returned status: {status}"
            )));
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.contains("application/json"));

        let body = response.text().await.map_err(|e| {
            FetchError::transport(format!("Failed to read permission response: {e}"))
        })?;

        if !is_json {
            let preview: String = body.chars().take(BODY_PREVIEW_LEN).collect();
            return Err(FetchError::malformed(format!(
                "Permission endpoint returned non-JSON data: {preview}"
            )));
        }

        PermissionEnvelope::parse(&body)?.into_snapshot(identity, |role| self.accepts_role(role))
    }
}

#[async_trait]
impl PermissionFetcher for HttpPermissionFetcher {
    async fn fetch(&self, identity: &Identity) -> std::result::Result<PermissionSnapshot, FetchError> {
        let result = self.query(identity).await;

        let mut stats = self.stats.lock().await;
        stats.requests += 1;
        stats.last_request = Some(Utc::now());
        match &result {
            Ok(snapshot) => {
                stats.successes += 1;
                debug!(
                    identity = %identity,
                    roles = snapshot.roles.len(),
                    pages = snapshot.page_grants.len(),
                    "Permission snapshot fetched"
                );
            }
            Err(FetchError::Denied { reason, .. }) => {
                stats.denials += 1;
                debug!(identity = %identity, reason = ?reason, "Permission request denied");
            }
            Err(e) => {
                stats.failures += 1;
                warn!(identity = %identity, kind = e.kind(), error = %e, "Permission request failed");
            }
        }

        result
    }

    fn fetcher_type(&self) -> &'static str {
        "http"
    }
}

/// Builder for [`HttpPermissionFetcher`].
pub struct HttpPermissionFetcherBuilder {
    base_url: String,
    permission_path: String,
    identity_header: String,
    cache_busting: bool,
    timeout: Duration,
    accepted_roles: BTreeSet<String>,
    client: Option<Client>,
}

impl HttpPermissionFetcherBuilder {
    /// Create a builder with default path, header and timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            permission_path: DEFAULT_PERMISSION_PATH.to_string(),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            cache_busting: true,
            timeout: DEFAULT_TIMEOUT,
            accepted_roles: BTreeSet::new(),
            client: None,
        }
    }

    /// Path of the permission endpoint relative to the base URL.
    pub fn permission_path(mut self, path: impl Into<String>) -> Self {
        self.permission_path = path.into();
        self
    }

    /// Header used to send the identity.
    pub fn identity_header(mut self, name: impl Into<String>) -> Self {
        self.identity_header = name.into();
        self
    }

    /// Append a `t=<millis>` query parameter to every request.
    pub fn cache_busting(mut self, enabled: bool) -> Self {
        self.cache_busting = enabled;
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Restrict roles to a closed catalog. An empty catalog accepts all.
    pub fn accept_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Use a preconfigured reqwest client instead of building one.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the fetcher.
    pub fn build(self) -> Result<HttpPermissionFetcher> {
        let base = Url::parse(&self.base_url)?;
        let endpoint = base.join(&self.permission_path)?;

        let identity_header = HeaderName::from_bytes(self.identity_header.as_bytes())
            .map_err(|e| Error::configuration(format!("Invalid identity header: {e}")))?;

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {e}")))?,
        };

        Ok(HttpPermissionFetcher {
            client,
            endpoint,
            identity_header,
            cache_busting: self.cache_busting,
            accepted_roles: self.accepted_roles,
            stats: Arc::new(Mutex::new(FetchStats::default())),
        })
    }
}
