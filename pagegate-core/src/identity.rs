//! Identity resolution for permission checks.
//!
//! Identity arrives through an opaque *carrier* (a cookie, a request header,
//! a session token). An [`IdentityResolver`] turns whatever the carrier holds
//! into an [`Identity`], substituting a configured default when the carrier
//! is empty. Resolution never fails.

use crate::types::Identity;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default cookie carrying the username.
pub const DEFAULT_COOKIE_NAME: &str = "xUsername";

/// Default request header carrying the username.
pub const DEFAULT_HEADER_NAME: &str = "X-Username";

/// Identity used when the carrier holds nothing.
pub const DEFAULT_IDENTITY: &str = "admin";

/// Something that can carry an identity token.
pub trait IdentityCarrier: Send + Sync {
    /// Read the raw token, if present.
    fn read(&self) -> Option<String>;

    /// Store a token so later readers observe it.
    fn write(&self, value: &str);

    /// Short label for logs.
    fn carrier_type(&self) -> &'static str;
}

/// Resolves the caller's identity. Never fails.
pub trait IdentityResolver: Send + Sync {
    /// Resolve the current identity.
    fn resolve(&self) -> Identity;
}

impl<T: IdentityResolver + ?Sized> IdentityResolver for Arc<T> {
    fn resolve(&self) -> Identity {
        (**self).resolve()
    }
}

/// Resolver that always answers the same identity.
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub Identity);

impl IdentityResolver for FixedIdentity {
    fn resolve(&self) -> Identity {
        self.0.clone()
    }
}

/// Resolver backed by an [`IdentityCarrier`] with a default fallback.
pub struct CarrierIdentityResolver<C> {
    carrier: C,
    default_identity: Identity,
    seed_missing: bool,
}

impl<C: IdentityCarrier> CarrierIdentityResolver<C> {
    /// Create a resolver that seeds a missing carrier with `default_identity`.
    pub fn new(carrier: C, default_identity: Identity) -> Self {
        Self {
            carrier,
            default_identity,
            seed_missing: true,
        }
    }

    /// Whether a missing carrier value is written back with the default.
    pub fn with_seed_missing(mut self, seed_missing: bool) -> Self {
        self.seed_missing = seed_missing;
        self
    }

    /// The underlying carrier.
    pub fn carrier(&self) -> &C {
        &self.carrier
    }

    /// The identity substituted when the carrier is empty.
    pub fn default_identity(&self) -> &Identity {
        &self.default_identity
    }
}

impl<C: IdentityCarrier> IdentityResolver for CarrierIdentityResolver<C> {
    fn resolve(&self) -> Identity {
        match self.carrier.read() {
            Some(raw) => match Identity::new(raw) {
                Ok(identity) => identity,
                Err(_) => {
                    trace!(carrier = self.carrier.carrier_type(), "Empty identity, using default");
                    self.default_identity.clone()
                }
            },
            None => {
                if self.seed_missing {
                    debug!(
                        carrier = self.carrier.carrier_type(),
                        identity = %self.default_identity,
                        "Seeding missing identity carrier with default"
                    );
                    self.carrier.write(self.default_identity.as_str());
                }
                self.default_identity.clone()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// Shared, in-process cookie store.
///
/// Clones share the same cookies, so a change made through one handle is
/// visible to every resolver reading through another.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Arc<RwLock<BTreeMap<String, StoredCookie>>>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` header (`a=1; xUsername=alice`).
    ///
    /// Values are percent-decoded; pairs without `=` are ignored.
    pub fn from_header(header: &str) -> Self {
        let jar = Self::new();
        {
            let mut cookies = jar.cookies.write();
            for pair in header.split(';') {
                let Some((name, value)) = pair.trim().split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let value = urlencoding::decode(value.trim())
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| value.trim().to_string());
                cookies.insert(
                    name.to_string(),
                    StoredCookie {
                        value,
                        expires_at: None,
                    },
                );
            }
        }
        jar
    }

    /// Read a live cookie.
    pub fn get(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies
            .read()
            .get(name)
            .filter(|cookie| cookie.is_live(now))
            .map(|cookie| cookie.value.clone())
    }

    /// Set a cookie, optionally expiring after `max_age`.
    pub fn set(&self, name: &str, value: &str, max_age: Option<Duration>) {
        let expires_at = max_age.map(|age| Utc::now() + age);
        self.cookies.write().insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    /// Remove a cookie.
    pub fn remove(&self, name: &str) {
        self.cookies.write().remove(name);
    }

    /// Whether a live cookie named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Render the live cookies as a `Cookie` header value.
    pub fn to_header(&self) -> String {
        let now = Utc::now();
        self.cookies
            .read()
            .iter()
            .filter(|(_, cookie)| cookie.is_live(now))
            .map(|(name, cookie)| format!("{}={}", name, urlencoding::encode(&cookie.value)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Identity carried in a named cookie.
#[derive(Debug, Clone)]
pub struct CookieCarrier {
    jar: CookieJar,
    name: String,
    max_age: Option<Duration>,
}

impl CookieCarrier {
    /// Carrier reading `name` from `jar`; writes expire after 30 days.
    pub fn new(jar: CookieJar, name: impl Into<String>) -> Self {
        Self {
            jar,
            name: name.into(),
            max_age: Some(Duration::days(30)),
        }
    }

    /// Lifetime of cookies written through this carrier.
    pub fn with_max_age_days(mut self, days: i64) -> Self {
        self.max_age = if days > 0 {
            Some(Duration::days(days))
        } else {
            None
        };
        self
    }

    /// Cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared jar.
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Clear the identity cookie.
    pub fn clear(&self) {
        self.jar.remove(&self.name);
    }
}

impl IdentityCarrier for CookieCarrier {
    fn read(&self) -> Option<String> {
        self.jar.get(&self.name)
    }

    fn write(&self, value: &str) {
        self.jar.set(&self.name, value, self.max_age);
    }

    fn carrier_type(&self) -> &'static str {
        "cookie"
    }
}

/// Identity carried in a request header.
///
/// Header names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct HeaderCarrier {
    headers: Arc<RwLock<BTreeMap<String, String>>>,
    name: String,
}

impl HeaderCarrier {
    /// Carrier reading header `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            headers: Arc::default(),
            name: name.into().to_ascii_lowercase(),
        }
    }

    /// Build from request header pairs.
    pub fn from_pairs<'a, I>(name: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let carrier = Self::new(name);
        {
            let mut headers = carrier.headers.write();
            for (key, value) in pairs {
                headers.insert(key.to_ascii_lowercase(), value.to_string());
            }
        }
        carrier
    }
}

impl IdentityCarrier for HeaderCarrier {
    fn read(&self) -> Option<String> {
        self.headers.read().get(&self.name).cloned()
    }

    fn write(&self, value: &str) {
        self.headers
            .write()
            .insert(self.name.clone(), value.to_string());
    }

    fn carrier_type(&self) -> &'static str {
        "header"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_identity() -> Identity {
        Identity::new(DEFAULT_IDENTITY).unwrap()
    }

    #[test]
    fn test_cookie_header_parsing() {
        let jar = CookieJar::from_header("theme=dark; xUsername=li%20lei; broken");
        assert_eq!(jar.get("xUsername").as_deref(), Some("li lei"));
        assert_eq!(jar.get("theme").as_deref(), Some("dark"));
        assert!(!jar.contains("broken"));
        assert!(jar.to_header().contains("xUsername=li%20lei"));
    }

    #[test]
    fn test_missing_cookie_is_seeded() {
        let jar = CookieJar::new();
        let resolver = CarrierIdentityResolver::new(
            CookieCarrier::new(jar.clone(), DEFAULT_COOKIE_NAME),
            default_identity(),
        );

        assert_eq!(resolver.resolve().as_str(), "admin");
        assert_eq!(jar.get(DEFAULT_COOKIE_NAME).as_deref(), Some("admin"));
    }

    #[test]
    fn test_seeding_can_be_disabled() {
        let jar = CookieJar::new();
        let resolver = CarrierIdentityResolver::new(
            CookieCarrier::new(jar.clone(), DEFAULT_COOKIE_NAME),
            default_identity(),
        )
        .with_seed_missing(false);

        assert_eq!(resolver.resolve().as_str(), "admin");
        assert!(!jar.contains(DEFAULT_COOKIE_NAME));
    }

    #[test]
    fn test_empty_cookie_uses_default_without_overwrite() {
        let jar = CookieJar::from_header("xUsername=");
        let resolver = CarrierIdentityResolver::new(
            CookieCarrier::new(jar.clone(), DEFAULT_COOKIE_NAME),
            default_identity(),
        );

        assert_eq!(resolver.resolve().as_str(), "admin");
        assert_eq!(jar.get(DEFAULT_COOKIE_NAME).as_deref(), Some(""));
    }

    #[test]
    fn test_identity_change_is_observed() {
        let jar = CookieJar::from_header("xUsername=alice");
        let carrier = CookieCarrier::new(jar.clone(), DEFAULT_COOKIE_NAME);
        let resolver = CarrierIdentityResolver::new(carrier.clone(), default_identity());

        assert_eq!(resolver.resolve().as_str(), "alice");
        carrier.write("bob");
        assert_eq!(resolver.resolve().as_str(), "bob");
        carrier.clear();
        assert_eq!(resolver.resolve().as_str(), "admin");
    }

    #[test]
    fn test_expired_cookie_is_absent() {
        let jar = CookieJar::new();
        jar.set("xUsername", "alice", Some(Duration::seconds(-1)));
        assert!(!jar.contains("xUsername"));
    }

    #[test]
    fn test_header_carrier_is_case_insensitive() {
        let carrier = HeaderCarrier::from_pairs(DEFAULT_HEADER_NAME, [("x-username", "carol")]);
        let resolver = CarrierIdentityResolver::new(carrier, default_identity());
        assert_eq!(resolver.resolve().as_str(), "carol");
    }
}
