//! Behavioral tests for the permission cache and evaluator
//!
//! Expiry is measured on the tokio clock, so TTL tests run with paused time.
//! Coalescing tests run on real time with a slow backend.

use async_trait::async_trait;
use futures::future::join_all;
use pagegate::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Operator,
    Denied,
    Down,
}

struct MockBackend {
    calls: AtomicUsize,
    mode: Mutex<Mode>,
    delay: Duration,
}

impl MockBackend {
    fn new(mode: Mode) -> Arc<Self> {
        Self::slow(mode, Duration::ZERO)
    }

    fn slow(mode: Mode, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            mode: Mutex::new(mode),
            delay,
        })
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionFetcher for MockBackend {
    async fn fetch(&self, identity: &Identity) -> std::result::Result<PermissionSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Operator => Ok(PermissionSnapshot::new(
                identity.clone(),
                [Role::from(Roles::OPERATOR)],
                [(
                    Pages::USER_ROLE_MANAGEMENT.to_string(),
                    PageGrant::new(true, [Operations::EDIT]),
                )],
            )),
            Mode::Denied => Err(FetchError::denied(identity, Some("no such user".into()))),
            Mode::Down => Err(FetchError::transport("connection refused")),
        }
    }
}

fn identity(name: &str) -> Identity {
    Identity::new(name).unwrap()
}

fn cookie_evaluator(backend: Arc<MockBackend>, user: &str) -> (PermissionEvaluator, CookieJar) {
    let jar = CookieJar::new();
    jar.set("xUsername", user, None);
    let resolver = CarrierIdentityResolver::new(
        CookieCarrier::new(jar.clone(), "xUsername"),
        identity("admin"),
    );
    let cache = PermissionCache::new(backend, &CacheConfig::default());
    (PermissionEvaluator::new(cache, Arc::new(resolver)), jar)
}

#[tokio::test]
async fn test_never_fetched_identity_is_denied_everything() {
    let backend = MockBackend::new(Mode::Down);
    let (evaluator, _jar) = cookie_evaluator(backend.clone(), "carol");

    for role in [Roles::ADMIN, Roles::OPERATOR, Roles::BROWSER, Roles::EXECUTOR] {
        assert!(!evaluator.has_role(role).await);
    }
    assert!(!evaluator.has_page_permission(Pages::USER_ROLE_MANAGEMENT, None).await);
    assert!(
        !evaluator
            .has_page_permission(Pages::USER_ROLE_MANAGEMENT, Some(Operations::EDIT))
            .await
    );

    // Deny-all is never cached, so every check retried the backend
    assert_eq!(backend.calls(), 6);
    assert_eq!(evaluator.cache().stats().deny_all_served, 6);
}

#[tokio::test(start_paused = true)]
async fn test_ttl_boundary() {
    let backend = MockBackend::new(Mode::Operator);
    let cache = PermissionCache::new(backend.clone(), &CacheConfig::default());
    let alice = identity("alice");

    let first = cache.get(&alice).await;

    tokio::time::advance(Duration::from_secs(299)).await;
    let cached = cache.get(&alice).await;
    assert!(Arc::ptr_eq(&first, &cached));
    assert_eq!(backend.calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let refetched = cache.get(&alice).await;
    assert!(!Arc::ptr_eq(&first, &refetched));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_identity_change_refetches_and_discards_old_grants() {
    let backend = MockBackend::new(Mode::Operator);
    let (evaluator, jar) = cookie_evaluator(backend.clone(), "alice");

    assert!(evaluator.has_role(Roles::OPERATOR).await);

    tokio::time::advance(Duration::from_secs(120)).await;
    jar.set("xUsername", "bob", None);
    backend.set_mode(Mode::Denied);

    // bob must never see alice's grants
    assert!(!evaluator.has_role(Roles::OPERATOR).await);
    assert!(!evaluator.has_page_permission(Pages::USER_ROLE_MANAGEMENT, None).await);
    assert_eq!(backend.calls(), 2);

    let snapshot = evaluator.current_snapshot().unwrap();
    assert_eq!(snapshot.identity, identity("bob"));
    assert!(evaluator.cache().peek(&identity("alice")).is_none());
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let backend = MockBackend::slow(Mode::Operator, Duration::from_millis(100));
    let cache = PermissionCache::new(backend.clone(), &CacheConfig::default());
    let alice = identity("alice");

    let results = join_all((0..16).map(|_| cache.get(&alice))).await;

    assert_eq!(backend.calls(), 1);
    assert!(results.iter().all(|snapshot| Arc::ptr_eq(snapshot, &results[0])));

    let stats = cache.stats();
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.coalesced, 15);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fallback() {
    let backend = MockBackend::slow(Mode::Down, Duration::from_millis(50));
    let cache = PermissionCache::new(backend.clone(), &CacheConfig::default());
    let carol = identity("carol");

    let results = join_all((0..8).map(|_| cache.get(&carol))).await;

    assert_eq!(backend.calls(), 1);
    assert!(results.iter().all(|snapshot| snapshot.is_deny_all()));
    assert!(results.iter().all(|snapshot| Arc::ptr_eq(snapshot, &results[0])));
}

#[tokio::test]
async fn test_concurrent_evaluator_checks_share_one_fetch() {
    let backend = MockBackend::slow(Mode::Operator, Duration::from_millis(100));
    let (evaluator, _jar) = cookie_evaluator(backend.clone(), "alice");

    let (is_operator, is_admin, can_edit) = tokio::join!(
        evaluator.has_role(Roles::OPERATOR),
        evaluator.has_role(Roles::ADMIN),
        evaluator.has_page_permission(Pages::USER_ROLE_MANAGEMENT, Some(Operations::EDIT)),
    );

    assert!(is_operator);
    assert!(!is_admin);
    assert!(can_edit);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_denied_is_cached_for_full_ttl() {
    let backend = MockBackend::new(Mode::Denied);
    let (evaluator, _jar) = cookie_evaluator(backend.clone(), "mallory");

    for _ in 0..5 {
        assert!(!evaluator.has_role(Roles::BROWSER).await);
        tokio::time::advance(Duration::from_secs(59)).await;
    }
    assert_eq!(backend.calls(), 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!evaluator.has_role(Roles::BROWSER).await);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_serves_prior_snapshot() {
    let backend = MockBackend::new(Mode::Operator);
    let (evaluator, _jar) = cookie_evaluator(backend.clone(), "alice");

    assert!(evaluator.has_role(Roles::OPERATOR).await);

    tokio::time::advance(Duration::from_secs(301)).await;
    backend.set_mode(Mode::Down);

    assert!(evaluator.has_role(Roles::OPERATOR).await);
    assert!(
        evaluator
            .has_page_permission(Pages::USER_ROLE_MANAGEMENT, Some(Operations::EDIT))
            .await
    );
    assert_eq!(backend.calls(), 2);
    assert!(evaluator.cache().is_stale());

    // The backend comes back; the stale entry is retried before the TTL
    backend.set_mode(Mode::Operator);
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(evaluator.has_role(Roles::OPERATOR).await);
    assert_eq!(backend.calls(), 3);
    assert!(!evaluator.cache().is_stale());
}

#[tokio::test(start_paused = true)]
async fn test_prior_snapshot_survives_refresh() {
    let backend = MockBackend::new(Mode::Operator);
    let (evaluator, _jar) = cookie_evaluator(backend.clone(), "alice");

    assert!(evaluator.has_role(Roles::OPERATOR).await);

    backend.set_mode(Mode::Down);
    let snapshot = evaluator.refresh().await;
    assert!(snapshot.has_role(Roles::OPERATOR));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_times_out_as_transport_failure() {
    let backend = MockBackend::slow(Mode::Operator, Duration::from_secs(60));
    let config = CacheConfig {
        fetch_timeout_ms: 500,
        ..CacheConfig::default()
    };
    let cache = PermissionCache::new(backend.clone(), &config);

    let snapshot = cache.get(&identity("alice")).await;

    assert!(snapshot.is_deny_all());
    assert_eq!(cache.stats().deny_all_served, 1);
    assert!(!cache.is_loading());
}

#[tokio::test]
async fn test_result_for_replaced_identity_is_not_installed() {
    let backend = MockBackend::slow(Mode::Operator, Duration::from_millis(100));
    let cache = PermissionCache::new(backend.clone(), &CacheConfig::default());

    let alice_cache = cache.clone();
    let alice = tokio::spawn(async move { alice_cache.get(&identity("alice")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let bob = cache.get(&identity("bob")).await;
    let alice = alice.await.unwrap();

    // alice's waiter still gets its own answer
    assert_eq!(alice.identity, identity("alice"));
    assert_eq!(bob.identity, identity("bob"));
    assert_eq!(cache.entry().unwrap().identity_at_cache, identity("bob"));

    // Only the installed result counts as an outcome
    let stats = cache.stats();
    assert_eq!(stats.superseded, 1);
    assert_eq!(stats.fresh, 1);
    assert_eq!(stats.fetches, 2);
}

#[tokio::test]
async fn scenario_operator_page_grants() {
    let backend = MockBackend::new(Mode::Operator);
    let (evaluator, _jar) = cookie_evaluator(backend, "alice");

    assert!(evaluator.has_page_permission("user-role-management", None).await);
    assert!(!evaluator.has_page_permission("user-role-management", Some("delete")).await);
    assert!(!evaluator.has_role("ADMIN").await);
}

#[tokio::test(start_paused = true)]
async fn scenario_identity_switch_mid_ttl() {
    let backend = MockBackend::new(Mode::Operator);
    let (evaluator, jar) = cookie_evaluator(backend.clone(), "alice");

    evaluator.has_role(Roles::OPERATOR).await;
    tokio::time::advance(Duration::from_secs(120)).await;

    jar.set("xUsername", "bob", None);
    evaluator.has_role(Roles::OPERATOR).await;

    assert_eq!(backend.calls(), 2);
    let entry = evaluator.cache().entry().unwrap();
    assert_eq!(entry.identity_at_cache, identity("bob"));
    assert_eq!(entry.snapshot.identity, identity("bob"));
}

#[tokio::test]
async fn scenario_backend_recovers_after_first_failure() {
    let backend = MockBackend::new(Mode::Down);
    let (evaluator, _jar) = cookie_evaluator(backend.clone(), "carol");

    assert!(!evaluator.has_role(Roles::OPERATOR).await);
    assert!(!evaluator.has_page_permission(Pages::USER_ROLE_MANAGEMENT, None).await);

    backend.set_mode(Mode::Operator);
    assert!(evaluator.has_role(Roles::OPERATOR).await);
    assert!(evaluator.has_page_permission(Pages::USER_ROLE_MANAGEMENT, None).await);
}

#[tokio::test]
async fn test_empty_role_lists() {
    let backend = MockBackend::new(Mode::Operator);
    let (evaluator, _jar) = cookie_evaluator(backend, "alice");

    // No role matches an empty list, and an empty list is trivially all held
    assert!(!evaluator.has_any_role(&[]).await);
    assert!(evaluator.has_all_roles(&[]).await);
    assert!(evaluator.check_roles(&RoleRequirement::all(&[])).await);
}
