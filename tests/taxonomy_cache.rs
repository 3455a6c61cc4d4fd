use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use score_criteria::cache::{CacheConfig, Freshness, TaxonomyCache};
use score_criteria::gateway::{
    Credentials, ErrorContext, FetchError, RawDimension, RawTrait, ResourceKind, TaxonomySource,
    UniformAdapter,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn fast_config() -> CacheConfig {
    CacheConfig {
        retry_base_delay: Duration::from_millis(0),
        ..CacheConfig::default()
    }
}

fn http_cache(server: &MockServer) -> TaxonomyCache {
    let adapter = UniformAdapter::with_config(server.uri(), Duration::from_secs(5)).unwrap();
    TaxonomyCache::with_config(Arc::new(adapter), fast_config())
}

fn dimensions_body() -> serde_json::Value {
    json!({
        "dimensions": [
            { "dim": "d1", "category": "SIG", "name": "Returning Visitor", "min": 0, "cap": 100 }
        ]
    })
}

// =============================================================================
// In-process source
// =============================================================================

#[derive(Default)]
struct FakeSource {
    dimension_calls: AtomicUsize,
    trait_calls: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl FakeSource {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TaxonomySource for FakeSource {
    async fn dimensions(&self, _creds: &Credentials) -> Result<Vec<RawDimension>, FetchError> {
        self.dimension_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::status(
                ResourceKind::Dimensions,
                500,
                "boom",
                ErrorContext::new().with_status(500),
            ));
        }
        Ok(vec![RawDimension {
            dim: "d1".into(),
            category: "SIG".into(),
            subcategory: None,
            name: "Returning Visitor".into(),
            min: 0.0,
            cap: 100.0,
        }])
    }

    async fn traits(&self, _creds: &Credentials) -> Result<Vec<RawTrait>, FetchError> {
        self.trait_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(vec![RawTrait {
            id: "q1".into(),
            name: None,
        }])
    }
}

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn concurrent_fetches_share_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/dimension"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(dimensions_body())
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let cache = http_cache(&server);
    let creds = Credentials::new("p1", "key-1");

    let (a, b) = tokio::join!(cache.fetch_dimensions(&creds), cache.fetch_dimensions(&creds));

    assert_eq!(a.freshness, Freshness::Fresh);
    assert_eq!(b.freshness, Freshness::Fresh);
    assert!(Arc::ptr_eq(&a.items, &b.items));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    let c = cache.fetch_dimensions(&creds).await;
    assert_eq!(c.freshness, Freshness::Cached);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_caller_joins_in_flight_fetch() {
    let source = Arc::new(FakeSource::with_delay(Duration::from_millis(100)));
    let cache = TaxonomyCache::with_config(source.clone(), fast_config());
    let creds = Credentials::new("p1", "key-1");

    let late = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = cache.status(ResourceKind::Dimensions, "p1").unwrap();
        assert!(status.in_flight);
        cache.fetch_dimensions(&creds).await
    };
    let (first, second) = tokio::join!(cache.fetch_dimensions(&creds), late);

    assert_eq!(source.dimension_calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first.items, &second.items));
    assert!(!cache.status(ResourceKind::Dimensions, "p1").unwrap().in_flight);
}

#[tokio::test(start_paused = true)]
async fn different_projects_and_kinds_are_separate_keys() {
    let source = Arc::new(FakeSource::default());
    let cache = TaxonomyCache::with_config(source.clone(), fast_config());

    cache.fetch_dimensions(&Credentials::new("p1", "k")).await;
    cache.fetch_dimensions(&Credentials::new("p2", "k")).await;
    cache.fetch_traits(&Credentials::new("p1", "k")).await;

    assert_eq!(source.dimension_calls.load(Ordering::SeqCst), 2);
    assert_eq!(source.trait_calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Freshness
// =============================================================================

#[tokio::test(start_paused = true)]
async fn entries_refetch_after_ttl() {
    let source = Arc::new(FakeSource::default());
    let cache = TaxonomyCache::with_config(source.clone(), fast_config());
    let creds = Credentials::new("p1", "key-1");

    assert_eq!(cache.fetch_traits(&creds).await.freshness, Freshness::Fresh);

    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    assert_eq!(cache.fetch_traits(&creds).await.freshness, Freshness::Cached);
    assert_eq!(source.trait_calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(cache.fetch_traits(&creds).await.freshness, Freshness::Fresh);
    assert_eq!(source.trait_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_refetch() {
    let source = Arc::new(FakeSource::default());
    let cache = TaxonomyCache::with_config(source.clone(), fast_config());
    let creds = Credentials::new("p1", "key-1");

    cache.fetch_dimensions(&creds).await;
    cache.invalidate(ResourceKind::Dimensions, "p1");
    let again = cache.fetch_dimensions(&creds).await;

    assert_eq!(again.freshness, Freshness::Fresh);
    assert_eq!(source.dimension_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disabled_credentials_make_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dimensions_body()))
        .mount(&server)
        .await;

    let cache = http_cache(&server);
    let no_key = cache.fetch_dimensions(&Credentials::new("p1", "")).await;
    let no_project = cache.fetch_traits(&Credentials::new("", "key-1")).await;

    assert_eq!(no_key.freshness, Freshness::Disabled);
    assert_eq!(no_project.freshness, Freshness::Disabled);
    assert!(no_key.items.is_empty());
    assert!(no_key.error.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(cache.status(ResourceKind::Dimensions, "p1").is_none());
}

// =============================================================================
// Retry and failure
// =============================================================================

#[derive(Clone)]
struct FlipResponder {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

impl Respond for FlipResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(500).set_body_string("transient")
        } else {
            ResponseTemplate::new(200).set_body_json(dimensions_body())
        }
    }
}

#[tokio::test]
async fn retries_transient_failures_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/dimension"))
        .respond_with(FlipResponder {
            calls: Arc::new(AtomicUsize::new(0)),
            failures: 2,
        })
        .mount(&server)
        .await;

    let cache = http_cache(&server);
    let fetch = cache.fetch_dimensions(&Credentials::new("p1", "key-1")).await;

    assert_eq!(fetch.freshness, Freshness::Fresh);
    assert_eq!(fetch.items.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn gives_up_after_two_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/dimension"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cache = http_cache(&server);
    let fetch = cache.fetch_dimensions(&Credentials::new("p1", "key-1")).await;

    assert_eq!(fetch.freshness, Freshness::Unavailable);
    assert!(fetch.items.is_empty());
    assert!(fetch.error.is_some());
    assert!(!fetch.is_fresh());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(!cache.status(ResourceKind::Dimensions, "p1").unwrap().in_flight);
}

#[tokio::test]
async fn failed_refresh_serves_stale_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/dimension"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dimensions_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/dimension"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let cache = http_cache(&server);
    let creds = Credentials::new("p1", "key-1");

    let first = cache.fetch_dimensions(&creds).await;
    assert_eq!(first.freshness, Freshness::Fresh);

    cache.invalidate(ResourceKind::Dimensions, "p1");
    let second = cache.fetch_dimensions(&creds).await;

    assert_eq!(second.freshness, Freshness::Stale);
    assert!(Arc::ptr_eq(&first.items, &second.items));
    let err = second.error.expect("expected fetch error");
    assert_eq!(err.code(), "server_error");
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_cached_value_for_later_success() {
    let source = Arc::new(FakeSource::default());
    let cache = TaxonomyCache::with_config(source.clone(), fast_config());
    let creds = Credentials::new("p1", "key-1");

    cache.fetch_dimensions(&creds).await;
    source.failing.store(true, Ordering::SeqCst);
    cache.invalidate(ResourceKind::Dimensions, "p1");

    let stale = cache.fetch_dimensions(&creds).await;
    assert_eq!(stale.freshness, Freshness::Stale);
    assert_eq!(stale.items[0].dim, "d1");
    assert_eq!(source.dimension_calls.load(Ordering::SeqCst), 4);

    source.failing.store(false, Ordering::SeqCst);
    let fresh = cache.fetch_dimensions(&creds).await;
    assert_eq!(fresh.freshness, Freshness::Fresh);
}
