//! In-memory TTL cache for remote taxonomy collections.
//!
//! Entries are keyed by `(ResourceKind, project_id)`. At most one network
//! fetch per key is in flight at any time: the first caller registers a shared
//! in-flight future before the request starts, and concurrent callers await that
//! same future instead of issuing their own. The fetch itself runs on a spawned
//! task so it completes (and updates the entry) even if every caller goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::{sleep, Instant};

use crate::gateway::{Credentials, FetchError, RawDimension, RawTrait, ResourceKind, TaxonomySource};

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a successful fetch stays fresh.
    pub ttl: Duration,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// RESULT TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub project_id: String,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, project_id: impl Into<String>) -> Self {
        Self {
            kind,
            project_id: project_id.into(),
        }
    }
}

/// Where the items of a [`TaxonomyFetch`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fetched from the network by this call or by the flight it joined.
    Fresh,
    /// Served from cache within the TTL.
    Cached,
    /// The refresh failed; items are the last successful fetch.
    Stale,
    /// The fetch failed and nothing was cached.
    Unavailable,
    /// Credentials were incomplete; no request was made.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct TaxonomyFetch<T> {
    pub items: Arc<Vec<T>>,
    pub freshness: Freshness,
    /// Set when the latest fetch failed after retries.
    pub error: Option<Arc<FetchError>>,
}

impl<T> TaxonomyFetch<T> {
    fn disabled() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            freshness: Freshness::Disabled,
            error: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self.freshness, Freshness::Fresh | Freshness::Cached)
    }
}

/// Diagnostic view of a single cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
    pub items: Option<usize>,
    pub age: Option<Duration>,
    pub in_flight: bool,
}

// =============================================================================
// ENTRIES
// =============================================================================

type FlightResult<T> = Result<Arc<Vec<T>>, Arc<FetchError>>;
type Flight<T> = Shared<BoxFuture<'static, FlightResult<T>>>;
type AttemptFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, FetchError>> + Send + Sync>;

struct Entry<T> {
    value: Option<Arc<Vec<T>>>,
    fetched_at: Option<Instant>,
    in_flight: Option<Flight<T>>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            value: None,
            fetched_at: None,
            in_flight: None,
        }
    }
}

struct Slots<T> {
    entries: Mutex<HashMap<CacheKey, Entry<T>>>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // Never held across an await; a poisoned map is still structurally valid.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Lookup<T> {
    Hit(Arc<Vec<T>>),
    Join(Flight<T>),
}

// =============================================================================
// CACHE
// =============================================================================

/// Get-or-fetch cache over a [`TaxonomySource`].
#[derive(Clone)]
pub struct TaxonomyCache {
    source: Arc<dyn TaxonomySource>,
    config: CacheConfig,
    dimensions: Arc<Slots<RawDimension>>,
    traits: Arc<Slots<RawTrait>>,
}

impl TaxonomyCache {
    pub fn new(source: Arc<dyn TaxonomySource>) -> Self {
        Self::with_config(source, CacheConfig::default())
    }

    pub fn with_config(source: Arc<dyn TaxonomySource>, config: CacheConfig) -> Self {
        Self {
            source,
            config,
            dimensions: Arc::new(Slots::new()),
            traits: Arc::new(Slots::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn fetch_dimensions(&self, creds: &Credentials) -> TaxonomyFetch<RawDimension> {
        if !creds.is_enabled() {
            return TaxonomyFetch::disabled();
        }
        let source = self.source.clone();
        let creds_owned = creds.clone();
        let attempt: AttemptFn<RawDimension> = Arc::new(move || {
            let source = source.clone();
            let creds = creds_owned.clone();
            async move { source.dimensions(&creds).await }.boxed()
        });
        let key = CacheKey::new(ResourceKind::Dimensions, &creds.project_id);
        get_or_fetch(&self.dimensions, &self.config, key, attempt).await
    }

    pub async fn fetch_traits(&self, creds: &Credentials) -> TaxonomyFetch<RawTrait> {
        if !creds.is_enabled() {
            return TaxonomyFetch::disabled();
        }
        let source = self.source.clone();
        let creds_owned = creds.clone();
        let attempt: AttemptFn<RawTrait> = Arc::new(move || {
            let source = source.clone();
            let creds = creds_owned.clone();
            async move { source.traits(&creds).await }.boxed()
        });
        let key = CacheKey::new(ResourceKind::Traits, &creds.project_id);
        get_or_fetch(&self.traits, &self.config, key, attempt).await
    }

    /// Force the next fetch for this key to go to the network.
    ///
    /// Cached items are kept and still served as stale data if that fetch fails.
    pub fn invalidate(&self, kind: ResourceKind, project_id: &str) {
        let key = CacheKey::new(kind, project_id);
        match kind {
            ResourceKind::Dimensions => expire(&self.dimensions, &key),
            ResourceKind::Traits => expire(&self.traits, &key),
        }
    }

    pub fn status(&self, kind: ResourceKind, project_id: &str) -> Option<EntryStatus> {
        let key = CacheKey::new(kind, project_id);
        match kind {
            ResourceKind::Dimensions => entry_status(&self.dimensions, &key),
            ResourceKind::Traits => entry_status(&self.traits, &key),
        }
    }
}

fn expire<T>(slots: &Slots<T>, key: &CacheKey) {
    if let Some(entry) = slots.lock().get_mut(key) {
        entry.fetched_at = None;
    }
}

fn entry_status<T>(slots: &Slots<T>, key: &CacheKey) -> Option<EntryStatus> {
    let entries = slots.lock();
    let entry = entries.get(key)?;
    Some(EntryStatus {
        items: entry.value.as_ref().map(|v| v.len()),
        age: entry.fetched_at.map(|at| at.elapsed()),
        in_flight: entry.in_flight.is_some(),
    })
}

async fn get_or_fetch<T>(
    slots: &Arc<Slots<T>>,
    config: &CacheConfig,
    key: CacheKey,
    attempt: AttemptFn<T>,
) -> TaxonomyFetch<T>
where
    T: Send + Sync + 'static,
{
    let lookup = {
        let mut entries = slots.lock();
        let entry = entries.entry(key.clone()).or_default();

        let cached = match (&entry.value, entry.fetched_at) {
            (Some(value), Some(at)) if at.elapsed() < config.ttl => Some(value.clone()),
            _ => None,
        };

        if let Some(items) = cached {
            Lookup::Hit(items)
        } else if let Some(flight) = &entry.in_flight {
            tracing::debug!(kind = %key.kind, project = %key.project_id, "joining in-flight fetch");
            Lookup::Join(flight.clone())
        } else {
            let flight = start_flight(slots.clone(), config.clone(), key.clone(), attempt);
            entry.in_flight = Some(flight.clone());
            Lookup::Join(flight)
        }
    };

    let flight = match lookup {
        Lookup::Hit(items) => {
            return TaxonomyFetch {
                items,
                freshness: Freshness::Cached,
                error: None,
            }
        }
        Lookup::Join(flight) => flight,
    };

    match flight.await {
        Ok(items) => TaxonomyFetch {
            items,
            freshness: Freshness::Fresh,
            error: None,
        },
        Err(err) => {
            let stale = slots.lock().get(&key).and_then(|e| e.value.clone());
            match stale {
                Some(items) => TaxonomyFetch {
                    items,
                    freshness: Freshness::Stale,
                    error: Some(err),
                },
                None => TaxonomyFetch {
                    items: Arc::new(Vec::new()),
                    freshness: Freshness::Unavailable,
                    error: Some(err),
                },
            }
        }
    }
}

/// Spawn the retrying fetch and return a shareable handle to its result.
///
/// Must be called with the entry lock held so the returned flight is registered
/// before the task can clear it.
fn start_flight<T>(
    slots: Arc<Slots<T>>,
    config: CacheConfig,
    key: CacheKey,
    attempt: AttemptFn<T>,
) -> Flight<T>
where
    T: Send + Sync + 'static,
{
    let task = tokio::spawn(async move {
        let result = fetch_with_retry(&config, &key, attempt.as_ref()).await;

        let mut entries = slots.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.in_flight = None;
        match result {
            Ok(items) => {
                let items = Arc::new(items);
                entry.value = Some(items.clone());
                entry.fetched_at = Some(Instant::now());
                Ok(items)
            }
            Err(err) => Err(Arc::new(err)),
        }
    });

    async move {
        match task.await {
            Ok(result) => result,
            Err(join) => Err(Arc::new(FetchError::Join(join.to_string()))),
        }
    }
    .boxed()
    .shared()
}

async fn fetch_with_retry<T>(
    config: &CacheConfig,
    key: &CacheKey,
    attempt_fn: &(dyn Fn() -> BoxFuture<'static, Result<Vec<T>, FetchError>> + Send + Sync),
) -> Result<Vec<T>, FetchError> {
    let mut last_error: Option<FetchError> = None;

    for attempt in 0..=config.max_retries {
        match attempt_fn().await {
            Ok(items) => {
                tracing::debug!(
                    kind = %key.kind,
                    project = %key.project_id,
                    items = items.len(),
                    attempt,
                    "taxonomy fetch succeeded"
                );
                return Ok(items);
            }
            Err(err) => {
                if !err.is_retryable() || attempt == config.max_retries {
                    tracing::warn!(
                        kind = %key.kind,
                        project = %key.project_id,
                        code = err.code(),
                        attempts = attempt + 1,
                        error = %err,
                        "taxonomy fetch failed"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    kind = %key.kind,
                    project = %key.project_id,
                    code = err.code(),
                    attempt,
                    "taxonomy fetch attempt failed, retrying"
                );
                let delay = backoff_delay(config.retry_base_delay, attempt);
                last_error = Some(err);
                sleep(delay).await;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| FetchError::config("retry loop exited without a result")))
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 9), Duration::from_millis(3_200));
    }

    #[test]
    fn default_config_matches_editor_behavior() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.max_retries, 2);
    }
}
