//! Editor session: the glue between the taxonomy cache, the option aggregator,
//! the selection resolver and the criteria controller.
//!
//! A session owns the latest fetch results for one set of credentials. Fetches
//! started under an older generation (credentials changed, or the session was
//! detached) are discarded when they resolve instead of being applied.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::cache::{Freshness, TaxonomyCache, TaxonomyFetch};
use crate::criteria::{CriteriaController, CriteriaError, CriteriaStore, MergeOutcome};
use crate::gateway::{Credentials, RawDimension, RawTrait};
use crate::options::{build_groups, resolve_selection, MenuOption, OptionGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// The session moved on while the fetch was running.
    Discarded,
}

/// Everything a rendering layer needs to draw the editor.
#[derive(Debug, Clone, Serialize)]
pub struct EditorView {
    pub groups: Arc<Vec<OptionGroup>>,
    pub selected: Option<MenuOption>,
    pub min_score: String,
    pub is_loading: bool,
    pub is_read_only: bool,
    pub stale: bool,
    pub errors: Vec<String>,
}

struct Memo {
    dimensions: Option<Arc<Vec<RawDimension>>>,
    traits: Option<Arc<Vec<RawTrait>>>,
    groups: Arc<Vec<OptionGroup>>,
}

#[derive(Default)]
struct SessionState {
    credentials: Credentials,
    dimensions: Option<TaxonomyFetch<RawDimension>>,
    traits: Option<TaxonomyFetch<RawTrait>>,
    memo: Option<Memo>,
}

pub struct EditorSession<S: CriteriaStore> {
    cache: TaxonomyCache,
    controller: CriteriaController<S>,
    generation: AtomicU64,
    loading: AtomicUsize,
    state: Mutex<SessionState>,
}

impl<S: CriteriaStore> EditorSession<S> {
    /// Start a session for the store's project using `api_key`.
    pub fn new(cache: TaxonomyCache, controller: CriteriaController<S>, api_key: &str) -> Self {
        let credentials = Credentials::new(controller.store().project_id(), api_key);
        Self {
            cache,
            controller,
            generation: AtomicU64::new(0),
            loading: AtomicUsize::new(0),
            state: Mutex::new(SessionState {
                credentials,
                ..SessionState::default()
            }),
        }
    }

    pub fn controller(&self) -> &CriteriaController<S> {
        &self.controller
    }

    pub fn credentials(&self) -> Credentials {
        self.lock().credentials.clone()
    }

    /// Switch credentials. Results of fetches still running are dropped.
    pub fn set_credentials(&self, credentials: Credentials) {
        let mut state = self.lock();
        if state.credentials == credentials {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *state = SessionState {
            credentials,
            ..SessionState::default()
        };
    }

    /// Stop accepting results from fetches that are still running.
    pub fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Fetch both collections concurrently and apply whichever results are
    /// still current when they arrive.
    pub async fn refresh(&self) -> RefreshOutcome {
        let (generation, credentials) = {
            let state = self.lock();
            (
                self.generation.load(Ordering::SeqCst),
                state.credentials.clone(),
            )
        };

        let dimensions = async {
            let _loading = LoadingGuard::enter(&self.loading);
            let fetch = self.cache.fetch_dimensions(&credentials).await;
            self.apply(generation, |state| state.dimensions = Some(fetch))
        };
        let traits = async {
            let _loading = LoadingGuard::enter(&self.loading);
            let fetch = self.cache.fetch_traits(&credentials).await;
            self.apply(generation, |state| state.traits = Some(fetch))
        };
        let (dimensions_applied, traits_applied) = tokio::join!(dimensions, traits);

        if dimensions_applied && traits_applied {
            RefreshOutcome::Applied
        } else {
            tracing::debug!(generation, "discarding taxonomy results for superseded session");
            RefreshOutcome::Discarded
        }
    }

    fn apply(&self, generation: u64, update: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        update(&mut state);
        true
    }

    /// Current option groups, rebuilt only when either input collection changed.
    pub fn groups(&self) -> Arc<Vec<OptionGroup>> {
        let mut state = self.lock();
        let dimensions = state.dimensions.as_ref().map(|f| f.items.clone());
        let traits = state.traits.as_ref().map(|f| f.items.clone());

        if let Some(memo) = &state.memo {
            if same_input(&memo.dimensions, &dimensions) && same_input(&memo.traits, &traits) {
                return memo.groups.clone();
            }
        }

        let groups = Arc::new(build_groups(
            dimensions.as_deref().map(Vec::as_slice).unwrap_or(&[]),
            traits.as_deref().map(Vec::as_slice).unwrap_or(&[]),
        ));
        state.memo = Some(Memo {
            dimensions,
            traits,
            groups: groups.clone(),
        });
        groups
    }

    pub fn selected_option(&self) -> Option<MenuOption> {
        let criteria = self.controller.criteria();
        let groups = self.groups();
        resolve_selection(criteria.dim.as_deref(), &groups).cloned()
    }

    pub fn view(&self) -> EditorView {
        let criteria = self.controller.criteria();
        let groups = self.groups();
        let selected = resolve_selection(criteria.dim.as_deref(), &groups).cloned();

        let state = self.lock();
        let outcomes = [
            state.dimensions.as_ref().map(|f| (f.freshness, f.error.clone())),
            state.traits.as_ref().map(|f| (f.freshness, f.error.clone())),
        ];
        let stale = outcomes
            .iter()
            .flatten()
            .any(|(freshness, _)| *freshness == Freshness::Stale);
        let errors = outcomes
            .iter()
            .flatten()
            .filter_map(|(_, err)| err.as_ref().map(|e| e.to_string()))
            .collect();

        EditorView {
            groups,
            selected,
            min_score: criteria.display_min_score(),
            is_loading: self.loading.load(Ordering::SeqCst) > 0,
            is_read_only: self.controller.store().is_read_only(),
            stale,
            errors,
        }
    }

    pub fn select(&self, value: Option<&str>) -> Result<MergeOutcome, CriteriaError> {
        self.controller.apply_dimension_change(value)
    }

    pub fn set_min_score(&self, raw_input: &str) -> Result<MergeOutcome, CriteriaError> {
        self.controller.apply_min_score_change(raw_input)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counts one pending fetch for as long as it is alive, including when the
/// refresh future is dropped mid-flight.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn same_input<T>(a: &Option<Arc<Vec<T>>>, b: &Option<Arc<Vec<T>>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
