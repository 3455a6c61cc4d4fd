#![forbid(unsafe_code)]

//! # score-criteria
//!
//! Core of a personalization criteria editor: pick a dimension (or discrete
//! trait) and a minimum score.
//!
//! Two remote taxonomy feeds, classified dimensions and discrete traits, are
//! fetched through a TTL cache that coalesces concurrent requests, classified,
//! and merged into one stably ordered list of option groups. A persisted
//! selection id resolves back to its option, and user edits are applied to the
//! host-owned criteria record as partial merges that respect read-only mode.

pub mod cache;
pub mod criteria;
pub mod editor;
pub mod gateway;
pub mod options;
pub mod taxonomy;

pub use cache::{CacheConfig, Freshness, TaxonomyCache, TaxonomyFetch};
pub use criteria::{
    Criteria, CriteriaController, CriteriaError, CriteriaStore, CriteriaUpdate,
    MemoryCriteriaStore, MergeOutcome, ScoreParsing,
};
pub use editor::{EditorSession, EditorView, RefreshOutcome};
pub use gateway::{Credentials, FetchError, TaxonomySource, UniformAdapter};
pub use options::{build_groups, resolve_selection, GroupName, MenuOption, OptionGroup};
pub use taxonomy::{classify, Dimension, DiscreteTrait, SemanticType};
