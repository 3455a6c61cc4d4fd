//! Minimum-score criteria record and the edits applied to it.
//!
//! The record itself is owned by a host [`CriteriaStore`]; this module only
//! proposes new values through the store's transform-based setter. Every edit
//! is a partial merge: the field being edited changes, everything else
//! (including fields this crate does not know about) is carried over.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// RECORD
// =============================================================================

/// Persisted criteria record.
///
/// A `dim` that is not a string or a `minScore` that is not a number reads as
/// absent, but the raw value stays in `extra` and is written back untouched
/// until that field is edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Criteria {
    /// Selected dimension or trait id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dim: Option<String>,
    /// Minimum score threshold.
    #[serde(rename = "minScore", skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    /// Fields owned by the host that must survive merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const DIM_KEY: &str = "dim";
const MIN_SCORE_KEY: &str = "minScore";

impl From<Map<String, Value>> for Criteria {
    fn from(mut extra: Map<String, Value>) -> Self {
        let dim = match extra.remove(DIM_KEY) {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => {
                extra.insert(DIM_KEY.to_string(), other);
                None
            }
        };
        let min_score = match extra.remove(MIN_SCORE_KEY) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::Null) | None => None,
            Some(other) => {
                extra.insert(MIN_SCORE_KEY.to_string(), other);
                None
            }
        };
        Self {
            dim,
            min_score,
            extra,
        }
    }
}

impl Criteria {
    pub fn new(dim: Option<&str>, min_score: Option<f64>) -> Self {
        Self {
            dim: dim.map(str::to_string),
            min_score,
            extra: Map::new(),
        }
    }

    /// Copy with `dim` replaced; an empty id clears it.
    pub fn with_dim(&self, dim: Option<&str>) -> Self {
        let mut next = self.clone();
        next.extra.remove(DIM_KEY);
        next.dim = dim.filter(|d| !d.is_empty()).map(str::to_string);
        next
    }

    pub fn with_min_score(&self, min_score: Option<f64>) -> Self {
        let mut next = self.clone();
        next.extra.remove(MIN_SCORE_KEY);
        next.min_score = min_score;
        next
    }

    /// Selected id as shown by the selection widget (`""` when absent).
    pub fn selected_dimension(&self) -> &str {
        self.dim.as_deref().unwrap_or("")
    }

    /// Threshold as shown by the numeric input (`""` when absent).
    pub fn display_min_score(&self) -> String {
        match self.min_score {
            None => String::new(),
            Some(v) if v.is_nan() => "NaN".to_string(),
            Some(v) if v == f64::INFINITY => "Infinity".to_string(),
            Some(v) if v == f64::NEG_INFINITY => "-Infinity".to_string(),
            Some(v) => format!("{v}"),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CriteriaError {
    #[error("minimum score must be a finite number, got {input:?}")]
    InvalidMinScore { input: String },
    #[error("criteria store error: {0}")]
    Store(String),
}

// =============================================================================
// STORE
// =============================================================================

/// Value submitted to the store by a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaUpdate {
    pub new_value: Criteria,
}

/// Host-owned persistence for the criteria record.
pub trait CriteriaStore: Send + Sync {
    fn value(&self) -> Criteria;
    fn is_read_only(&self) -> bool;
    fn project_id(&self) -> String;
    /// Apply `transform` to the current value and persist the result.
    fn set_value(
        &self,
        transform: &dyn Fn(&Criteria) -> CriteriaUpdate,
    ) -> Result<Criteria, CriteriaError>;
}

/// In-process store. Useful for the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryCriteriaStore {
    value: Mutex<Criteria>,
    read_only: AtomicBool,
    project_id: String,
    writes: AtomicUsize,
}

impl MemoryCriteriaStore {
    pub fn new(project_id: impl Into<String>, value: Criteria) -> Self {
        Self {
            value: Mutex::new(value),
            read_only: AtomicBool::new(false),
            project_id: project_id.into(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn read_only(self) -> Self {
        self.set_read_only(true);
        self
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of successful `set_value` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CriteriaStore for MemoryCriteriaStore {
    fn value(&self) -> Criteria {
        self.value
            .lock()
            .map(|v| v.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    fn project_id(&self) -> String {
        self.project_id.clone()
    }

    fn set_value(
        &self,
        transform: &dyn Fn(&Criteria) -> CriteriaUpdate,
    ) -> Result<Criteria, CriteriaError> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| CriteriaError::Store("criteria lock poisoned".to_string()))?;
        let update = transform(&*guard);
        *guard = update.new_value.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(update.new_value)
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// How threshold input text becomes a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoreParsing {
    /// JavaScript `Number()` semantics; malformed input is stored as NaN.
    #[default]
    Lenient,
    /// Reject anything that is not a finite number.
    Strict,
}

impl ScoreParsing {
    pub fn parse(&self, raw: &str) -> Result<f64, CriteriaError> {
        let value = js_number(raw);
        match self {
            ScoreParsing::Lenient => Ok(value),
            ScoreParsing::Strict if value.is_finite() && !raw.trim().is_empty() => Ok(value),
            ScoreParsing::Strict => Err(CriteriaError::InvalidMinScore {
                input: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The store accepted this new value.
    Applied(Criteria),
    /// Read-only mode; nothing was written.
    ReadOnly,
}

pub struct CriteriaController<S: CriteriaStore> {
    store: S,
    parsing: ScoreParsing,
}

impl<S: CriteriaStore> CriteriaController<S> {
    pub fn new(store: S) -> Self {
        Self::with_parsing(store, ScoreParsing::default())
    }

    pub fn with_parsing(store: S, parsing: ScoreParsing) -> Self {
        Self { store, parsing }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn parsing(&self) -> ScoreParsing {
        self.parsing
    }

    pub fn criteria(&self) -> Criteria {
        self.store.value()
    }

    pub fn apply_dimension_change(
        &self,
        new_value: Option<&str>,
    ) -> Result<MergeOutcome, CriteriaError> {
        if self.store.is_read_only() {
            return Ok(MergeOutcome::ReadOnly);
        }
        let applied = self.store.set_value(&|current: &Criteria| CriteriaUpdate {
            new_value: current.with_dim(new_value),
        })?;
        Ok(MergeOutcome::Applied(applied))
    }

    pub fn apply_min_score_change(&self, raw_input: &str) -> Result<MergeOutcome, CriteriaError> {
        if self.store.is_read_only() {
            return Ok(MergeOutcome::ReadOnly);
        }
        let min_score = if raw_input.is_empty() {
            None
        } else {
            Some(self.parsing.parse(raw_input)?)
        };
        let applied = self.store.set_value(&|current: &Criteria| CriteriaUpdate {
            new_value: current.with_min_score(min_score),
        })?;
        Ok(MergeOutcome::Applied(applied))
    }
}

// =============================================================================
// NUMBER CONVERSION
// =============================================================================

/// Convert text to a number the way JavaScript's `Number(string)` does.
///
/// Surrounding whitespace is ignored, blank text is `0`, `Infinity` and the
/// `0x`/`0o`/`0b` prefixes are understood, anything else non-decimal is NaN.
pub fn js_number(input: &str) -> f64 {
    let s = input.trim();
    if s.is_empty() {
        return 0.0;
    }

    let (sign, unsigned) = match s.as_bytes()[0] {
        b'+' => (1.0, &s[1..]),
        b'-' => (-1.0, &s[1..]),
        _ => (1.0, s),
    };

    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }

    if unsigned.len() == s.len() {
        for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
            if let Some(digits) = s.strip_prefix(prefix) {
                return parse_radix(digits, radix);
            }
        }
    }

    // Rust also accepts "inf"/"nan" spellings that JavaScript does not.
    let decimal_chars = unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !decimal_chars {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    digits.chars().try_fold(0.0_f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
    })
    .unwrap_or(f64::NAN)
}
