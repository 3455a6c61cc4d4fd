//! Classified taxonomy entries: dimensions and discrete traits.
//!
//! Raw remote records (see [`crate::gateway::types`]) are turned into the
//! immutable [`Dimension`] and [`DiscreteTrait`] values consumed by the option
//! aggregator.

use serde::{Deserialize, Serialize};

use crate::gateway::types::{RawDimension, RawTrait};

/// Category code for measured signals.
pub const CATEGORY_SIGNAL: &str = "SIG";
/// Category code for enrichments.
pub const CATEGORY_ENRICHMENT: &str = "ENR";
/// Category code for aggregates (audiences and intents).
pub const CATEGORY_AGGREGATE: &str = "AGG";

// =============================================================================
// SEMANTIC TYPE
// =============================================================================

/// What a dimension means to the operator.
///
/// Declaration order is the canonical group order used by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Signal,
    Audience,
    Intent,
    Enrichment,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Signal => "signal",
            SemanticType::Audience => "audience",
            SemanticType::Intent => "intent",
            SemanticType::Enrichment => "enrichment",
        }
    }
}

/// Map a raw category/subcategory pair to a semantic type.
///
/// Unknown categories fall back to [`SemanticType::Signal`]. This masks upstream
/// taxonomy drift; use [`is_known_category`] to detect it.
pub fn classify(category: &str, subcategory: Option<&str>) -> SemanticType {
    match category {
        CATEGORY_SIGNAL => SemanticType::Signal,
        CATEGORY_ENRICHMENT => SemanticType::Enrichment,
        CATEGORY_AGGREGATE => {
            let is_intent = subcategory
                .map(|s| s.to_lowercase().contains("intent"))
                .unwrap_or(false);
            if is_intent {
                SemanticType::Intent
            } else {
                SemanticType::Audience
            }
        }
        _ => SemanticType::Signal,
    }
}

/// Whether `classify` recognizes this category without falling back.
pub fn is_known_category(category: &str) -> bool {
    matches!(
        category,
        CATEGORY_SIGNAL | CATEGORY_ENRICHMENT | CATEGORY_AGGREGATE
    )
}

// =============================================================================
// ENTRIES
// =============================================================================

/// A classified dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Dimension {
    pub id: String,
    pub display_name: String,
    pub semantic_type: SemanticType,
}

impl Dimension {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        semantic_type: SemanticType,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            semantic_type,
        }
    }
}

impl From<&RawDimension> for Dimension {
    fn from(raw: &RawDimension) -> Self {
        if !is_known_category(&raw.category) {
            tracing::debug!(
                dimension = %raw.dim,
                category = %raw.category,
                "unknown dimension category, classifying as signal"
            );
        }
        Self {
            id: raw.dim.clone(),
            display_name: raw.name.clone(),
            semantic_type: classify(&raw.category, raw.subcategory.as_deref()),
        }
    }
}

/// A discrete named trait ("quirk" in the remote API).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DiscreteTrait {
    pub id: String,
    pub display_name: String,
}

impl DiscreteTrait {
    /// Build a trait; a missing or empty name falls back to the id.
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        let id = id.into();
        let display_name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => id.clone(),
        };
        Self { id, display_name }
    }
}

impl From<&RawTrait> for DiscreteTrait {
    fn from(raw: &RawTrait) -> Self {
        Self::new(raw.id.clone(), raw.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_categories() {
        assert_eq!(classify("SIG", None), SemanticType::Signal);
        assert_eq!(classify("SIG", Some("Intent")), SemanticType::Signal);
        assert_eq!(classify("ENR", None), SemanticType::Enrichment);
        assert_eq!(classify("AGG", Some("Customer Intent")), SemanticType::Intent);
        assert_eq!(classify("AGG", Some("INTENTION")), SemanticType::Intent);
        assert_eq!(classify("AGG", Some("Loyalty")), SemanticType::Audience);
        assert_eq!(classify("AGG", None), SemanticType::Audience);
    }

    #[test]
    fn unknown_category_falls_back_to_signal() {
        assert_eq!(classify("XYZ", None), SemanticType::Signal);
        assert_eq!(classify("agg", Some("intent")), SemanticType::Signal);
        assert_eq!(classify("", None), SemanticType::Signal);
        assert!(!is_known_category("XYZ"));
        assert!(is_known_category("AGG"));
    }

    #[test]
    fn trait_display_name_falls_back_to_id() {
        assert_eq!(DiscreteTrait::new("q1", None).display_name, "q1");
        assert_eq!(DiscreteTrait::new("q1", Some("")).display_name, "q1");
        assert_eq!(DiscreteTrait::new("q1", Some("Coupon")).display_name, "Coupon");
    }

    #[test]
    fn dimension_from_raw_uses_dim_and_name() {
        let raw = RawDimension {
            dim: "d1".into(),
            category: "AGG".into(),
            subcategory: Some("Purchase intent".into()),
            name: "Ready to buy".into(),
            min: 0.0,
            cap: 100.0,
        };
        let dim = Dimension::from(&raw);
        assert_eq!(dim, Dimension::new("d1", "Ready to buy", SemanticType::Intent));
    }
}
