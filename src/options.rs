//! Grouped selectable options built from dimensions and traits.
//!
//! Groups always come out in the fixed order Signal, Audience, Intent,
//! Enrichment, Trait. Empty groups are dropped and options keep the arrival
//! order of their source collection.

use serde::Serialize;

use crate::gateway::types::{RawDimension, RawTrait};
use crate::taxonomy::{Dimension, DiscreteTrait, SemanticType};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GroupName {
    Signal,
    Audience,
    Intent,
    Enrichment,
    Trait,
}

impl GroupName {
    /// Canonical output order.
    pub const ALL: [GroupName; 5] = [
        GroupName::Signal,
        GroupName::Audience,
        GroupName::Intent,
        GroupName::Enrichment,
        GroupName::Trait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupName::Signal => "Signal",
            GroupName::Audience => "Audience",
            GroupName::Intent => "Intent",
            GroupName::Enrichment => "Enrichment",
            GroupName::Trait => "Trait",
        }
    }

    fn position(self) -> usize {
        match self {
            GroupName::Signal => 0,
            GroupName::Audience => 1,
            GroupName::Intent => 2,
            GroupName::Enrichment => 3,
            GroupName::Trait => 4,
        }
    }
}

impl From<SemanticType> for GroupName {
    fn from(ty: SemanticType) -> Self {
        match ty {
            SemanticType::Signal => GroupName::Signal,
            SemanticType::Audience => GroupName::Audience,
            SemanticType::Intent => GroupName::Intent,
            SemanticType::Enrichment => GroupName::Enrichment,
        }
    }
}

impl std::fmt::Display for GroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable entry. `value` is the source id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuOption {
    pub label: String,
    pub value: String,
    pub group: GroupName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionGroup {
    pub name: GroupName,
    pub options: Vec<MenuOption>,
}

// =============================================================================
// AGGREGATION
// =============================================================================

/// Classify and bucket raw dimensions and traits into ordered option groups.
///
/// Pure: structurally equal inputs always produce structurally equal output.
pub fn build_groups(dimensions: &[RawDimension], traits: &[RawTrait]) -> Vec<OptionGroup> {
    let mut buckets: Vec<(GroupName, Vec<MenuOption>)> =
        GroupName::ALL.iter().map(|name| (*name, Vec::new())).collect();

    for raw in dimensions {
        let dim = Dimension::from(raw);
        let group = GroupName::from(dim.semantic_type);
        buckets[group.position()].1.push(MenuOption {
            label: dim.display_name,
            value: dim.id,
            group,
        });
    }

    for raw in traits {
        let item = DiscreteTrait::from(raw);
        buckets[GroupName::Trait.position()].1.push(MenuOption {
            label: item.display_name,
            value: item.id,
            group: GroupName::Trait,
        });
    }

    buckets
        .into_iter()
        .filter(|(_, options)| !options.is_empty())
        .map(|(name, options)| OptionGroup { name, options })
        .collect()
}

// =============================================================================
// SELECTION
// =============================================================================

/// Find the option matching a persisted selection id.
///
/// Scans groups in order, then options in order; on an id shared by several
/// groups the earliest group wins.
pub fn resolve_selection<'a>(
    selected: Option<&str>,
    groups: &'a [OptionGroup],
) -> Option<&'a MenuOption> {
    let selected = selected.filter(|s| !s.is_empty())?;
    groups
        .iter()
        .flat_map(|group| group.options.iter())
        .find(|option| option.value == selected)
}
