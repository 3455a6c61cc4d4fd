//! Core types for the taxonomy gateway.

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Environment variable holding the taxonomy API key.
pub const API_KEY_ENV: &str = "UNIFORM_API_KEY";

/// Project-scoped credentials for the remote taxonomy API.
///
/// Either field being empty disables fetching entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub project_id: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Use `project_id` with the API key from `UNIFORM_API_KEY` (empty when unset).
    pub fn from_env(project_id: impl Into<String>) -> Self {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        Self::new(project_id, api_key)
    }

    pub fn is_enabled(&self) -> bool {
        !self.project_id.is_empty() && !self.api_key.is_empty()
    }
}

// =============================================================================
// RESOURCE KIND
// =============================================================================

/// Which remote collection a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Dimensions,
    Traits,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Dimensions => "dimensions",
            ResourceKind::Traits => "traits",
        }
    }

    /// Endpoint path relative to the API host.
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Dimensions => "/api/v2/dimension",
            ResourceKind::Traits => "/api/v2/quirk",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// A dimension as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDimension {
    pub dim: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub name: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub cap: f64,
}

/// A discrete trait ("quirk") as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrait {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DimensionsResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dimensions: Vec<RawDimension>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TraitsResponse {
    #[serde(default, alias = "traits", deserialize_with = "null_as_empty")]
    pub quirks: Vec<RawTrait>,
}

// The API sends `null` for a project with nothing configured.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
