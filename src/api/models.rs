//! Static model catalog and the mapping from catalog ids to upstream
//! provider model ids.

use std::error::Error;
use std::fmt;

/// Upstream id used when a catalog id has no entry in the mapping table.
pub const FALLBACK_UPSTREAM_MODEL: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";

/// Model selected when neither config nor CLI names one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub capability: &'static str,
}

pub const MODEL_CATALOG: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "claude-3-5-haiku-20241022",
        name: "Claude 3.5 Haiku",
        description: "Fast responses, great for simple tasks",
        capability: "Speed",
    },
    ModelDescriptor {
        id: "claude-3-5-sonnet-20240620",
        name: "Claude 3.5 Sonnet",
        description: "Balanced performance for most tasks",
        capability: "Balanced",
    },
    ModelDescriptor {
        id: "claude-sonnet-4-20250514",
        name: "Claude 4 Sonnet",
        description: "Most capable model for complex tasks",
        capability: "Powerful",
    },
];

const UPSTREAM_MODELS: &[(&str, &str)] = &[
    (
        "claude-3-5-haiku-20241022",
        "anthropic.claude-3-5-haiku-20240620-v1:0",
    ),
    (
        "claude-3-5-sonnet-20240620",
        "anthropic.claude-3-5-sonnet-20240620-v1:0",
    ),
    // Claude 4 is only served through the US cross-region inference profile.
    (
        "claude-sonnet-4-20250514",
        "us.anthropic.claude-sonnet-4-20250514-v1:0",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModel {
    pub model: String,
}

impl fmt::Display for UnknownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown model '{}'", self.model)
    }
}

impl Error for UnknownModel {}

pub fn find_model(id: &str) -> Option<&'static ModelDescriptor> {
    MODEL_CATALOG.iter().find(|model| model.id == id)
}

/// Look up the upstream id for a catalog id, failing on a miss.
pub fn resolve_upstream_model(id: &str) -> Result<&'static str, UnknownModel> {
    UPSTREAM_MODELS
        .iter()
        .find(|(catalog_id, _)| *catalog_id == id)
        .map(|(_, upstream)| *upstream)
        .ok_or_else(|| UnknownModel {
            model: id.to_string(),
        })
}

/// Look up the upstream id for a catalog id, substituting
/// [`FALLBACK_UPSTREAM_MODEL`] on a miss.
pub fn upstream_model_or_default(id: &str) -> &'static str {
    match resolve_upstream_model(id) {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(%err, fallback = FALLBACK_UPSTREAM_MODEL, "using fallback upstream model");
            FALLBACK_UPSTREAM_MODEL
        }
    }
}
