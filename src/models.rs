//! Static model registry: which upstream serves a tag, and its token ceiling.

use std::collections::HashMap;

use serde::Serialize;

use crate::constants::{MODEL_ALIASES, MODEL_CREATED, MODEL_OWNER, MODELS};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    pub tag: String,
    pub url: String,
    pub max_tokens: i64,
}

impl ModelProfile {
    pub fn new(tag: impl Into<String>, url: impl Into<String>, max_tokens: i64) -> Self {
        Self {
            tag: tag.into(),
            url: url.into(),
            max_tokens,
        }
    }
}

/// Entry of the `/v1/models` listing
#[derive(Debug, Serialize)]
pub struct ModelObject {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

/// Immutable after startup; lookups never fail.
#[derive(Debug)]
pub struct ModelRegistry {
    profiles: Vec<ModelProfile>,
    aliases: HashMap<String, usize>,
    default_index: usize,
}

impl ModelRegistry {
    /// The GLM endpoints and client aliases this proxy ships with.
    pub fn builtin(default_tag: &str) -> Result<Self, ConfigError> {
        let profiles = MODELS
            .iter()
            .map(|(tag, url, max)| ModelProfile::new(*tag, *url, *max))
            .collect();
        Self::new(profiles, MODEL_ALIASES, default_tag)
    }

    /// Aliases pointing at unregistered tags are ignored.
    pub fn new(
        profiles: Vec<ModelProfile>,
        aliases: &[(&str, &str)],
        default_tag: &str,
    ) -> Result<Self, ConfigError> {
        let index_of = |tag: &str| profiles.iter().position(|p| p.tag == tag);

        let default_index = index_of(default_tag).ok_or_else(|| ConfigError::UnknownModel {
            tag: default_tag.to_string(),
            available: profiles.iter().map(|p| p.tag.clone()).collect(),
        })?;

        let aliases = aliases
            .iter()
            .filter_map(|(alias, target)| index_of(*target).map(|i| (alias.to_string(), i)))
            .collect();

        Ok(Self {
            profiles,
            aliases,
            default_index,
        })
    }

    /// Resolve a requested tag to the profile that will serve it.
    ///
    /// Absent, empty and unknown tags fall back to the default profile; the
    /// returned profile's `tag` is the effective model name.
    pub fn resolve(&self, tag: Option<&str>) -> &ModelProfile {
        let index = tag
            .filter(|t| !t.is_empty())
            .and_then(|t| {
                self.profiles
                    .iter()
                    .position(|p| p.tag == t)
                    .or_else(|| self.aliases.get(t).copied())
            })
            .unwrap_or(self.default_index);
        &self.profiles[index]
    }

    pub fn default_profile(&self) -> &ModelProfile {
        &self.profiles[self.default_index]
    }

    /// Registered tags in registry order (aliases excluded)
    pub fn tags(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.tag.as_str()).collect()
    }

    pub fn model_objects(&self) -> Vec<ModelObject> {
        self.profiles
            .iter()
            .map(|p| ModelObject {
                id: p.tag.clone(),
                object: "model",
                created: MODEL_CREATED,
                owned_by: MODEL_OWNER,
            })
            .collect()
    }
}
