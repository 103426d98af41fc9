use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProviderKind;

/// Registry entry for a known cloud.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloudInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub cloud_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
}

impl CloudInfo {
    pub fn new(name: impl Into<String>, cloud_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud_type: cloud_type.into(),
            endpoint: None,
            regions: Vec::new(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        ProviderKind::from_registry_type(&self.cloud_type)
    }
}

/// Metadata of an existing model, used to seed the hook environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "provider-type")]
    pub provider_type: String,
}

/// Outcome of a failed cloud registry lookup.
///
/// `NotFound` is the only variant the bootstrap flow may tolerate, and only
/// for kinds listed in [`crate::REGISTRY_LOOKUP_TOLERANT_KINDS`].
#[derive(Debug, Error)]
pub enum CloudLookupError {
    #[error("unable to locate cloud '{0}'")]
    NotFound(String),
    #[error("cloud registry unavailable while looking up '{provider}': {source}")]
    Unavailable {
        provider: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CloudLookupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudLookupError::NotFound(_))
    }
}
