use std::fmt;

use kiln_cli::{CliCredentialStoreEncryptionMode, CliProviderKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
/// Closed set of provider kinds the bootstrap flow branches on.
pub enum ProviderKind {
    GenericCloud,
    LocalHypervisor,
    BareMetal,
    SharedController,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::GenericCloud => "generic-cloud",
            ProviderKind::LocalHypervisor => "local-hypervisor",
            ProviderKind::BareMetal => "bare-metal",
            ProviderKind::SharedController => "shared-controller",
        }
    }

    /// Infers the kind from a well-known provider name.
    pub fn infer_from_name(provider: &str) -> Self {
        match provider.trim().to_ascii_lowercase().as_str() {
            "localhost" | "lxd" => ProviderKind::LocalHypervisor,
            "maas" => ProviderKind::BareMetal,
            "jaas" => ProviderKind::SharedController,
            _ => ProviderKind::GenericCloud,
        }
    }

    /// Returns `None` for `auto`, leaving the choice to [`ProviderKind::infer_from_name`].
    pub fn from_cli(kind: CliProviderKind) -> Option<Self> {
        match kind {
            CliProviderKind::Auto => None,
            CliProviderKind::GenericCloud => Some(ProviderKind::GenericCloud),
            CliProviderKind::LocalHypervisor => Some(ProviderKind::LocalHypervisor),
            CliProviderKind::BareMetal => Some(ProviderKind::BareMetal),
            CliProviderKind::SharedController => Some(ProviderKind::SharedController),
        }
    }

    /// Maps a registry `type` value (as reported by the engine) onto a kind.
    pub fn from_registry_type(cloud_type: &str) -> Self {
        match cloud_type.trim().to_ascii_lowercase().as_str() {
            "lxd" => ProviderKind::LocalHypervisor,
            "maas" => ProviderKind::BareMetal,
            _ => ProviderKind::GenericCloud,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The provider chosen for a session. Never mutated once the session starts.
pub struct ProviderSelection {
    name: String,
    kind: ProviderKind,
}

impl ProviderSelection {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Builds a selection whose kind is inferred from the provider name.
    pub fn inferred(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = ProviderKind::infer_from_name(&name);
        Self { name, kind }
    }

    /// Resolves the CLI kind flag, falling back to name inference for `auto`.
    pub fn from_cli(name: &str, kind: CliProviderKind) -> Self {
        match ProviderKind::from_cli(kind) {
            Some(kind) => Self::new(name, kind),
            None => Self::inferred(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStoreEncryptionMode {
    None,
    Keyed,
}

impl From<CliCredentialStoreEncryptionMode> for CredentialStoreEncryptionMode {
    fn from(value: CliCredentialStoreEncryptionMode) -> Self {
        match value {
            CliCredentialStoreEncryptionMode::None => CredentialStoreEncryptionMode::None,
            CliCredentialStoreEncryptionMode::Keyed | CliCredentialStoreEncryptionMode::Auto => {
                CredentialStoreEncryptionMode::Keyed
            }
        }
    }
}
