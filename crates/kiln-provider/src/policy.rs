use crate::ProviderKind;

/// Kinds allowed to be missing from the cloud registry.
///
/// Bare-metal endpoints are addressed as `<provider>/<address>` and have no
/// registry entry of their own. vSphere belongs here as well once the engine
/// stops reporting registered vSphere clouds as unknown.
pub const REGISTRY_LOOKUP_TOLERANT_KINDS: &[ProviderKind] = &[ProviderKind::BareMetal];

/// Kinds whose stored credentials are never reused.
///
/// A bare-metal server address cannot be cached reliably across sessions, so
/// the operator is always asked again.
pub const ALWAYS_REPROMPT_KINDS: &[ProviderKind] = &[ProviderKind::BareMetal];

/// Per-kind branching rules applied by the bootstrap flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPolicy {
    registry_lookup_tolerant: Vec<ProviderKind>,
    always_reprompt: Vec<ProviderKind>,
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self {
            registry_lookup_tolerant: REGISTRY_LOOKUP_TOLERANT_KINDS.to_vec(),
            always_reprompt: ALWAYS_REPROMPT_KINDS.to_vec(),
        }
    }
}

impl ProviderPolicy {
    pub fn new(
        registry_lookup_tolerant: Vec<ProviderKind>,
        always_reprompt: Vec<ProviderKind>,
    ) -> Self {
        Self {
            registry_lookup_tolerant,
            always_reprompt,
        }
    }

    pub fn tolerates_missing_registry_entry(&self, kind: ProviderKind) -> bool {
        self.registry_lookup_tolerant.contains(&kind)
    }

    pub fn always_reprompts(&self, kind: ProviderKind) -> bool {
        self.always_reprompt.contains(&kind)
    }

    /// Shared controllers are already bootstrapped; only a model is added.
    pub fn requires_bootstrap(&self, kind: ProviderKind) -> bool {
        kind != ProviderKind::SharedController
    }
}
