//! Credential records, store/schema contracts, and the resolver that applies
//! provider policy on top of them.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::{ProviderKind, ProviderPolicy, ProviderSelection};

/// One named credential value. Debug output never includes the value.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialField {
    pub key: String,
    pub value: String,
}

impl CredentialField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Debug for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialField")
            .field("key", &self.key)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Ordered credential fields plus the identifier the engine knows them by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSet {
    pub id: String,
    pub auth_type: String,
    pub fields: Vec<CredentialField>,
}

impl CredentialSet {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value.as_str())
    }

    pub fn first_value(&self) -> Option<&str> {
        self.fields.first().map(|field| field.value.as_str())
    }
}

/// A field the credential-entry flow must collect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaField {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub secret: bool,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl SchemaField {
    pub fn required(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            secret: false,
            required: true,
        }
    }

    pub fn secret(key: &str, label: &str) -> Self {
        Self {
            secret: true,
            ..Self::required(key, label)
        }
    }

    pub fn optional(key: &str, label: &str) -> Self {
        Self {
            required: false,
            ..Self::required(key, label)
        }
    }
}

/// Fields and auth type expected for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSchema {
    pub provider: String,
    pub auth_type: String,
    pub fields: Vec<SchemaField>,
}

impl CredentialSchema {
    /// Reorders `submitted` into schema order, rejecting unknown keys and
    /// missing required values.
    pub fn normalize(&self, submitted: &[CredentialField]) -> Result<Vec<CredentialField>> {
        let mut by_key = BTreeMap::new();
        for field in submitted {
            if !self.fields.iter().any(|schema| schema.key == field.key) {
                bail!(
                    "credential field '{}' is not part of the '{}' schema",
                    field.key,
                    self.provider
                );
            }
            by_key.insert(field.key.as_str(), field.value.trim());
        }

        let mut normalized = Vec::with_capacity(self.fields.len());
        for schema_field in &self.fields {
            match by_key.get(schema_field.key.as_str()) {
                Some(value) if !value.is_empty() => {
                    normalized.push(CredentialField::new(&schema_field.key, *value));
                }
                _ if schema_field.required => bail!(
                    "credential field '{}' ({}) is required for '{}'",
                    schema_field.key,
                    schema_field.label,
                    self.provider
                ),
                _ => {}
            }
        }
        Ok(normalized)
    }
}

/// Persistent credential storage keyed by provider name.
pub trait CredentialStore: Send + Sync {
    fn load(&self, provider: &str) -> Result<Option<CredentialSet>>;

    /// Overwrites any previous entry for `provider`.
    fn save(&self, provider: &str, credentials: &CredentialSet) -> Result<()>;
}

/// Source of per-provider credential schemas.
pub trait SchemaCatalog: Send + Sync {
    fn load_schema(&self, provider: &str) -> Result<CredentialSchema>;
}

/// In-memory store for tests and dry runs. Counts `load` calls.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: Mutex<BTreeMap<String, CredentialSet>>,
    loads: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn with_entry(provider: &str, credentials: CredentialSet) -> Self {
        let store = Self::default();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(provider.to_string(), credentials);
        }
        store
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BTreeMap<String, CredentialSet> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self, provider: &str) -> Result<Option<CredentialSet>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("in-memory credential store lock poisoned"))?;
        Ok(entries.get(provider).cloned())
    }

    fn save(&self, provider: &str, credentials: &CredentialSet) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("in-memory credential store lock poisoned"))?;
        entries.insert(provider.to_string(), credentials.clone());
        Ok(())
    }
}

/// Applies [`ProviderPolicy`] on top of a credential store and schema catalog.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    schemas: Arc<dyn SchemaCatalog>,
    policy: ProviderPolicy,
    id_prefix: String,
}

impl CredentialResolver {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        schemas: Arc<dyn SchemaCatalog>,
        policy: ProviderPolicy,
        id_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            schemas,
            policy,
            id_prefix: id_prefix.into(),
        }
    }

    pub fn policy(&self) -> &ProviderPolicy {
        &self.policy
    }

    /// Returns stored credentials when the provider's policy allows reuse.
    pub fn resolve(&self, selection: &ProviderSelection) -> Result<Option<CredentialSet>> {
        if self.policy.always_reprompts(selection.kind()) {
            tracing::debug!(
                provider = selection.name(),
                kind = selection.kind().as_str(),
                "stored credentials ignored by provider policy"
            );
            return Ok(None);
        }
        self.lookup(selection)
    }

    /// Returns stored credentials regardless of reuse policy.
    pub fn lookup(&self, selection: &ProviderSelection) -> Result<Option<CredentialSet>> {
        let found = self.store.load(selection.name())?;
        tracing::debug!(
            provider = selection.name(),
            found = found.is_some(),
            "credential store lookup"
        );
        Ok(found)
    }

    pub fn schema(&self, selection: &ProviderSelection) -> Result<CredentialSchema> {
        self.schemas.load_schema(selection.name())
    }

    /// Validates submitted fields against the schema and stores them,
    /// replacing any previous entry for the provider.
    pub fn persist(
        &self,
        selection: &ProviderSelection,
        submitted: &[CredentialField],
    ) -> Result<CredentialSet> {
        let schema = self.schema(selection)?;
        let fields = schema.normalize(submitted)?;
        let credentials = CredentialSet {
            id: self.credential_id(selection),
            auth_type: schema.auth_type,
            fields,
        };
        self.store.save(selection.name(), &credentials)?;
        tracing::debug!(
            provider = selection.name(),
            credential = %credentials.id,
            field_count = credentials.fields.len(),
            "credentials persisted"
        );
        Ok(credentials)
    }

    pub fn credential_id(&self, selection: &ProviderSelection) -> String {
        format!("{}-{}", self.id_prefix, selection.name())
    }
}

/// For bare-metal providers, composes `<provider>/<address>` from the first
/// submitted field. Other kinds bootstrap against the bare provider name.
pub fn compose_provider_address(
    selection: &ProviderSelection,
    credentials: &CredentialSet,
) -> Result<Option<String>> {
    if selection.kind() != ProviderKind::BareMetal {
        return Ok(None);
    }
    let address = credentials
        .first_value()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "credentials for '{}' do not include a server address",
                selection.name()
            )
        })?;
    Ok(Some(format!("{}/{}", selection.name(), address)))
}
