//! File-backed credential store.
//!
//! Entries are stored per provider in a schema-versioned JSON document. With
//! keyed encryption every field value is sealed with AES-256-GCM under a key
//! derived from the operator passphrase or, when none is configured, from
//! machine identity.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use kiln_core::{current_unix_timestamp, write_text_atomic};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CredentialField, CredentialSet, CredentialStore, CredentialStoreEncryptionMode};

const CREDENTIAL_STORE_SCHEMA_VERSION: u32 = 1;
const SEALED_VALUE_PREFIX: &str = "sealed:v1:";
const AES_GCM_NONCE_BYTES: usize = 12;
const AES_GCM_AAD: &[u8] = b"kiln-credential-store-v1";
const MACHINE_KEY_CONTEXT: &str = "kiln-credential-store-machine-key-v1";
const MACHINE_ID_CANDIDATE_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialStoreFile {
    schema_version: u32,
    encryption: CredentialStoreEncryptionMode,
    #[serde(default)]
    providers: BTreeMap<String, StoredCredentialSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredentialSet {
    id: String,
    auth_type: String,
    fields: Vec<CredentialField>,
    #[serde(default)]
    updated_unix: Option<u64>,
}

/// [`CredentialStore`] persisted to a single JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    encryption: CredentialStoreEncryptionMode,
    key: Option<String>,
}

impl FileCredentialStore {
    pub fn new(
        path: impl Into<PathBuf>,
        encryption: CredentialStoreEncryptionMode,
        key: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            encryption,
            key: key.filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<CredentialStoreFile> {
        if !self.path.exists() {
            return Ok(CredentialStoreFile {
                schema_version: CREDENTIAL_STORE_SCHEMA_VERSION,
                encryption: self.encryption,
                providers: BTreeMap::new(),
            });
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read credential store {}", self.path.display()))?;
        let parsed = serde_json::from_str::<CredentialStoreFile>(&raw)
            .with_context(|| format!("failed to parse credential store {}", self.path.display()))?;
        if parsed.schema_version != CREDENTIAL_STORE_SCHEMA_VERSION {
            bail!(
                "unsupported credential store schema_version {} in {} (expected {})",
                parsed.schema_version,
                self.path.display(),
                CREDENTIAL_STORE_SCHEMA_VERSION
            );
        }
        Ok(parsed)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, provider: &str) -> Result<Option<CredentialSet>> {
        tracing::debug!(
            credential_store = %self.path.display(),
            provider,
            "loading provider credentials"
        );
        let file = self.read_file()?;
        let Some(stored) = file.providers.get(provider) else {
            return Ok(None);
        };
        let fields = stored
            .fields
            .iter()
            .map(|field| {
                open_value(&field.value, file.encryption, self.key.as_deref())
                    .map(|value| CredentialField::new(&field.key, value))
                    .with_context(|| {
                        format!(
                            "credential store entry '{provider}' field '{}' is invalid or corrupted",
                            field.key
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(CredentialSet {
            id: stored.id.clone(),
            auth_type: stored.auth_type.clone(),
            fields,
        }))
    }

    fn save(&self, provider: &str, credentials: &CredentialSet) -> Result<()> {
        let mut file = self.read_file()?;
        let fields = credentials
            .fields
            .iter()
            .map(|field| {
                seal_value(&field.value, file.encryption, self.key.as_deref())
                    .map(|value| CredentialField::new(&field.key, value))
                    .with_context(|| {
                        format!(
                            "failed to encode credential store entry '{provider}' field '{}'",
                            field.key
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        file.providers.insert(
            provider.to_string(),
            StoredCredentialSet {
                id: credentials.id.clone(),
                auth_type: credentials.auth_type.clone(),
                fields,
                updated_unix: Some(current_unix_timestamp()),
            },
        );

        tracing::debug!(
            credential_store = %self.path.display(),
            encryption = ?file.encryption,
            provider,
            provider_entries = file.providers.len(),
            "saving provider credentials"
        );
        let mut encoded =
            serde_json::to_string_pretty(&file).context("failed to encode credential store")?;
        encoded.push('\n');
        write_text_atomic(&self.path, &encoded)
    }
}

fn derive_key_material(key: Option<&str>) -> Result<[u8; 32]> {
    let key_seed = match key.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => {
            if value.len() < 8 {
                bail!("credential store key must be at least 8 characters");
            }
            value.to_string()
        }
        None => machine_key_seed(),
    };
    let digest = Sha256::digest(key_seed.as_bytes());
    let mut material = [0u8; 32];
    material.copy_from_slice(&digest);
    Ok(material)
}

fn machine_key_seed() -> String {
    let mut segments = vec![
        MACHINE_KEY_CONTEXT.to_string(),
        format!("os={}", std::env::consts::OS),
        format!("arch={}", std::env::consts::ARCH),
    ];
    for variable in ["HOSTNAME", "USER", "HOME"] {
        if let Ok(value) = std::env::var(variable) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                segments.push(format!("{variable}={trimmed}"));
            }
        }
    }
    let machine_id = MACHINE_ID_CANDIDATE_PATHS.iter().find_map(|path| {
        std::fs::read_to_string(path)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    });
    if let Some(machine_id) = machine_id {
        segments.push(format!("machine_id={machine_id}"));
    }
    segments.join("|")
}

/// Encodes a field value for storage according to `mode`.
pub fn seal_value(
    value: &str,
    mode: CredentialStoreEncryptionMode,
    key: Option<&str>,
) -> Result<String> {
    if value.trim().is_empty() {
        bail!("credential value must not be empty");
    }
    match mode {
        CredentialStoreEncryptionMode::None => Ok(value.to_string()),
        CredentialStoreEncryptionMode::Keyed => {
            let key_material = derive_key_material(key)?;
            let cipher = Aes256Gcm::new_from_slice(&key_material)
                .map_err(|_| anyhow!("credential key material has invalid length"))?;
            let mut nonce = [0u8; AES_GCM_NONCE_BYTES];
            use aes_gcm::aead::rand_core::RngCore as _;
            OsRng.fill_bytes(&mut nonce);
            let ciphertext = cipher
                .encrypt(
                    (&nonce).into(),
                    Payload {
                        msg: value.as_bytes(),
                        aad: AES_GCM_AAD,
                    },
                )
                .map_err(|_| anyhow!("credential value encryption failed"))?;
            let mut payload = Vec::with_capacity(AES_GCM_NONCE_BYTES + ciphertext.len());
            payload.extend_from_slice(&nonce);
            payload.extend_from_slice(&ciphertext);
            Ok(format!(
                "{SEALED_VALUE_PREFIX}{}",
                BASE64_STANDARD.encode(payload)
            ))
        }
    }
}

/// Decodes a stored field value written by [`seal_value`].
pub fn open_value(
    encoded: &str,
    mode: CredentialStoreEncryptionMode,
    key: Option<&str>,
) -> Result<String> {
    match mode {
        CredentialStoreEncryptionMode::None => {
            if encoded.trim().is_empty() {
                bail!("credential value must not be empty");
            }
            Ok(encoded.to_string())
        }
        CredentialStoreEncryptionMode::Keyed => {
            let payload = encoded
                .strip_prefix(SEALED_VALUE_PREFIX)
                .ok_or_else(|| anyhow!("credential payload prefix is invalid"))?;
            let key_material = derive_key_material(key)?;
            let cipher = Aes256Gcm::new_from_slice(&key_material)
                .map_err(|_| anyhow!("credential key material has invalid length"))?;
            let raw = BASE64_STANDARD
                .decode(payload)
                .map_err(|_| anyhow!("credential payload encoding is invalid"))?;
            if raw.len() <= AES_GCM_NONCE_BYTES {
                bail!("credential payload is truncated");
            }
            let (nonce, ciphertext) = raw.split_at(AES_GCM_NONCE_BYTES);
            let plaintext = cipher
                .decrypt(
                    nonce.into(),
                    Payload {
                        msg: ciphertext,
                        aad: AES_GCM_AAD,
                    },
                )
                .map_err(|_| anyhow!("credential payload integrity check failed"))?;
            String::from_utf8(plaintext)
                .map_err(|_| anyhow!("credential payload is not valid UTF-8"))
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::{open_value, seal_value, FileCredentialStore, BASE64_STANDARD};
    use crate::{CredentialField, CredentialSet, CredentialStore, CredentialStoreEncryptionMode};

    fn aws_credentials() -> CredentialSet {
        CredentialSet {
            id: "kiln-aws".to_string(),
            auth_type: "access-key".to_string(),
            fields: vec![
                CredentialField::new("access-key", "AKIAEXAMPLE"),
                CredentialField::new("secret-key", "wJalrXUtnFEMI"),
            ],
        }
    }

    #[test]
    fn functional_keyed_store_round_trips_without_plaintext_on_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("credentials.json");
        let store = FileCredentialStore::new(
            &path,
            CredentialStoreEncryptionMode::Keyed,
            Some("correct-horse-battery".to_string()),
        );
        store.save("aws", &aws_credentials()).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read raw");
        assert!(!raw.contains("wJalrXUtnFEMI"));
        assert!(raw.contains("sealed:v1:"));

        let loaded = store.load("aws").expect("load").expect("entry");
        assert_eq!(loaded, aws_credentials());
        assert!(store.load("gce").expect("load").is_none());
    }

    #[test]
    fn functional_save_overwrites_existing_provider_entry() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(
            temp.path().join("credentials.json"),
            CredentialStoreEncryptionMode::None,
            None,
        );
        store.save("aws", &aws_credentials()).expect("first save");
        let mut updated = aws_credentials();
        updated.fields[1].value = "rotated".to_string();
        store.save("aws", &updated).expect("second save");
        let loaded = store.load("aws").expect("load").expect("entry");
        assert_eq!(loaded.field("secret-key"), Some("rotated"));
    }

    #[test]
    fn regression_tampered_sealed_value_fails_closed() {
        let sealed = seal_value(
            "token",
            CredentialStoreEncryptionMode::Keyed,
            Some("store-passphrase"),
        )
        .expect("seal");
        let payload = sealed.strip_prefix("sealed:v1:").expect("sealed prefix");
        let mut raw = BASE64_STANDARD.decode(payload).expect("base64 payload");
        let last = raw.last_mut().expect("ciphertext byte");
        *last ^= 0x5A;
        let tampered = format!("sealed:v1:{}", BASE64_STANDARD.encode(raw));
        let error = open_value(
            &tampered,
            CredentialStoreEncryptionMode::Keyed,
            Some("store-passphrase"),
        )
        .expect_err("tampered payload");
        assert!(
            error.to_string().contains("integrity check failed"),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn regression_unsupported_schema_version_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"schema_version":9,"encryption":"none","providers":{}}"#,
        )
        .expect("write");
        let store = FileCredentialStore::new(&path, CredentialStoreEncryptionMode::None, None);
        let error = store.load("aws").expect_err("schema mismatch");
        assert!(error.to_string().contains("schema_version 9"));
    }
}
