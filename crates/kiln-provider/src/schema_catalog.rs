use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::{CredentialSchema, SchemaCatalog, SchemaField};

/// Credential schemas for the providers kiln knows how to prompt for.
///
/// The first field of the bare-metal schema is the server address; the
/// bootstrap flow composes `<provider>/<address>` from it.
#[derive(Debug, Clone)]
pub struct BuiltinSchemaCatalog {
    schemas: BTreeMap<String, CredentialSchema>,
}

impl Default for BuiltinSchemaCatalog {
    fn default() -> Self {
        let mut catalog = Self {
            schemas: BTreeMap::new(),
        };
        catalog.insert(
            "aws",
            "access-key",
            vec![
                SchemaField::required("access-key", "AWS access key"),
                SchemaField::secret("secret-key", "AWS secret key"),
            ],
        );
        catalog.insert(
            "azure",
            "service-principal-secret",
            vec![
                SchemaField::required("application-id", "Application ID"),
                SchemaField::required("subscription-id", "Subscription ID"),
                SchemaField::secret("application-password", "Application password"),
            ],
        );
        catalog.insert(
            "google",
            "oauth2",
            vec![
                SchemaField::required("project-id", "Project ID"),
                SchemaField::required("client-email", "Client e-mail"),
                SchemaField::required("client-id", "Client ID"),
                SchemaField::secret("private-key", "Private key"),
            ],
        );
        catalog.insert(
            "maas",
            "oauth1",
            vec![
                SchemaField::required("maas-server", "MAAS server address"),
                SchemaField::secret("maas-oauth", "MAAS API key"),
            ],
        );
        catalog.insert(
            "openstack",
            "userpass",
            vec![
                SchemaField::required("auth-url", "Keystone URL"),
                SchemaField::required("username", "Username"),
                SchemaField::secret("password", "Password"),
                SchemaField::required("tenant-name", "Project name"),
                SchemaField::optional("domain-name", "Domain name"),
            ],
        );
        catalog.insert(
            "vsphere",
            "userpass",
            vec![
                SchemaField::required("vsphere-endpoint", "vCenter address"),
                SchemaField::required("user", "Username"),
                SchemaField::secret("password", "Password"),
            ],
        );
        catalog.insert(
            "cloudsigma",
            "userpass",
            vec![
                SchemaField::required("username", "Username"),
                SchemaField::secret("password", "Password"),
            ],
        );
        catalog.insert(
            "joyent",
            "userpass",
            vec![
                SchemaField::required("sdc-user", "SDC user"),
                SchemaField::required("sdc-key-id", "SDC key ID"),
                SchemaField::secret("private-key", "Private key"),
                SchemaField::optional("algorithm", "Signing algorithm"),
            ],
        );
        catalog
    }
}

impl BuiltinSchemaCatalog {
    fn insert(&mut self, provider: &str, auth_type: &str, fields: Vec<SchemaField>) {
        self.schemas.insert(
            provider.to_string(),
            CredentialSchema {
                provider: provider.to_string(),
                auth_type: auth_type.to_string(),
                fields,
            },
        );
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

impl SchemaCatalog for BuiltinSchemaCatalog {
    fn load_schema(&self, provider: &str) -> Result<CredentialSchema> {
        self.schemas
            .get(provider)
            .cloned()
            .ok_or_else(|| anyhow!("no credential schema registered for provider '{provider}'"))
    }
}
