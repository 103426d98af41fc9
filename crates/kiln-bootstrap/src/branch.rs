use kiln_provider::{
    CloudLookupError, CredentialResolver, CredentialSchema, CredentialSet, ProviderKind,
    ProviderSelection,
};

use crate::{BootstrapError, ProvisioningEngine, ReadinessCheck};

/// Provisioning path chosen for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchDecision {
    /// Shared controller: attach a model, never bootstrap.
    AddModel,
    /// Local hypervisor is not ready; no task may start.
    PrecheckRequired { message: String },
    Bootstrap { credential: Option<CredentialSet> },
    PromptCredentials { schema: CredentialSchema },
}

pub struct ProviderBranchEvaluator<'a> {
    engine: &'a dyn ProvisioningEngine,
    credentials: &'a CredentialResolver,
    readiness: &'a dyn ReadinessCheck,
}

impl<'a> ProviderBranchEvaluator<'a> {
    pub fn new(
        engine: &'a dyn ProvisioningEngine,
        credentials: &'a CredentialResolver,
        readiness: &'a dyn ReadinessCheck,
    ) -> Self {
        Self {
            engine,
            credentials,
            readiness,
        }
    }

    pub async fn evaluate(
        &self,
        selection: &ProviderSelection,
    ) -> Result<BranchDecision, BootstrapError> {
        let policy = self.credentials.policy();
        if !policy.requires_bootstrap(selection.kind()) {
            tracing::debug!(provider = selection.name(), "shared controller; adding model");
            return Ok(BranchDecision::AddModel);
        }

        let registry_kind = match self.engine.describe_cloud(selection.name()).await {
            Ok(cloud) => Some(cloud.kind()),
            Err(CloudLookupError::NotFound(_))
                if policy.tolerates_missing_registry_entry(selection.kind()) =>
            {
                tracing::debug!(
                    provider = selection.name(),
                    kind = selection.kind().as_str(),
                    "cloud missing from registry; tolerated for kind"
                );
                None
            }
            Err(CloudLookupError::NotFound(_)) => {
                return Err(BootstrapError::UnknownProvider {
                    provider: selection.name().to_string(),
                    kind: selection.kind(),
                });
            }
            Err(error) => return Err(BootstrapError::RegistryUnavailable(error)),
        };

        if registry_kind == Some(ProviderKind::LocalHypervisor) {
            let readiness = self.readiness.check_ready().await;
            if !readiness.ready {
                return Ok(BranchDecision::PrecheckRequired {
                    message: readiness.message,
                });
            }
            return Ok(BranchDecision::Bootstrap { credential: None });
        }

        let stored = self
            .credentials
            .resolve(selection)
            .map_err(|source| BootstrapError::CredentialStore {
                provider: selection.name().to_string(),
                source,
            })?;
        if let Some(credential) = stored {
            return Ok(BranchDecision::Bootstrap {
                credential: Some(credential),
            });
        }

        let schema = self.credentials.schema(selection).map_err(|error| {
            BootstrapError::CredentialsNotFound {
                provider: selection.name().to_string(),
                reason: format!("{error:#}"),
            }
        })?;
        Ok(BranchDecision::PromptCredentials { schema })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kiln_provider::{
        BuiltinSchemaCatalog, CredentialField, CredentialResolver, CredentialSet,
        InMemoryCredentialStore, ProviderKind, ProviderPolicy, ProviderSelection,
    };

    use super::{BranchDecision, ProviderBranchEvaluator};
    use crate::{
        testing::{EngineCall, ScriptedEngine, StaticReadiness},
        BootstrapError,
    };

    fn resolver(store: Arc<InMemoryCredentialStore>) -> CredentialResolver {
        CredentialResolver::new(
            store,
            Arc::new(BuiltinSchemaCatalog::default()),
            ProviderPolicy::default(),
            "kiln",
        )
    }

    fn cached(provider: &str) -> Arc<InMemoryCredentialStore> {
        Arc::new(InMemoryCredentialStore::with_entry(
            provider,
            CredentialSet {
                id: format!("kiln-{provider}"),
                auth_type: "oauth1".to_string(),
                fields: vec![CredentialField::new("maas-server", "10.0.0.2")],
            },
        ))
    }

    #[tokio::test]
    async fn functional_shared_controller_never_touches_store_or_registry() {
        let store = cached("jaas");
        let resolver = resolver(store.clone());
        let engine = ScriptedEngine::new();
        let readiness = StaticReadiness::ready();
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let decision = evaluator
            .evaluate(&ProviderSelection::new("jaas", ProviderKind::SharedController))
            .await
            .expect("decision");

        assert_eq!(decision, BranchDecision::AddModel);
        assert_eq!(store.load_count(), 0);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn functional_local_hypervisor_not_ready_requires_precheck() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let resolver = resolver(store.clone());
        let engine = ScriptedEngine::new().with_cloud("localhost", "lxd");
        let readiness = StaticReadiness::not_ready("run: lxd init");
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let decision = evaluator
            .evaluate(&ProviderSelection::inferred("localhost"))
            .await
            .expect("decision");

        assert_eq!(
            decision,
            BranchDecision::PrecheckRequired {
                message: "run: lxd init".to_string()
            }
        );
        assert_eq!(store.load_count(), 0);
    }

    #[tokio::test]
    async fn functional_local_hypervisor_ready_bootstraps_without_credential() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let resolver = resolver(store.clone());
        let engine = ScriptedEngine::new().with_cloud("localhost", "lxd");
        let readiness = StaticReadiness::ready();
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let decision = evaluator
            .evaluate(&ProviderSelection::inferred("localhost"))
            .await
            .expect("decision");

        assert_eq!(decision, BranchDecision::Bootstrap { credential: None });
        assert_eq!(readiness.check_count(), 1);
        assert_eq!(store.load_count(), 0);
    }

    #[tokio::test]
    async fn functional_bare_metal_prompts_even_with_cached_credentials() {
        let store = cached("maas");
        let resolver = resolver(store.clone());
        let engine = ScriptedEngine::new();
        let readiness = StaticReadiness::ready();
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let decision = evaluator
            .evaluate(&ProviderSelection::inferred("maas"))
            .await
            .expect("decision");

        match decision {
            BranchDecision::PromptCredentials { schema } => {
                assert_eq!(schema.provider, "maas");
            }
            other => panic!("expected credential prompt, got {other:?}"),
        }
        assert_eq!(store.load_count(), 0);
        assert_eq!(
            engine.calls(),
            vec![EngineCall::DescribeCloud("maas".to_string())]
        );
    }

    #[tokio::test]
    async fn functional_cached_generic_credentials_are_reused() {
        let store = cached("aws");
        let resolver = resolver(store.clone());
        let engine = ScriptedEngine::new().with_cloud("aws", "ec2");
        let readiness = StaticReadiness::ready();
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let decision = evaluator
            .evaluate(&ProviderSelection::inferred("aws"))
            .await
            .expect("decision");

        match decision {
            BranchDecision::Bootstrap {
                credential: Some(credential),
            } => assert_eq!(credential.id, "kiln-aws"),
            other => panic!("expected bootstrap with credential, got {other:?}"),
        }
        assert_eq!(readiness.check_count(), 0);
    }

    #[tokio::test]
    async fn regression_unregistered_generic_cloud_is_unknown_provider() {
        let resolver = resolver(Arc::new(InMemoryCredentialStore::default()));
        let engine = ScriptedEngine::new();
        let readiness = StaticReadiness::ready();
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let error = evaluator
            .evaluate(&ProviderSelection::inferred("aws"))
            .await
            .expect_err("aws is not registered");

        assert!(matches!(
            error,
            BootstrapError::UnknownProvider {
                kind: ProviderKind::GenericCloud,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn regression_registry_outage_is_not_treated_as_not_found() {
        let resolver = resolver(Arc::new(InMemoryCredentialStore::default()));
        let engine = ScriptedEngine::new().with_registry_unavailable();
        let readiness = StaticReadiness::ready();
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let error = evaluator
            .evaluate(&ProviderSelection::inferred("maas"))
            .await
            .expect_err("registry offline");

        assert_eq!(error.kind(), "registry_unavailable");
    }

    #[tokio::test]
    async fn regression_missing_schema_reports_credentials_not_found() {
        let resolver = resolver(Arc::new(InMemoryCredentialStore::default()));
        let engine = ScriptedEngine::new().with_cloud("rackspace", "rackspace");
        let readiness = StaticReadiness::ready();
        let evaluator = ProviderBranchEvaluator::new(&engine, &resolver, &readiness);

        let error = evaluator
            .evaluate(&ProviderSelection::inferred("rackspace"))
            .await
            .expect_err("no schema");

        match error {
            BootstrapError::CredentialsNotFound { provider, .. } => {
                assert_eq!(provider, "rackspace")
            }
            other => panic!("expected CredentialsNotFound, got {other:?}"),
        }
    }
}
