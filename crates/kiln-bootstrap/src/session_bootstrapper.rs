use kiln_provider::{compose_provider_address, CredentialField, CredentialSet};

use crate::{
    ActiveTask, BootstrapConfig, BootstrapError, BootstrapServices, BranchDecision, HookRunner,
    LaunchMode, LaunchRequest, ProviderBranchEvaluator, ProvisioningLauncher, Session,
    SessionPhase,
};

pub const CLOUD_CREATION_SCREEN: &str = "Cloud Creation";
pub const CREDENTIAL_PROMPT_HEADER: &str = "New cloud setup";

/// Entry point driving one session from provider check to hook completion.
///
/// `start` and `finish` never block on provisioning; `wait_for_completion`
/// is the only consumer of the tasks they launch.
pub struct SessionBootstrapper {
    config: BootstrapConfig,
    services: BootstrapServices,
    session: Session,
}

impl SessionBootstrapper {
    pub fn new(config: BootstrapConfig, services: BootstrapServices, session: Session) -> Self {
        Self {
            config,
            services,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub async fn start(&mut self) -> SessionPhase {
        self.services.telemetry.track_screen(CLOUD_CREATION_SCREEN);
        let names = self.session.ensure_names(&self.config.app_name);
        tracing::debug!(
            provider = self.session.provider().name(),
            kind = self.session.provider().kind().as_str(),
            controller = %names.controller,
            model = %names.model,
            "session started"
        );
        self.session.advance(SessionPhase::ProviderCheck);

        let selection = self.session.provider().clone();
        let evaluator = ProviderBranchEvaluator::new(
            self.services.engine.as_ref(),
            &self.services.credentials,
            self.services.readiness.as_ref(),
        );
        match evaluator.evaluate(&selection).await {
            Ok(decision) => self.apply(decision),
            Err(error) => self.fail(error),
        }
        self.session.phase()
    }

    /// Credential-entry completion. `back` abandons this provider.
    pub async fn finish(
        &mut self,
        credentials: Option<Vec<CredentialField>>,
        back: bool,
    ) -> SessionPhase {
        if back {
            tracing::debug!(
                provider = self.session.provider().name(),
                "credential entry abandoned"
            );
            self.services.presenter.return_to_provider_selection();
            self.session.advance(SessionPhase::Start);
            return self.session.phase();
        }

        let selection = self.session.provider().clone();
        let submitted = match credentials {
            Some(fields) => match self.services.credentials.persist(&selection, &fields) {
                Ok(set) => Some(set),
                Err(source) => {
                    self.fail(BootstrapError::CredentialStore {
                        provider: selection.name().to_string(),
                        source,
                    });
                    return self.session.phase();
                }
            },
            None => None,
        };
        let stored = match self.services.credentials.lookup(&selection) {
            Ok(stored) => stored,
            Err(source) => {
                self.fail(BootstrapError::CredentialStore {
                    provider: selection.name().to_string(),
                    source,
                });
                return self.session.phase();
            }
        };

        let Some(credential) = stored.as_ref().or(submitted.as_ref()) else {
            self.fail(BootstrapError::CredentialsNotFound {
                provider: selection.name().to_string(),
                reason: "no credentials were submitted or stored".to_string(),
            });
            return self.session.phase();
        };
        let address_source = submitted.as_ref().unwrap_or(credential);
        let cloud = match self.cloud_argument(address_source) {
            Ok(cloud) => cloud,
            Err(error) => {
                self.fail(error);
                return self.session.phase();
            }
        };
        let credential_id = credential.id.clone();
        self.launch(LaunchMode::Bootstrap, cloud, Some(credential_id));
        self.session.phase()
    }

    /// Awaits the active task, runs its completion and, after a successful
    /// bootstrap, the post-bootstrap hook. Returns the final phase.
    pub async fn wait_for_completion(&mut self) -> SessionPhase {
        let launcher = ProvisioningLauncher::new(&self.config, &self.services);
        let outcome = match self.session.take_active_task() {
            ActiveTask::Idle => return self.session.phase(),
            ActiveTask::Launching(mode) => {
                tracing::warn!(mode = mode.as_str(), "launch marker without a task handle");
                return self.session.phase();
            }
            ActiveTask::AddModel(handle) => launcher
                .complete_add_model(&self.session, handle.wait().await)
                .map(|()| false),
            ActiveTask::Bootstrap(handle) => launcher
                .complete_bootstrap(&self.session, handle.wait().await)
                .map(|()| true),
        };

        match outcome {
            Ok(true) => self.run_hook().await,
            Ok(false) => self.session.advance(SessionPhase::Done),
            Err(error) => self.fail(error),
        }
        self.session.phase()
    }

    async fn run_hook(&mut self) {
        let runner = HookRunner::new(&self.config, &self.services);
        let result = match runner.start(&mut self.session).await {
            Ok(false) => {
                self.services.reporter().set_status("");
                Ok(())
            }
            Ok(true) => match self.session.hook_task.take() {
                Some(handle) => runner.complete(handle.wait().await).map(|_| ()),
                None => Ok(()),
            },
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => self.session.advance(SessionPhase::Done),
            Err(error) => self.fail(error),
        }
    }

    fn apply(&mut self, decision: BranchDecision) {
        match decision {
            BranchDecision::AddModel => {
                let cloud = self.session.provider().name().to_string();
                self.launch(LaunchMode::AddModel, cloud, None);
            }
            BranchDecision::PrecheckRequired { message } => {
                tracing::debug!(
                    provider = self.session.provider().name(),
                    "readiness pre-check required"
                );
                self.services.presenter.show_precheck(&message);
                self.session.advance(SessionPhase::PrecheckWait);
            }
            BranchDecision::Bootstrap { credential: None } => {
                let cloud = self.session.provider().name().to_string();
                self.launch(LaunchMode::Bootstrap, cloud, None);
            }
            BranchDecision::Bootstrap {
                credential: Some(credential),
            } => match self.cloud_argument(&credential) {
                Ok(cloud) => self.launch(LaunchMode::Bootstrap, cloud, Some(credential.id)),
                Err(error) => self.fail(error),
            },
            BranchDecision::PromptCredentials { schema } => {
                self.services.presenter.set_header(CREDENTIAL_PROMPT_HEADER);
                self.services.presenter.show_credential_prompt(&schema);
                self.services.reporter().set_status("");
                self.session.advance(SessionPhase::CredentialPrompt);
            }
        }
    }

    fn cloud_argument(&self, credentials: &CredentialSet) -> Result<String, BootstrapError> {
        let selection = self.session.provider();
        let address = compose_provider_address(selection, credentials).map_err(|error| {
            BootstrapError::CredentialsNotFound {
                provider: selection.name().to_string(),
                reason: format!("{error:#}"),
            }
        })?;
        Ok(address.unwrap_or_else(|| selection.name().to_string()))
    }

    fn launch(&mut self, mode: LaunchMode, cloud: String, credential: Option<String>) {
        let launcher = ProvisioningLauncher::new(&self.config, &self.services);
        let request = LaunchRequest {
            mode,
            cloud,
            credential,
        };
        if let Err(error) = launcher.launch(&mut self.session, request) {
            self.fail(error);
        }
    }

    fn fail(&mut self, error: BootstrapError) {
        self.services.reporter().report_error(&mut self.session, error);
        self.session.advance(SessionPhase::Error);
    }
}
