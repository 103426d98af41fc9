use std::sync::Arc;

use crate::{
    ActiveTask, AddModelRequest, BootstrapConfig, BootstrapError, BootstrapExit,
    BootstrapRequest, BootstrapServices, LaunchMode, Session, SessionPhase, TaskFailure,
};

pub const BOOTSTRAP_STARTED_STATUS: &str = "Bootstrapping controller in the background...";
pub const BOOTSTRAP_COMPLETE_STATUS: &str = "Bootstrap complete.";
pub const ADD_MODEL_STARTED_STATUS: &str = "Adding new model in the background...";
pub const ADD_MODEL_COMPLETE_STATUS: &str = "Add model complete.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub mode: LaunchMode,
    /// Provider name, or the composed `<provider>/<address>` for bare-metal.
    pub cloud: String,
    pub credential: Option<String>,
}

/// Starts the provisioning operation and interprets its completion.
pub struct ProvisioningLauncher<'a> {
    config: &'a BootstrapConfig,
    services: &'a BootstrapServices,
}

impl<'a> ProvisioningLauncher<'a> {
    pub fn new(config: &'a BootstrapConfig, services: &'a BootstrapServices) -> Self {
        Self { config, services }
    }

    /// Submits the engine call and returns without waiting on it.
    ///
    /// Returns `Ok(false)` when nothing was started: the error latch is set
    /// or the task queue refused the work.
    pub fn launch(
        &self,
        session: &mut Session,
        request: LaunchRequest,
    ) -> Result<bool, BootstrapError> {
        let names = session.ensure_names(&self.config.app_name);
        if session.showing_error() {
            tracing::warn!(
                controller = %names.controller,
                "launch refused while an error is displayed"
            );
            return Ok(false);
        }
        if session.active_task().is_active() {
            return Err(BootstrapError::TaskAlreadyActive {
                controller: names.controller,
            });
        }

        let reporter = self.services.reporter();
        let engine = Arc::clone(&self.services.engine);
        // busy before the engine is invoked; replaced by the handle, or Idle
        session.active_task = ActiveTask::Launching(request.mode);
        session.active_task = match request.mode {
            LaunchMode::Bootstrap => {
                reporter.set_status(BOOTSTRAP_STARTED_STATUS);
                let bootstrap = BootstrapRequest {
                    controller: names.controller.clone(),
                    cloud: request.cloud.clone(),
                    model: names.model.clone(),
                    credential: request.credential.clone(),
                    output_log: self.config.bootstrap_output_log(&names.controller),
                    error_log: self.config.bootstrap_error_log(&names.controller),
                };
                self.services
                    .tasks
                    .submit("bootstrap", async move { engine.bootstrap(bootstrap).await })
                    .map(ActiveTask::Bootstrap)
                    .unwrap_or_default()
            }
            LaunchMode::AddModel => {
                reporter.set_status(ADD_MODEL_STARTED_STATUS);
                let add_model = AddModelRequest {
                    model: names.model.clone(),
                    controller: names.controller.clone(),
                    cloud: request.cloud.clone(),
                };
                self.services
                    .tasks
                    .submit("add-model", async move { engine.add_model(add_model).await })
                    .map(ActiveTask::AddModel)
                    .unwrap_or_default()
            }
        };

        if !session.active_task().is_active() {
            tracing::warn!(
                mode = request.mode.as_str(),
                controller = %names.controller,
                "provisioning task was not started"
            );
            return Ok(false);
        }

        tracing::debug!(
            mode = request.mode.as_str(),
            controller = %names.controller,
            model = %names.model,
            cloud = %request.cloud,
            credential = request.credential.as_deref().unwrap_or(""),
            "provisioning task started"
        );
        session.advance(SessionPhase::Launch);
        self.services.presenter.enter_deploy();
        Ok(true)
    }

    /// Interprets a finished bootstrap. `Ok(())` means the hook stage may run.
    pub fn complete_bootstrap(
        &self,
        session: &Session,
        outcome: Result<BootstrapExit, TaskFailure>,
    ) -> Result<(), BootstrapError> {
        let exit = outcome?;
        let controller = session.controller().unwrap_or_default().to_string();
        if exit.return_code < 0 {
            return Err(BootstrapError::CancelledByUser {
                code: exit.return_code,
            });
        }
        if exit.return_code > 0 {
            let path = self.config.bootstrap_error_log(&controller);
            let log = match std::fs::read(&path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(error) => format!("unable to read {}: {error}", path.display()),
            };
            tracing::error!(
                controller = %controller,
                code = exit.return_code,
                log = %log,
                "controller bootstrap failed"
            );
            return Err(BootstrapError::ProvisioningFailed {
                controller,
                code: exit.return_code,
                log,
            });
        }

        tracing::debug!(controller = %controller, "controller bootstrapped");
        self.services.telemetry.track_event("Bootstrap", "Done", "");
        self.services.reporter().set_status(BOOTSTRAP_COMPLETE_STATUS);
        Ok(())
    }

    pub fn complete_add_model(
        &self,
        session: &Session,
        outcome: Result<(), TaskFailure>,
    ) -> Result<(), BootstrapError> {
        outcome?;
        tracing::debug!(
            model = session.model().unwrap_or_default(),
            "model added to shared controller"
        );
        self.services.telemetry.track_event("Add Model", "Done", "");
        self.services.reporter().set_status(ADD_MODEL_COMPLETE_STATUS);
        Ok(())
    }
}
