//! Narrow contracts for the services the bootstrap flow drives but does not own.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use kiln_provider::{CloudInfo, CloudLookupError, CredentialResolver, CredentialSchema, ModelInfo};

use crate::{BootstrapError, StatusReporter, TaskQueue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub controller: String,
    /// Provider name, or `<provider>/<address>` for bare-metal.
    pub cloud: String,
    pub model: String,
    pub credential: Option<String>,
    pub output_log: PathBuf,
    pub error_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddModelRequest {
    pub model: String,
    pub controller: String,
    pub cloud: String,
}

/// Negative: cancelled by the user. Zero: success. Positive: failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapExit {
    pub return_code: i32,
}

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Bootstraps a controller. Stderr must land in `request.error_log`.
    async fn bootstrap(&self, request: BootstrapRequest) -> Result<BootstrapExit>;

    async fn add_model(&self, request: AddModelRequest) -> Result<()>;

    async fn describe_model(&self, model: &str) -> Result<ModelInfo>;

    async fn describe_cloud(&self, name: &str) -> Result<CloudInfo, CloudLookupError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    /// Remediation shown to the operator when not ready.
    pub message: String,
}

impl Readiness {
    pub fn ready() -> Self {
        Self {
            ready: true,
            message: String::new(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check_ready(&self) -> Readiness;
}

/// Operator-facing surface. Calls are fire-and-forget.
pub trait Presenter: Send + Sync {
    /// Empty text clears the status line.
    fn set_status(&self, text: &str);
    fn show_error(&self, error: &BootstrapError);
    fn set_header(&self, title: &str);
    fn show_credential_prompt(&self, schema: &CredentialSchema);
    fn show_precheck(&self, message: &str);
    fn enter_deploy(&self);
    fn return_to_provider_selection(&self);
}

pub trait Telemetry: Send + Sync {
    fn track_event(&self, category: &str, action: &str, label: &str);
    fn track_exception(&self, description: &str);
    fn track_screen(&self, name: &str);
}

/// Everything one session needs from the outside world.
#[derive(Clone)]
pub struct BootstrapServices {
    pub engine: Arc<dyn ProvisioningEngine>,
    pub credentials: CredentialResolver,
    pub readiness: Arc<dyn ReadinessCheck>,
    pub presenter: Arc<dyn Presenter>,
    pub telemetry: Arc<dyn Telemetry>,
    pub tasks: TaskQueue,
}

impl BootstrapServices {
    pub fn reporter(&self) -> StatusReporter {
        StatusReporter::new(Arc::clone(&self.presenter), Arc::clone(&self.telemetry))
    }
}
