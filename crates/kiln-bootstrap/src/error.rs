use kiln_provider::{CloudLookupError, ProviderKind};
use thiserror::Error;

use crate::{HookResult, TaskFailure};

/// Every failure the bootstrap flow can surface. All of them are terminal for
/// the session that produced them.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap killed by user: {code}")]
    CancelledByUser { code: i32 },

    #[error("controller '{controller}' failed to bootstrap (exit code {code})")]
    ProvisioningFailed {
        controller: String,
        code: i32,
        log: String,
    },

    #[error("post-bootstrap hook failed: {0}")]
    HookFailed(#[from] HookFailure),

    #[error("unable to find credentials for cloud, looking for '{provider}': {reason}")]
    CredentialsNotFound { provider: String, reason: String },

    #[error("unknown provider '{provider}' ({kind}): not a registered cloud")]
    UnknownProvider { provider: String, kind: ProviderKind },

    #[error(transparent)]
    RegistryUnavailable(CloudLookupError),

    #[error("unable to store credentials for '{provider}': {source}")]
    CredentialStore {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    TaskFailed(#[from] TaskFailure),

    #[error("a provisioning task is already running for controller '{controller}'")]
    TaskAlreadyActive { controller: String },
}

impl BootstrapError {
    /// Stable identifier used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            BootstrapError::CancelledByUser { .. } => "cancelled_by_user",
            BootstrapError::ProvisioningFailed { .. } => "provisioning_failed",
            BootstrapError::HookFailed(_) => "hook_failed",
            BootstrapError::CredentialsNotFound { .. } => "credentials_not_found",
            BootstrapError::UnknownProvider { .. } => "unknown_provider",
            BootstrapError::RegistryUnavailable(_) => "registry_unavailable",
            BootstrapError::CredentialStore { .. } => "credential_store",
            BootstrapError::TaskFailed(_) => "task_failed",
            BootstrapError::TaskAlreadyActive { .. } => "task_already_active",
        }
    }

    /// Captured bootstrap stderr, when the engine produced any.
    pub fn provisioning_log(&self) -> Option<&str> {
        match self {
            BootstrapError::ProvisioningFailed { log, .. } => Some(log.as_str()),
            _ => None,
        }
    }
}

/// Why the post-bootstrap hook stage failed.
#[derive(Debug, Error)]
pub enum HookFailure {
    #[error("unable to describe model '{model}': {source}")]
    ModelLookup {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("hook did not run to completion: {0}")]
    Execution(#[source] TaskFailure),

    #[error("hook exited with status {}: {stderr}", exit_status_label(.code))]
    ProcessExit { code: Option<i32>, stderr: String },

    #[error("hook output is not a valid result record ({source}): {raw}")]
    Decode {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("there was an error during the post bootstrap processing phase: {record}")]
    ReturnCode { record: HookResult },
}

fn exit_status_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

impl HookFailure {
    pub fn record(&self) -> Option<&HookResult> {
        match self {
            HookFailure::ReturnCode { record } => Some(record),
            _ => None,
        }
    }
}
