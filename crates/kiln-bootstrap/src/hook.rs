use std::{collections::BTreeMap, fmt, path::Path, process::Stdio, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::{Child, Command};

use crate::{
    BootstrapConfig, BootstrapError, BootstrapServices, HookFailure, Session, SessionPhase,
    TaskFailure,
};

pub const HOOK_STARTED_STATUS: &str = "Running post-bootstrap tasks...";
pub const HOOK_ENV_PROVIDER_TYPE: &str = "PROVIDERTYPE";
pub const HOOK_ENV_CONTROLLER: &str = "CONTROLLER";
pub const HOOK_ENV_MODEL: &str = "MODEL";

/// The single JSON record a post-bootstrap hook prints on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
    #[serde(rename = "returnCode")]
    pub return_code: i64,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl fmt::Display for HookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

/// Raw process outcome of a hook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub struct HookRunner<'a> {
    config: &'a BootstrapConfig,
    services: &'a BootstrapServices,
}

impl<'a> HookRunner<'a> {
    pub fn new(config: &'a BootstrapConfig, services: &'a BootstrapServices) -> Self {
        Self { config, services }
    }

    /// Seeds the hook environment and spawns the hook if the spell ships an
    /// executable one. Returns whether a hook task was started.
    pub async fn start(&self, session: &mut Session) -> Result<bool, BootstrapError> {
        let names = session.ensure_names(&self.config.app_name);
        let model = self
            .services
            .engine
            .describe_model(&names.model)
            .await
            .map_err(|source| HookFailure::ModelLookup {
                model: names.model.clone(),
                source,
            })?;
        session
            .hook_env
            .insert(HOOK_ENV_PROVIDER_TYPE.to_string(), model.provider_type);
        session
            .hook_env
            .insert(HOOK_ENV_CONTROLLER.to_string(), names.controller.clone());
        session
            .hook_env
            .insert(HOOK_ENV_MODEL.to_string(), names.model.clone());

        let hook_path = self.config.post_bootstrap_hook_path();
        if !is_executable_file(&hook_path) {
            tracing::debug!(
                hook = %hook_path.display(),
                "no executable post-bootstrap hook; skipping"
            );
            return Ok(false);
        }

        self.services.reporter().set_status(HOOK_STARTED_STATUS);
        self.services
            .telemetry
            .track_event("Post-Bootstrap", "Started", "");

        let mut command = Command::new(&hook_path);
        command
            .current_dir(self.config.spell_dir())
            .envs(session.hook_env.clone())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let label = hook_path.display().to_string();
        let Some(handle) = self
            .services
            .tasks
            .submit("post-bootstrap", run_hook(command, label))
        else {
            tracing::warn!(
                hook = %hook_path.display(),
                "task queue refused post-bootstrap hook; hook not run"
            );
            return Ok(false);
        };

        tracing::debug!(
            hook = %hook_path.display(),
            controller = %names.controller,
            "post-bootstrap hook started"
        );
        session.hook_task = Some(handle);
        session.advance(SessionPhase::Hook);
        Ok(true)
    }

    /// Interprets a finished hook run.
    pub fn complete(
        &self,
        outcome: Result<HookOutput, TaskFailure>,
    ) -> Result<HookResult, BootstrapError> {
        let output = outcome.map_err(HookFailure::Execution)?;
        if !output.success {
            return Err(HookFailure::ProcessExit {
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }

        let raw = output.stdout.trim();
        let record = serde_json::from_str::<HookResult>(raw).map_err(|source| {
            HookFailure::Decode {
                raw: raw.to_string(),
                source,
            }
        })?;
        if record.return_code > 0 {
            self.services
                .telemetry
                .track_exception("Error in Post-Bootstrap");
            return Err(HookFailure::ReturnCode { record }.into());
        }

        tracing::debug!(record = %record, "post-bootstrap hook finished");
        self.services.telemetry.track_event("Post-Bootstrap", "Done", "");
        self.services.reporter().set_status("");
        Ok(record)
    }
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

async fn run_hook(mut command: Command, label: String) -> Result<HookOutput> {
    let child = spawn_with_text_file_busy_retry(&mut command, &label).await?;
    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("failed to wait for post-bootstrap hook '{label}'"))?;
    Ok(HookOutput {
        code: output.status.code(),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Freshly written scripts can briefly fail to exec with ETXTBSY.
pub(crate) async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<Child> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    for attempt in 0..=MAX_TEXT_FILE_BUSY_RETRIES {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error) => {
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES
                {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    continue;
                }
                return Err(anyhow!("failed to spawn '{executable}': {error}"));
            }
        }
    }

    Err(anyhow!("failed to spawn '{executable}': unknown error"))
}
