use std::{fs::File, process::Stdio};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use kiln_provider::{CloudInfo, CloudLookupError, ModelInfo};
use serde_json::Value;
use tokio::process::Command;

use crate::{
    hook::spawn_with_text_file_busy_retry, AddModelRequest, BootstrapExit, BootstrapRequest,
    ProvisioningEngine,
};

/// Provisioning engine backed by a juju-compatible command line binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProvisioningEngine {
    executable: String,
}

impl CommandProvisioningEngine {
    pub fn new(executable: impl Into<String>) -> Result<Self> {
        let executable = executable.into();
        if executable.trim().is_empty() {
            bail!("provisioning engine executable is empty");
        }
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command
    }

    /// Runs a query subcommand and returns its stdout.
    async fn query(&self, args: &[&str]) -> Result<String> {
        let mut command = self.command();
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        let child = spawn_with_text_file_busy_retry(&mut command, &self.executable).await?;
        let output = child.wait_with_output().await.with_context(|| {
            format!("{} {} did not complete", self.executable, args.join(" "))
        })?;
        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|value| value.to_string())
                .unwrap_or_else(|| "signal".to_string());
            bail!(
                "{} {} failed with status {status}: {}",
                self.executable,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub fn bootstrap_arguments(request: &BootstrapRequest) -> Vec<String> {
    let mut args = vec![
        "bootstrap".to_string(),
        request.cloud.clone(),
        request.controller.clone(),
        "--config".to_string(),
        "image-stream=daily".to_string(),
        "--config".to_string(),
        "enable-os-upgrade=false".to_string(),
        "--default-model".to_string(),
        request.model.clone(),
    ];
    if let Some(credential) = &request.credential {
        args.push("--credential".to_string());
        args.push(credential.clone());
    }
    args
}

#[async_trait]
impl ProvisioningEngine for CommandProvisioningEngine {
    async fn bootstrap(&self, request: BootstrapRequest) -> Result<BootstrapExit> {
        for log in [&request.output_log, &request.error_log] {
            if let Some(parent) = log.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let stdout = File::create(&request.output_log)
            .with_context(|| format!("failed to create {}", request.output_log.display()))?;
        let stderr = File::create(&request.error_log)
            .with_context(|| format!("failed to create {}", request.error_log.display()))?;

        let mut command = self.command();
        command.args(bootstrap_arguments(&request));
        command.stdout(Stdio::from(stdout));
        command.stderr(Stdio::from(stderr));
        tracing::debug!(
            engine = %self.executable,
            controller = %request.controller,
            cloud = %request.cloud,
            "running bootstrap"
        );
        let mut child = spawn_with_text_file_busy_retry(&mut command, &self.executable).await?;
        let status = child
            .wait()
            .await
            .with_context(|| format!("failed to wait for {} bootstrap", self.executable))?;
        Ok(BootstrapExit {
            return_code: exit_code(status),
        })
    }

    async fn add_model(&self, request: AddModelRequest) -> Result<()> {
        self.query(&[
            "add-model",
            &request.model,
            &request.cloud,
            "--controller",
            &request.controller,
        ])
        .await?;
        Ok(())
    }

    async fn describe_model(&self, model: &str) -> Result<ModelInfo> {
        let stdout = self.query(&["show-model", model, "--format", "json"]).await?;
        parse_show_model(model, &stdout)
    }

    async fn describe_cloud(&self, name: &str) -> Result<CloudInfo, CloudLookupError> {
        let stdout = self
            .query(&["list-clouds", "--format", "json"])
            .await
            .map_err(|source| CloudLookupError::Unavailable {
                provider: name.to_string(),
                source,
            })?;
        parse_cloud_listing(name, &stdout)
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

fn parse_show_model(model: &str, stdout: &str) -> Result<ModelInfo> {
    let value = serde_json::from_str::<Value>(stdout.trim())
        .with_context(|| format!("show-model output for '{model}' is not json"))?;
    let entry = value
        .as_object()
        .and_then(|models| models.values().next())
        .ok_or_else(|| anyhow!("show-model returned no entry for '{model}'"))?;
    let provider_type = entry
        .get("provider-type")
        .or_else(|| entry.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("model '{model}' has no provider type"))?;
    Ok(ModelInfo {
        name: entry
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(model)
            .to_string(),
        provider_type: provider_type.to_string(),
    })
}

fn parse_cloud_listing(name: &str, stdout: &str) -> Result<CloudInfo, CloudLookupError> {
    let unavailable = |source: anyhow::Error| CloudLookupError::Unavailable {
        provider: name.to_string(),
        source,
    };
    let value = serde_json::from_str::<Value>(stdout.trim())
        .map_err(|error| unavailable(anyhow!("list-clouds output is not json: {error}")))?;
    let clouds = value
        .as_object()
        .ok_or_else(|| unavailable(anyhow!("list-clouds output is not an object")))?;
    let Some(entry) = clouds.get(name) else {
        return Err(CloudLookupError::NotFound(name.to_string()));
    };

    let cloud_type = entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| unavailable(anyhow!("cloud '{name}' has no type")))?;
    let mut info = CloudInfo::new(name, cloud_type);
    info.endpoint = entry
        .get("endpoint")
        .and_then(Value::as_str)
        .filter(|endpoint| !endpoint.is_empty())
        .map(str::to_string);
    info.regions = match entry.get("regions") {
        Some(Value::Object(regions)) => regions.keys().cloned().collect(),
        Some(Value::Array(regions)) => regions
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    Ok(info)
}
