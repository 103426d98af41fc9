//! Recording fakes for driving a session without an engine or a terminal.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kiln_provider::{CloudInfo, CloudLookupError, CredentialSchema, ModelInfo};

use crate::{
    AddModelRequest, BootstrapError, BootstrapExit, BootstrapRequest, Presenter,
    ProvisioningEngine, Readiness, ReadinessCheck, Telemetry,
};

fn push<T>(log: &Mutex<Vec<T>>, item: T) {
    if let Ok(mut entries) = log.lock() {
        entries.push(item);
    }
}

fn snapshot<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().map(|entries| entries.clone()).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Status(String),
    Error { kind: &'static str, message: String },
    Header(String),
    CredentialPrompt { provider: String, fields: Vec<String> },
    Precheck(String),
    EnterDeploy,
    ReturnToProviderSelection,
}

#[derive(Debug, Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<PresenterEvent> {
        snapshot(&self.events)
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PresenterEvent::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PresenterEvent::Status(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses().pop()
    }
}

impl Presenter for RecordingPresenter {
    fn set_status(&self, text: &str) {
        push(&self.events, PresenterEvent::Status(text.to_string()));
    }

    fn show_error(&self, error: &BootstrapError) {
        push(
            &self.events,
            PresenterEvent::Error {
                kind: error.kind(),
                message: error.to_string(),
            },
        );
    }

    fn set_header(&self, title: &str) {
        push(&self.events, PresenterEvent::Header(title.to_string()));
    }

    fn show_credential_prompt(&self, schema: &CredentialSchema) {
        push(
            &self.events,
            PresenterEvent::CredentialPrompt {
                provider: schema.provider.clone(),
                fields: schema.fields.iter().map(|field| field.key.clone()).collect(),
            },
        );
    }

    fn show_precheck(&self, message: &str) {
        push(&self.events, PresenterEvent::Precheck(message.to_string()));
    }

    fn enter_deploy(&self) {
        push(&self.events, PresenterEvent::EnterDeploy);
    }

    fn return_to_provider_selection(&self) {
        push(&self.events, PresenterEvent::ReturnToProviderSelection);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryRecord {
    Event {
        category: String,
        action: String,
        label: String,
    },
    Exception(String),
    Screen(String),
}

impl TelemetryRecord {
    pub fn event(category: &str, action: &str) -> Self {
        TelemetryRecord::Event {
            category: category.to_string(),
            action: action.to_string(),
            label: String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl RecordingTelemetry {
    pub fn records(&self) -> Vec<TelemetryRecord> {
        snapshot(&self.records)
    }
}

impl Telemetry for RecordingTelemetry {
    fn track_event(&self, category: &str, action: &str, label: &str) {
        push(
            &self.records,
            TelemetryRecord::Event {
                category: category.to_string(),
                action: action.to_string(),
                label: label.to_string(),
            },
        );
    }

    fn track_exception(&self, description: &str) {
        push(
            &self.records,
            TelemetryRecord::Exception(description.to_string()),
        );
    }

    fn track_screen(&self, name: &str) {
        push(&self.records, TelemetryRecord::Screen(name.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Bootstrap(BootstrapRequest),
    AddModel(AddModelRequest),
    DescribeModel(String),
    DescribeCloud(String),
}

/// Engine fake answering from a fixed script and recording every call.
#[derive(Debug)]
pub struct ScriptedEngine {
    clouds: Vec<CloudInfo>,
    registry_unavailable: bool,
    bootstrap_code: i32,
    bootstrap_failure: Option<String>,
    error_log_text: Option<String>,
    provider_type: Option<String>,
    calls: Mutex<Vec<EngineCall>>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            clouds: Vec::new(),
            registry_unavailable: false,
            bootstrap_code: 0,
            bootstrap_failure: None,
            error_log_text: None,
            provider_type: Some("ec2".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cloud(mut self, name: &str, cloud_type: &str) -> Self {
        self.clouds.push(CloudInfo::new(name, cloud_type));
        self
    }

    pub fn with_registry_unavailable(mut self) -> Self {
        self.registry_unavailable = true;
        self
    }

    pub fn with_bootstrap_code(mut self, code: i32) -> Self {
        self.bootstrap_code = code;
        self
    }

    /// The bootstrap task itself raises instead of returning a code.
    pub fn with_bootstrap_failure(mut self, reason: &str) -> Self {
        self.bootstrap_failure = Some(reason.to_string());
        self
    }

    /// Text written to the request's error log during bootstrap.
    pub fn with_error_log(mut self, text: &str) -> Self {
        self.error_log_text = Some(text.to_string());
        self
    }

    /// `None` makes `describe_model` fail.
    pub fn with_provider_type(mut self, provider_type: Option<&str>) -> Self {
        self.provider_type = provider_type.map(str::to_string);
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        snapshot(&self.calls)
    }

    pub fn bootstrap_requests(&self) -> Vec<BootstrapRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Bootstrap(request) => Some(request),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProvisioningEngine for ScriptedEngine {
    async fn bootstrap(&self, request: BootstrapRequest) -> Result<BootstrapExit> {
        push(&self.calls, EngineCall::Bootstrap(request.clone()));
        if let Some(text) = &self.error_log_text {
            std::fs::write(&request.error_log, text).with_context(|| {
                format!("failed to write {}", request.error_log.display())
            })?;
        }
        if let Some(reason) = &self.bootstrap_failure {
            return Err(anyhow!("{reason}"));
        }
        Ok(BootstrapExit {
            return_code: self.bootstrap_code,
        })
    }

    async fn add_model(&self, request: AddModelRequest) -> Result<()> {
        push(&self.calls, EngineCall::AddModel(request));
        Ok(())
    }

    async fn describe_model(&self, model: &str) -> Result<ModelInfo> {
        push(&self.calls, EngineCall::DescribeModel(model.to_string()));
        let provider_type = self
            .provider_type
            .clone()
            .ok_or_else(|| anyhow!("model '{model}' not found"))?;
        Ok(ModelInfo {
            name: model.to_string(),
            provider_type,
        })
    }

    async fn describe_cloud(&self, name: &str) -> Result<CloudInfo, CloudLookupError> {
        push(&self.calls, EngineCall::DescribeCloud(name.to_string()));
        if self.registry_unavailable {
            return Err(CloudLookupError::Unavailable {
                provider: name.to_string(),
                source: anyhow!("registry offline"),
            });
        }
        self.clouds
            .iter()
            .find(|cloud| cloud.name == name)
            .cloned()
            .ok_or_else(|| CloudLookupError::NotFound(name.to_string()))
    }
}

/// Readiness check with a fixed answer. Counts invocations.
#[derive(Debug)]
pub struct StaticReadiness {
    readiness: Readiness,
    checks: AtomicUsize,
}

impl StaticReadiness {
    pub fn ready() -> Self {
        Self {
            readiness: Readiness::ready(),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn not_ready(message: &str) -> Self {
        Self {
            readiness: Readiness::not_ready(message),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessCheck for StaticReadiness {
    async fn check_ready(&self) -> Readiness {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.readiness.clone()
    }
}
