use std::{collections::BTreeMap, fmt, mem};

use kiln_provider::ProviderSelection;

use crate::{BootstrapExit, HookOutput, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Start,
    ProviderCheck,
    PrecheckWait,
    CredentialPrompt,
    Launch,
    Hook,
    Done,
    Error,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Start => "start",
            SessionPhase::ProviderCheck => "provider_check",
            SessionPhase::PrecheckWait => "precheck_wait",
            SessionPhase::CredentialPrompt => "credential_prompt",
            SessionPhase::Launch => "launch",
            SessionPhase::Hook => "hook",
            SessionPhase::Done => "done",
            SessionPhase::Error => "error",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Bootstrap,
    AddModel,
}

impl LaunchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchMode::Bootstrap => "bootstrap",
            LaunchMode::AddModel => "add-model",
        }
    }
}

/// The one provisioning operation a session may have in flight.
#[derive(Debug, Default)]
pub enum ActiveTask {
    #[default]
    Idle,
    /// Marker held while the engine call is being submitted.
    Launching(LaunchMode),
    Bootstrap(TaskHandle<BootstrapExit>),
    AddModel(TaskHandle<()>),
}

impl ActiveTask {
    pub fn is_active(&self) -> bool {
        !matches!(self, ActiveTask::Idle)
    }

    pub fn mode(&self) -> Option<LaunchMode> {
        match self {
            ActiveTask::Idle => None,
            ActiveTask::Launching(mode) => Some(*mode),
            ActiveTask::Bootstrap(_) => Some(LaunchMode::Bootstrap),
            ActiveTask::AddModel(_) => Some(LaunchMode::AddModel),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNames {
    pub controller: String,
    pub model: String,
}

/// An error seen by the reporter, whether or not it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub kind: &'static str,
    pub message: String,
    pub displayed: bool,
}

/// Mutable state of one bootstrap run. Owned by the session driver and
/// passed by `&mut` to every component.
#[derive(Debug)]
pub struct Session {
    provider: ProviderSelection,
    controller: Option<String>,
    model: Option<String>,
    phase: SessionPhase,
    pub(crate) active_task: ActiveTask,
    pub(crate) hook_task: Option<TaskHandle<HookOutput>>,
    pub(crate) showing_error: bool,
    pub(crate) hook_env: BTreeMap<String, String>,
    pub(crate) reported_errors: Vec<ReportedError>,
}

impl Session {
    pub fn new(provider: ProviderSelection) -> Self {
        Self {
            provider,
            controller: None,
            model: None,
            phase: SessionPhase::Start,
            active_task: ActiveTask::Idle,
            hook_task: None,
            showing_error: false,
            hook_env: BTreeMap::new(),
            reported_errors: Vec::new(),
        }
    }

    /// Presets names; `None` leaves the name to be generated.
    pub fn with_names(mut self, controller: Option<String>, model: Option<String>) -> Self {
        self.controller = controller;
        self.model = model;
        self
    }

    pub fn provider(&self) -> &ProviderSelection {
        &self.provider
    }

    pub fn controller(&self) -> Option<&str> {
        self.controller.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn showing_error(&self) -> bool {
        self.showing_error
    }

    pub fn active_task(&self) -> &ActiveTask {
        &self.active_task
    }

    pub fn has_pending_hook(&self) -> bool {
        self.hook_task.is_some()
    }

    pub fn hook_env(&self) -> &BTreeMap<String, String> {
        &self.hook_env
    }

    pub fn reported_errors(&self) -> &[ReportedError] {
        &self.reported_errors
    }

    /// Moves to `next`. `Error` is absorbing.
    pub fn advance(&mut self, next: SessionPhase) {
        if self.phase == SessionPhase::Error && next != SessionPhase::Error {
            tracing::debug!(
                requested = %next,
                "session already failed; phase change ignored"
            );
            return;
        }
        tracing::debug!(from = %self.phase, to = %next, "session phase");
        self.phase = next;
    }

    /// Generates `<app>-<provider>-<8 hex>` names once; later calls return
    /// the same names.
    pub fn ensure_names(&mut self, app_name: &str) -> SessionNames {
        let provider = self.provider.name().to_string();
        let controller = self
            .controller
            .get_or_insert_with(|| generated_name(app_name, &provider))
            .clone();
        let model = self
            .model
            .get_or_insert_with(|| generated_name(app_name, &provider))
            .clone();
        SessionNames { controller, model }
    }

    pub(crate) fn take_active_task(&mut self) -> ActiveTask {
        mem::take(&mut self.active_task)
    }
}

fn generated_name(app_name: &str, provider: &str) -> String {
    format!("{app_name}-{provider}-{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use kiln_provider::{ProviderKind, ProviderSelection};

    use super::{Session, SessionPhase};

    fn aws_session() -> Session {
        Session::new(ProviderSelection::new("aws", ProviderKind::GenericCloud))
    }

    #[test]
    fn unit_generated_names_follow_app_provider_hex_format() {
        let mut session = aws_session();
        let names = session.ensure_names("kiln");
        for name in [&names.controller, &names.model] {
            let suffix = name.strip_prefix("kiln-aws-").expect("prefix");
            assert_eq!(suffix.len(), 8);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn unit_ensure_names_is_idempotent() {
        let mut session = aws_session();
        let first = session.ensure_names("kiln");
        let second = session.ensure_names("other-app");
        assert_eq!(first, second);
        assert_eq!(session.controller(), Some(first.controller.as_str()));
    }

    #[test]
    fn unit_preset_names_are_kept() {
        let mut session = aws_session().with_names(Some("prod".to_string()), None);
        let names = session.ensure_names("kiln");
        assert_eq!(names.controller, "prod");
        assert!(names.model.starts_with("kiln-aws-"));
    }

    #[test]
    fn regression_error_phase_is_absorbing() {
        let mut session = aws_session();
        session.advance(SessionPhase::Launch);
        session.advance(SessionPhase::Error);
        session.advance(SessionPhase::Done);
        assert_eq!(session.phase(), SessionPhase::Error);
    }

    #[test]
    fn unit_new_session_is_idle_and_unlatched() {
        let session = aws_session();
        assert_eq!(session.phase(), SessionPhase::Start);
        assert!(!session.active_task().is_active());
        assert!(!session.showing_error());
        assert!(session.reported_errors().is_empty());
    }
}
