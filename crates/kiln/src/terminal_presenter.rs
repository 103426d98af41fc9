use std::io::Write;

use kiln_bootstrap::{BootstrapError, Presenter};
use kiln_provider::CredentialSchema;

/// Line-oriented presenter writing to stderr.
#[derive(Debug, Default)]
pub(crate) struct TerminalPresenter;

impl TerminalPresenter {
    fn emit(&self, line: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}

impl Presenter for TerminalPresenter {
    fn set_status(&self, text: &str) {
        if !text.is_empty() {
            self.emit(&format!("[kiln] {text}"));
        }
    }

    fn show_error(&self, error: &BootstrapError) {
        self.emit(&format!("error: {error}"));
        if let Some(log) = error.provisioning_log() {
            for line in log.lines() {
                self.emit(&format!("  {line}"));
            }
        }
    }

    fn set_header(&self, title: &str) {
        self.emit(&format!("== {title} =="));
    }

    fn show_credential_prompt(&self, schema: &CredentialSchema) {
        self.emit(&render_credential_prompt(schema));
    }

    fn show_precheck(&self, message: &str) {
        self.emit(&format!("pre-check: {message}"));
    }

    fn enter_deploy(&self) {
        self.emit("[kiln] provisioning started; waiting for completion");
    }

    fn return_to_provider_selection(&self) {
        self.emit("[kiln] credential entry cancelled; choose another provider");
    }
}

pub(crate) fn render_credential_prompt(schema: &CredentialSchema) -> String {
    let mut lines = vec![format!(
        "credentials required for '{}' ({}); pass them as --credential KEY=VALUE:",
        schema.provider, schema.auth_type
    )];
    for field in &schema.fields {
        let mut notes = Vec::new();
        if !field.required {
            notes.push("optional");
        }
        if field.secret {
            notes.push("secret");
        }
        let suffix = if notes.is_empty() {
            String::new()
        } else {
            format!(" [{}]", notes.join(", "))
        };
        lines.push(format!("  {} - {}{suffix}", field.key, field.label));
    }
    lines.join("\n")
}
