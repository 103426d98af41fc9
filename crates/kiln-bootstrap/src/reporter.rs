use std::sync::Arc;

use crate::{BootstrapError, Presenter, ReportedError, Session, Telemetry};

/// Single-flight error surfacing and status line updates.
#[derive(Clone)]
pub struct StatusReporter {
    presenter: Arc<dyn Presenter>,
    telemetry: Arc<dyn Telemetry>,
}

impl StatusReporter {
    pub fn new(presenter: Arc<dyn Presenter>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            presenter,
            telemetry,
        }
    }

    /// Shows the first error of a session. Later errors are recorded on the
    /// session and logged, never displayed.
    pub fn report_error(&self, session: &mut Session, error: BootstrapError) {
        let message = error.to_string();
        if session.showing_error {
            tracing::warn!(
                kind = error.kind(),
                error = %message,
                "error suppressed while another error is displayed"
            );
            session.reported_errors.push(ReportedError {
                kind: error.kind(),
                message,
                displayed: false,
            });
            return;
        }

        session.showing_error = true;
        tracing::error!(kind = error.kind(), error = %message, "bootstrap failed");
        self.telemetry.track_exception(&message);
        self.presenter.show_error(&error);
        session.reported_errors.push(ReportedError {
            kind: error.kind(),
            message,
            displayed: true,
        });
    }

    pub fn set_status(&self, text: &str) {
        tracing::debug!(status = text, "status");
        self.presenter.set_status(text);
    }
}
