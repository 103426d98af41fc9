use std::path::{Path, PathBuf};

use kiln_core::{append_line_with_rotation, current_unix_timestamp_ms, LogRotationPolicy};
use serde::{Deserialize, Serialize};

use crate::Telemetry;

/// Drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn track_event(&self, _category: &str, _action: &str, _label: &str) {}
    fn track_exception(&self, _description: &str) {}
    fn track_screen(&self, _name: &str) {}
}

/// Emits telemetry as `tracing` events at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn track_event(&self, category: &str, action: &str, label: &str) {
        tracing::info!(category, action, label, "telemetry event");
    }

    fn track_exception(&self, description: &str) {
        tracing::info!(description, "telemetry exception");
    }

    fn track_screen(&self, name: &str) {
        tracing::info!(screen = name, "telemetry screen");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryPayload {
    Event {
        category: String,
        action: String,
        label: String,
    },
    Exception {
        description: String,
    },
    Screen {
        name: String,
    },
}

/// One NDJSON line of the telemetry log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryLogRecord {
    pub timestamp_unix_ms: u64,
    #[serde(flatten)]
    pub payload: TelemetryPayload,
}

/// Appends records to an NDJSON file with size-based rotation. Write
/// failures are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct JsonlTelemetry {
    path: PathBuf,
    policy: LogRotationPolicy,
}

impl JsonlTelemetry {
    pub fn new(path: impl Into<PathBuf>, policy: LogRotationPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, payload: TelemetryPayload) {
        let record = TelemetryLogRecord {
            timestamp_unix_ms: current_unix_timestamp_ms(),
            payload,
        };
        let result = serde_json::to_string(&record)
            .map_err(anyhow::Error::from)
            .and_then(|line| append_line_with_rotation(&self.path, &line, self.policy));
        if let Err(error) = result {
            tracing::warn!(
                path = %self.path.display(),
                error = %error,
                "failed to append telemetry record"
            );
        }
    }
}

impl Telemetry for JsonlTelemetry {
    fn track_event(&self, category: &str, action: &str, label: &str) {
        self.append(TelemetryPayload::Event {
            category: category.to_string(),
            action: action.to_string(),
            label: label.to_string(),
        });
    }

    fn track_exception(&self, description: &str) {
        self.append(TelemetryPayload::Exception {
            description: description.to_string(),
        });
    }

    fn track_screen(&self, name: &str) {
        self.append(TelemetryPayload::Screen {
            name: name.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use kiln_core::LogRotationPolicy;

    use super::{JsonlTelemetry, TelemetryLogRecord, TelemetryPayload};
    use crate::Telemetry;

    fn read_records(path: &std::path::Path) -> Vec<TelemetryLogRecord> {
        std::fs::read_to_string(path)
            .expect("telemetry log")
            .lines()
            .map(|line| serde_json::from_str(line).expect("record"))
            .collect()
    }

    #[test]
    fn functional_jsonl_sink_appends_tagged_records() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("telemetry").join("events.jsonl");
        let sink = JsonlTelemetry::new(&path, LogRotationPolicy::default());

        sink.track_screen("Cloud Creation");
        sink.track_event("Bootstrap", "Done", "");
        sink.track_exception("Error in Post-Bootstrap");

        let payloads = read_records(&path)
            .into_iter()
            .map(|record| record.payload)
            .collect::<Vec<_>>();
        assert_eq!(
            payloads,
            vec![
                TelemetryPayload::Screen {
                    name: "Cloud Creation".to_string()
                },
                TelemetryPayload::Event {
                    category: "Bootstrap".to_string(),
                    action: "Done".to_string(),
                    label: String::new(),
                },
                TelemetryPayload::Exception {
                    description: "Error in Post-Bootstrap".to_string()
                },
            ]
        );
        let raw = std::fs::read_to_string(&path).expect("raw");
        assert!(raw.lines().next().expect("line").contains("\"kind\":\"screen\""));
    }

    #[test]
    fn regression_jsonl_sink_rotates_instead_of_growing() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("events.jsonl");
        let sink = JsonlTelemetry::new(
            &path,
            LogRotationPolicy {
                max_bytes: 200,
                max_files: 2,
            },
        );

        for _ in 0..10 {
            sink.track_event("Post-Bootstrap", "Started", "");
        }

        let active = std::fs::metadata(&path).expect("active log").len();
        assert!(active <= 200);
        assert!(tempdir.path().join("events.jsonl.1").exists());
    }

    #[test]
    fn regression_unwritable_path_does_not_panic() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let blocker = tempdir.path().join("file");
        std::fs::write(&blocker, "x").expect("blocker");
        let sink = JsonlTelemetry::new(blocker.join("events.jsonl"), LogRotationPolicy::default());
        sink.track_screen("Cloud Creation");
    }
}
