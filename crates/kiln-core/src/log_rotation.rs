use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const DEFAULT_ROTATION_MAX_BYTES: u64 = 4 * 1024 * 1024;
const DEFAULT_ROTATION_MAX_FILES: usize = 7;
const ROTATION_MAX_BYTES_ENV: &str = "KILN_LOG_ROTATION_MAX_BYTES";
const ROTATION_MAX_FILES_ENV: &str = "KILN_LOG_ROTATION_MAX_FILES";

/// Size-based retention for append-only NDJSON logs.
///
/// `max_files` counts the active file plus its numbered backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for LogRotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_ROTATION_MAX_BYTES,
            max_files: DEFAULT_ROTATION_MAX_FILES,
        }
    }
}

impl LogRotationPolicy {
    /// Reads overrides from `KILN_LOG_ROTATION_MAX_*`, ignoring zero or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_bytes = read_positive_env(ROTATION_MAX_BYTES_ENV).unwrap_or(defaults.max_bytes);
        let max_files = read_positive_env(ROTATION_MAX_FILES_ENV)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(defaults.max_files);
        Self {
            max_bytes,
            max_files,
        }
    }

    pub fn is_enabled(self) -> bool {
        self.max_bytes > 0 && self.max_files > 0
    }
}

fn read_positive_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

/// Appends one line to `path`, rotating first when the line would overflow `max_bytes`.
pub fn append_line_with_rotation(path: &Path, line: &str, policy: LogRotationPolicy) -> Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    if policy.is_enabled() && path.exists() {
        let current_size = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        let incoming = u64::try_from(line.len().saturating_add(1)).unwrap_or(u64::MAX);
        if current_size.saturating_add(incoming) > policy.max_bytes {
            rotate(path, policy.max_files)?;
        }
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("failed to append {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    PathBuf::from(format!("{}.{index}", path.display()))
}

fn rotate(path: &Path, max_files: usize) -> Result<()> {
    if max_files <= 1 {
        return std::fs::remove_file(path)
            .with_context(|| format!("failed to truncate {}", path.display()));
    }

    // shift `.N-1` -> `.N` from the oldest slot down; the oldest is overwritten.
    for index in (1..max_files).rev() {
        let source = if index == 1 {
            path.to_path_buf()
        } else {
            backup_path(path, index - 1)
        };
        if !source.exists() {
            continue;
        }
        let destination = backup_path(path, index);
        if destination.exists() {
            std::fs::remove_file(&destination)
                .with_context(|| format!("failed to drop {}", destination.display()))?;
        }
        std::fs::rename(&source, &destination).with_context(|| {
            format!(
                "failed to rotate {} to {}",
                source.display(),
                destination.display()
            )
        })?;
    }
    Ok(())
}
