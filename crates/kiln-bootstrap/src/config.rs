use std::path::{Path, PathBuf};

/// Hook executed once after a successful bootstrap, relative to the spell dir.
pub const POST_BOOTSTRAP_HOOK_RELATIVE_PATH: &str = "steps/00_post-bootstrap";

/// Static settings for one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub spell_dir: PathBuf,
    pub app_name: String,
}

impl BootstrapConfig {
    pub fn new(spell_dir: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            spell_dir: spell_dir.into(),
            app_name: app_name.into(),
        }
    }

    pub fn spell_dir(&self) -> &Path {
        &self.spell_dir
    }

    pub fn post_bootstrap_hook_path(&self) -> PathBuf {
        self.spell_dir.join(POST_BOOTSTRAP_HOOK_RELATIVE_PATH)
    }

    /// `<spell-dir>/<controller>-bootstrap.err`
    pub fn bootstrap_error_log(&self, controller: &str) -> PathBuf {
        self.spell_dir.join(format!("{controller}-bootstrap.err"))
    }

    /// `<spell-dir>/<controller>-bootstrap.out`
    pub fn bootstrap_output_log(&self, controller: &str) -> PathBuf {
        self.spell_dir.join(format!("{controller}-bootstrap.out"))
    }
}
