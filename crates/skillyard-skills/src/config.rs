//! Skill manager configuration.
//!
//! Loaded from a TOML file (every field optional), then overridden by
//! `SKILLYARD_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::acquire::{DEFAULT_API_BASE, DEFAULT_WEB_BASE};
use crate::error::{Result, SkillError};
use crate::source::DEFAULT_GIT_HOST;

pub const ENV_SKILLS_DIR: &str = "SKILLYARD_SKILLS_DIR";
pub const ENV_BUNDLED_SKILLS_DIR: &str = "SKILLYARD_BUNDLED_SKILLS_DIR";
pub const ENV_EXTERNAL_SKILLS_DIR: &str = "SKILLYARD_EXTERNAL_SKILLS_DIR";
pub const ENV_STATE_DB: &str = "SKILLYARD_STATE_DB";

/// Configuration for [`SkillManager`](crate::manager::SkillManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Primary, user-writable skill root. Relative paths resolve against the
    /// working directory.
    pub skills_dir: PathBuf,
    /// Read-only bundled root; resolved from the build layout when unset.
    pub bundled_dir: Option<PathBuf>,
    /// External assistant convention directory; `~/.claude/skills` when unset.
    pub external_dir: Option<PathBuf>,
    /// Whether the external convention directory is a root at all.
    pub include_external: bool,
    /// SQLite database holding the enable-state map.
    pub state_db: PathBuf,
    pub watch_debounce_ms: u64,
    pub script_timeout_ms: u64,
    pub kill_grace_ms: u64,
    /// Host used for `owner/repo` shorthand and web URL recognition.
    pub git_host: String,
    pub web_base: String,
    pub api_base: String,
    /// Executable that runs skill scripts in interpreter-compatible mode.
    /// Plain `node` is used when unset.
    pub host_runtime: Option<PathBuf>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            skills_dir: PathBuf::from("data/skills"),
            bundled_dir: None,
            external_dir: None,
            include_external: true,
            state_db: PathBuf::from("data/skillyard.db"),
            watch_debounce_ms: 250,
            script_timeout_ms: 20_000,
            kill_grace_ms: 2_000,
            git_host: DEFAULT_GIT_HOST.to_owned(),
            web_base: DEFAULT_WEB_BASE.to_owned(),
            api_base: DEFAULT_API_BASE.to_owned(),
            host_runtime: None,
        }
    }
}

impl SkillsConfig {
    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SkillError::InvalidConfig(format!("failed to parse TOML config: {e}")))
    }

    /// Load `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = Self::from_toml_str(&content)?;
            tracing::info!(path = %path.display(), "skills configuration loaded");
            config
        } else {
            tracing::debug!(path = %path.display(), "configuration file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `SKILLYARD_*` overrides read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        if let Some(dir) = get(ENV_SKILLS_DIR) {
            self.skills_dir = dir;
        }
        if let Some(dir) = get(ENV_BUNDLED_SKILLS_DIR) {
            self.bundled_dir = Some(dir);
        }
        if let Some(dir) = get(ENV_EXTERNAL_SKILLS_DIR) {
            self.external_dir = Some(dir);
        }
        if let Some(db) = get(ENV_STATE_DB) {
            self.state_db = db;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
