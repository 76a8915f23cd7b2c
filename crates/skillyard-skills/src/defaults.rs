//! Per-root defaults config (`skills.config.json`).
//!
//! ```json
//! { "version": 1, "defaults": { "web-search": { "order": 10, "enabled": false } } }
//! ```
//!
//! Files are merged lowest priority first; a later file overrides only the
//! fields it declares for a given id.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Defaults config filename inside each root.
pub const DEFAULTS_FILE: &str = "skills.config.json";

/// Sort key for skills with no declared order.
pub const DEFAULT_ORDER: i64 = 999;

/// Parsed contents of one defaults file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<serde_json::Value>,
    #[serde(default)]
    pub defaults: BTreeMap<String, SkillDefaults>,
}

/// Declared defaults for one skill id; unset fields inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl SkillDefaults {
    pub fn order(&self) -> i64 {
        self.order.unwrap_or(DEFAULT_ORDER)
    }

    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    fn overlay(&mut self, higher: &SkillDefaults) {
        if higher.order.is_some() {
            self.order = higher.order;
        }
        if higher.enabled.is_some() {
            self.enabled = higher.enabled;
        }
    }
}

/// The result of folding every root's defaults file together.
#[derive(Debug, Clone, Default)]
pub struct MergedDefaults {
    entries: BTreeMap<String, SkillDefaults>,
}

impl MergedDefaults {
    /// Fold `file` over the current state; `file` has higher priority.
    pub fn merge(&mut self, file: &DefaultsFile) {
        for (id, declared) in &file.defaults {
            self.entries.entry(id.clone()).or_default().overlay(declared);
        }
    }

    /// Effective defaults for `id`.
    pub fn get(&self, id: &str) -> SkillDefaults {
        self.entries.get(id).copied().unwrap_or_default()
    }
}

/// Read `root/skills.config.json`. Missing files and parse failures yield
/// `None`; the latter is logged.
pub fn load_defaults_file(root: &Path) -> Option<DefaultsFile> {
    let path = root.join(DEFAULTS_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read defaults config");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed defaults config");
            None
        }
    }
}

/// Merge the defaults files of `roots`, given lowest priority first.
pub fn merge_defaults<'a>(roots: impl IntoIterator<Item = &'a Path>) -> MergedDefaults {
    let mut merged = MergedDefaults::default();
    for root in roots {
        if let Some(file) = load_defaults_file(root) {
            merged.merge(&file);
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_defaults(root: &Path, json: &str) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(root.join(DEFAULTS_FILE), json).unwrap();
    }

    #[test]
    fn unknown_ids_use_fallbacks() {
        let merged = MergedDefaults::default();
        let d = merged.get("anything");
        assert_eq!(d.order(), DEFAULT_ORDER);
        assert!(d.enabled());
    }

    #[test]
    fn higher_priority_overrides_per_field() {
        let tmp = tempfile::tempdir().unwrap();
        let bundled = tmp.path().join("bundled");
        let primary = tmp.path().join("primary");
        write_defaults(
            &bundled,
            r#"{"version":1,"defaults":{"a":{"order":1,"enabled":false},"b":{"order":5}}}"#,
        );
        write_defaults(&primary, r#"{"defaults":{"a":{"enabled":true}}}"#);

        let merged = merge_defaults([bundled.as_path(), primary.as_path()]);
        let a = merged.get("a");
        assert_eq!(a.order(), 1);
        assert!(a.enabled());
        assert_eq!(merged.get("b").order(), 5);
    }

    #[test]
    fn missing_and_malformed_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let broken = tmp.path().join("broken");
        write_defaults(&broken, "{not json");
        let good = tmp.path().join("good");
        write_defaults(&good, r#"{"defaults":{"x":{"order":3}}}"#);

        assert!(load_defaults_file(&tmp.path().join("absent")).is_none());
        assert!(load_defaults_file(&broken).is_none());

        let merged = merge_defaults([good.as_path(), broken.as_path()]);
        assert_eq!(merged.get("x").order(), 3);
    }
}
