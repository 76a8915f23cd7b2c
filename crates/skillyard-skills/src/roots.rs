//! Skill roots and their priority.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SkillsConfig;

/// Which root a skill copy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    /// User-writable managed root.
    Primary,
    /// Another assistant's skills directory, read-only.
    External,
    /// Skills shipped with the application, read-only.
    Bundled,
}

impl RootKind {
    pub fn is_writable(self) -> bool {
        self == Self::Primary
    }
}

impl std::fmt::Display for RootKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::External => "external",
            Self::Bundled => "bundled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRoot {
    pub kind: RootKind,
    pub path: PathBuf,
}

/// The resolved set of roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRoots {
    pub primary: PathBuf,
    pub external: Option<PathBuf>,
    pub bundled: Option<PathBuf>,
}

impl SkillRoots {
    /// Resolve the roots described by `config`; a relative primary root is
    /// taken relative to `working_dir`.
    pub fn resolve(config: &SkillsConfig, working_dir: &Path) -> Self {
        let primary = if config.skills_dir.is_absolute() {
            config.skills_dir.clone()
        } else {
            working_dir.join(&config.skills_dir)
        };

        let external = if config.include_external {
            config.external_dir.clone().or_else(default_external_dir)
        } else {
            None
        };

        Self {
            primary,
            external,
            bundled: config.bundled_dir.clone().or_else(default_bundled_dir),
        }
    }

    /// All roots, lowest priority first: bundled, external, primary.
    ///
    /// Folding a scan over this list into an id-keyed map lets the primary
    /// root override the others; the same order drives the defaults merge.
    pub fn by_priority(&self) -> Vec<SkillRoot> {
        let mut roots = Vec::with_capacity(3);
        if let Some(path) = &self.bundled {
            roots.push(SkillRoot {
                kind: RootKind::Bundled,
                path: path.clone(),
            });
        }
        if let Some(path) = &self.external {
            roots.push(SkillRoot {
                kind: RootKind::External,
                path: path.clone(),
            });
        }
        roots.push(SkillRoot {
            kind: RootKind::Primary,
            path: self.primary.clone(),
        });
        roots
    }
}

/// `~/.claude/skills`.
pub fn default_external_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("skills"))
}

/// Bundled skills for the current build: `<exe dir>/resources/skills` in
/// release builds, the workspace `skills/` directory in debug builds.
pub fn default_bundled_dir() -> Option<PathBuf> {
    if cfg!(debug_assertions) {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        return Some(workspace.join("skills"));
    }
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join("resources").join("skills"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_bundled_external_primary() {
        let roots = SkillRoots {
            primary: PathBuf::from("/p"),
            external: Some(PathBuf::from("/e")),
            bundled: Some(PathBuf::from("/b")),
        };
        let kinds: Vec<_> = roots.by_priority().into_iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RootKind::Bundled, RootKind::External, RootKind::Primary]);
    }

    #[test]
    fn optional_roots_are_omitted() {
        let roots = SkillRoots {
            primary: PathBuf::from("/p"),
            external: None,
            bundled: None,
        };
        assert_eq!(roots.by_priority().len(), 1);
    }

    #[test]
    fn resolve_relative_primary_and_flags() {
        let config = SkillsConfig {
            skills_dir: PathBuf::from("my-skills"),
            include_external: false,
            bundled_dir: Some(PathBuf::from("/opt/bundled")),
            ..SkillsConfig::default()
        };
        let roots = SkillRoots::resolve(&config, Path::new("/work"));
        assert_eq!(roots.primary, PathBuf::from("/work/my-skills"));
        assert_eq!(roots.external, None);
        assert_eq!(roots.bundled, Some(PathBuf::from("/opt/bundled")));
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RootKind::External).unwrap(), "\"external\"");
        assert!(RootKind::Primary.is_writable());
        assert!(!RootKind::Bundled.is_writable());
    }
}
