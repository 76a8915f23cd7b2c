//! Bundled skill sync and repair.
//!
//! Sync copies bundled skills that are missing from the primary root. A
//! [`RepairRule`] names files and manifest markers an installed copy must
//! have; an installed copy that fails its rule is replaced from the bundled
//! copy, keeping the user's `.env`.

use std::path::Path;

use serde::Serialize;

use crate::env_file::ENV_FILE;
use crate::error::Result;
use crate::installer::copy_dir_preserving_links;
use crate::manifest::MANIFEST_FILE;
use crate::registry::skill_id;
use crate::scanner::list_skill_dirs;

/// Integrity check for one bundled skill.
#[derive(Debug, Clone, Copy)]
pub struct RepairRule {
    pub skill_id: &'static str,
    /// Paths, relative to the skill directory, that must exist.
    pub required_files: &'static [&'static str],
    /// Substrings the installed manifest must contain.
    pub manifest_markers: &'static [&'static str],
}

pub const DEFAULT_REPAIR_RULES: &[RepairRule] = &[RepairRule {
    skill_id: "imap-smtp-email",
    required_files: &["scripts/imap.js", "scripts/smtp.js"],
    manifest_markers: &["--check"],
}];

impl RepairRule {
    /// Whether the copy at `installed` is missing anything the rule requires.
    pub fn needs_repair(&self, installed: &Path) -> bool {
        if self
            .required_files
            .iter()
            .any(|rel| !installed.join(rel).is_file())
        {
            return true;
        }
        match std::fs::read_to_string(installed.join(MANIFEST_FILE)) {
            Ok(manifest) => self.manifest_markers.iter().any(|m| !manifest.contains(m)),
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub copied: Vec<String>,
    pub repaired: Vec<String>,
}

/// Copy missing bundled skills into `primary` and repair broken copies.
pub fn sync_bundled(bundled: &Path, primary: &Path, rules: &[RepairRule]) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let sources = list_skill_dirs(bundled);
    if sources.is_empty() {
        return Ok(report);
    }
    std::fs::create_dir_all(primary)?;

    for source in sources {
        let Some(id) = skill_id(&source) else {
            continue;
        };
        let target = primary.join(&id);

        if !target.exists() {
            copy_dir_preserving_links(&source, &target)?;
            tracing::info!(skill = %id, "copied bundled skill");
            report.copied.push(id);
            continue;
        }

        let Some(rule) = rules.iter().find(|r| r.skill_id == id) else {
            continue;
        };
        if !rule.needs_repair(&target) {
            continue;
        }

        let saved_env = std::fs::read(target.join(ENV_FILE)).ok();
        std::fs::remove_dir_all(&target)?;
        copy_dir_preserving_links(&source, &target)?;
        if let Some(env) = saved_env {
            std::fs::write(target.join(ENV_FILE), env)?;
        }
        tracing::warn!(skill = %id, "installed skill was incomplete, restored from bundled copy");
        report.repaired.push(id);
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "imap-smtp-email";

    fn make_email_skill(dir: &Path, manifest: &str, with_scripts: bool) {
        std::fs::create_dir_all(dir.join("scripts")).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        if with_scripts {
            std::fs::write(dir.join("scripts/imap.js"), "// imap").unwrap();
            std::fs::write(dir.join("scripts/smtp.js"), "// smtp").unwrap();
        }
    }

    #[test]
    fn missing_skills_are_copied() {
        let bundled = tempfile::tempdir().unwrap();
        let primary = tempfile::tempdir().unwrap();
        make_email_skill(&bundled.path().join(EMAIL), "run --check", true);
        std::fs::create_dir(bundled.path().join("other")).unwrap();
        std::fs::write(bundled.path().join("other").join(MANIFEST_FILE), "x").unwrap();

        let report = sync_bundled(bundled.path(), primary.path(), DEFAULT_REPAIR_RULES).unwrap();
        assert_eq!(report.copied, vec![EMAIL.to_owned(), "other".to_owned()]);
        assert!(report.repaired.is_empty());
        assert!(primary.path().join(EMAIL).join("scripts/imap.js").is_file());

        let again = sync_bundled(bundled.path(), primary.path(), DEFAULT_REPAIR_RULES).unwrap();
        assert_eq!(again, SyncReport::default());
    }

    #[test]
    fn incomplete_copy_is_repaired_keeping_env() {
        let bundled = tempfile::tempdir().unwrap();
        let primary = tempfile::tempdir().unwrap();
        make_email_skill(&bundled.path().join(EMAIL), "node scripts/imap.js --check", true);

        let installed = primary.path().join(EMAIL);
        make_email_skill(&installed, "old manifest", false);
        std::fs::write(installed.join(ENV_FILE), "IMAP_USER=me\n").unwrap();
        std::fs::write(installed.join("stale.txt"), "x").unwrap();

        let report = sync_bundled(bundled.path(), primary.path(), DEFAULT_REPAIR_RULES).unwrap();
        assert_eq!(report.repaired, vec![EMAIL.to_owned()]);
        assert!(installed.join("scripts/smtp.js").is_file());
        assert!(!installed.join("stale.txt").exists());
        assert_eq!(
            std::fs::read_to_string(installed.join(ENV_FILE)).unwrap(),
            "IMAP_USER=me\n"
        );
    }

    #[test]
    fn marker_check() {
        let tmp = tempfile::tempdir().unwrap();
        let rule = DEFAULT_REPAIR_RULES[0];
        make_email_skill(tmp.path(), "no marker here", true);
        assert!(rule.needs_repair(tmp.path()));

        std::fs::write(tmp.path().join(MANIFEST_FILE), "probe with --check").unwrap();
        assert!(!rule.needs_repair(tmp.path()));
    }

    #[test]
    fn complete_copy_without_rule_is_untouched() {
        let bundled = tempfile::tempdir().unwrap();
        let primary = tempfile::tempdir().unwrap();
        std::fs::create_dir(bundled.path().join("notes")).unwrap();
        std::fs::write(bundled.path().join("notes").join(MANIFEST_FILE), "bundled").unwrap();
        std::fs::create_dir(primary.path().join("notes")).unwrap();
        std::fs::write(primary.path().join("notes").join(MANIFEST_FILE), "mine").unwrap();

        let report = sync_bundled(bundled.path(), primary.path(), DEFAULT_REPAIR_RULES).unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(
            std::fs::read_to_string(primary.path().join("notes").join(MANIFEST_FILE)).unwrap(),
            "mine"
        );
    }
}
