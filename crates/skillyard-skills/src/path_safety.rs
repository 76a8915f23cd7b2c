//! Path confinement and identifier validation.
//!
//! Every mutating operation funnels user-supplied names through these
//! helpers before touching the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SkillError};

/// Fallback folder name when sanitisation leaves nothing usable.
pub const DEFAULT_FOLDER_NAME: &str = "skill";

/// Resolve `child` beneath `root`, rejecting anything that would escape it.
///
/// `child` must be relative and free of `..` components. When the joined
/// path exists, it is canonicalised and checked again so that a symlink
/// inside `root` cannot point outside of it.
pub fn resolve_within(root: &Path, child: &str) -> Result<PathBuf> {
    let escape = || SkillError::PathEscape {
        root: root.to_path_buf(),
        child: child.to_owned(),
    };

    let normalized = child.replace('\\', "/");
    let mut cleaned = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => cleaned.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escape());
            }
        }
    }

    let joined = root.join(&cleaned);
    if !joined.exists() {
        return Ok(joined);
    }

    let canonical_root = root.canonicalize()?;
    let canonical = joined.canonicalize()?;
    if !canonical.starts_with(&canonical_root) {
        return Err(escape());
    }
    Ok(canonical)
}

/// Validate a skill identifier used by a mutating operation.
///
/// Ids are directory basenames; anything that looks like a path is rejected
/// rather than sanitised.
pub fn validate_skill_id(id: &str) -> Result<()> {
    let invalid = |reason: &str| SkillError::InvalidId {
        id: id.to_owned(),
        reason: reason.to_owned(),
    };

    if id.trim().is_empty() {
        return Err(invalid("id is empty"));
    }
    if id == "." || id == ".." {
        return Err(invalid("id is a relative path segment"));
    }
    if id.contains(['/', '\\', '\0']) {
        return Err(invalid("id contains a path separator"));
    }
    if id.contains(':') && cfg!(windows) {
        return Err(invalid("id contains a drive separator"));
    }
    Ok(())
}

/// Reduce a raw name to `[a-zA-Z0-9-_]`, replacing every other character
/// with `-`.
///
/// Runs of replacement dashes collapse to one and leading/trailing dashes are
/// trimmed. An empty result becomes [`DEFAULT_FOLDER_NAME`].
pub fn sanitize_folder_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        DEFAULT_FOLDER_NAME.to_owned()
    } else {
        trimmed.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_simple_child() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();

        let resolved = resolve_within(tmp.path(), "a/b").unwrap();
        assert!(resolved.ends_with("a/b"));
    }

    #[test]
    fn resolve_missing_child_is_joined() {
        let tmp = tempfile::tempdir().unwrap();
        let resolved = resolve_within(tmp.path(), "./x/y").unwrap();
        assert_eq!(resolved, tmp.path().join("x").join("y"));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_within(tmp.path(), "a/../../etc"),
            Err(SkillError::PathEscape { .. })
        ));
        assert!(resolve_within(tmp.path(), "..\\outside").is_err());
        assert!(resolve_within(tmp.path(), "/etc/passwd").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escape() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        assert!(matches!(
            resolve_within(root.path(), "link"),
            Err(SkillError::PathEscape { .. })
        ));
    }

    #[test]
    fn skill_id_validation() {
        assert!(validate_skill_id("web-search").is_ok());
        assert!(validate_skill_id("My Skill").is_ok());
        assert!(validate_skill_id("").is_err());
        assert!(validate_skill_id("..").is_err());
        assert!(validate_skill_id("a/b").is_err());
        assert!(validate_skill_id("a\\b").is_err());
    }

    #[test]
    fn folder_name_sanitisation() {
        assert_eq!(sanitize_folder_name("demo-skill"), "demo-skill");
        assert_eq!(sanitize_folder_name("My Cool Skill!"), "My-Cool-Skill");
        assert_eq!(sanitize_folder_name("snake_case.v2"), "snake_case-v2");
        assert_eq!(sanitize_folder_name("..."), DEFAULT_FOLDER_NAME);
        assert_eq!(sanitize_folder_name(""), DEFAULT_FOLDER_NAME);
    }
}
