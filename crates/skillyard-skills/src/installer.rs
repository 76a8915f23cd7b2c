//! Installer: copy acquired skill directories into the primary root.
//!
//! Each skill gets a sanitised folder name; on collision `-1`, `-2`, … is
//! appended until a free name is found. Symlinks inside a skill are copied
//! as links and never dereferenced. A batch is all or nothing: if any copy
//! fails, the copies made so far are removed again.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::path_safety::sanitize_folder_name;
use crate::types::InstalledSkill;

/// Entries never copied out of an acquired tree.
const SKIPPED_ENTRIES: &[&str] = &[".git"];

/// Copy every directory in `skill_dirs` into `primary`.
///
/// `acquired_root` and `name_hint` name the acquisition: when a skill
/// directory is the acquisition root itself (a scratch directory), the hint
/// is used as its folder name instead of the scratch basename.
pub fn install_skill_dirs(
    primary: &Path,
    acquired_root: &Path,
    name_hint: Option<&str>,
    skill_dirs: &[PathBuf],
) -> Result<Vec<InstalledSkill>> {
    std::fs::create_dir_all(primary)?;

    let mut installed: Vec<InstalledSkill> = Vec::with_capacity(skill_dirs.len());
    for dir in skill_dirs {
        let raw_name = match name_hint {
            Some(hint) if dir == acquired_root => hint.to_owned(),
            _ => dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let target = unique_target(primary, &sanitize_folder_name(&raw_name));

        if let Err(e) = copy_dir_preserving_links(dir, &target) {
            // All or nothing: drop this copy and every earlier one.
            for path in installed.iter().map(|s| &s.path).chain([&target]) {
                remove_installed(path);
            }
            return Err(e.into());
        }

        let id = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(skill = %id, path = %target.display(), "skill installed");
        installed.push(InstalledSkill { id, path: target });
    }
    Ok(installed)
}

fn remove_installed(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to roll back installed skill"
            );
        }
    }
}

/// First of `base`, `base-1`, `base-2`, … that does not exist in `root`.
pub fn unique_target(root: &Path, base: &str) -> PathBuf {
    let candidate = root.join(base);
    if !exists_no_follow(&candidate) {
        return candidate;
    }
    (1u32..)
        .map(|n| root.join(format!("{base}-{n}")))
        .find(|p| !exists_no_follow(p))
        .unwrap_or(candidate)
}

fn exists_no_follow(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Recursively copy `src` to `dst`, recreating symlinks as symlinks.
pub fn copy_dir_preserving_links(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if SKIPPED_ENTRIES.iter().any(|s| name == *s) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir_preserving_links(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let target = std::fs::read_link(src)?;
    let points_to_dir = std::fs::metadata(src).is_ok_and(|m| m.is_dir());
    let result = if points_to_dir {
        std::os::windows::fs::symlink_dir(&target, dst)
    } else {
        std::os::windows::fs::symlink_file(&target, dst)
    };
    if let Err(e) = &result {
        // Creating symlinks needs a privilege most accounts lack.
        tracing::warn!(path = %src.display(), error = %e, "skipping symlink");
        return Ok(());
    }
    result
}

#[cfg(not(any(unix, windows)))]
fn copy_symlink(src: &Path, _dst: &Path) -> std::io::Result<()> {
    tracing::warn!(path = %src.display(), "skipping symlink on unsupported platform");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
