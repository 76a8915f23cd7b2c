//! Directory scanner: enumerate skill directories beneath a root.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::manifest::MANIFEST_FILE;

/// Directory names never descended into during a deep search.
const PRUNED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
];

/// Maximum depth below the root for [`find_skill_dirs`].
const MAX_DEPTH: usize = 8;

/// Maximum number of directories [`find_skill_dirs`] will visit.
const MAX_VISITED: usize = 10_000;

/// Whether `dir` directly contains a manifest file.
pub fn is_skill_dir(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// Shallow scan: `root` itself if it is a skill, else its immediate child
/// directories (symlinks to directories included) that are skills.
///
/// A missing or unreadable root yields an empty list.
pub fn list_skill_dirs(root: &Path) -> Vec<PathBuf> {
    if is_skill_dir(root) {
        return vec![root.to_path_buf()];
    }

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(root = %root.display(), error = %e, "failed to read skill root");
            }
            return Vec::new();
        }
    };

    let found: BTreeSet<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && is_skill_dir(path))
        .collect();
    found.into_iter().collect()
}

/// Deep scan used on acquired trees: the shallow scan first, then a bounded
/// breadth-first search when that finds nothing.
///
/// The search stops descending at a skill directory, skips VCS and
/// dependency-cache directories, and never follows symbolic links.
pub fn find_skill_dirs(root: &Path) -> Vec<PathBuf> {
    let shallow = list_skill_dirs(root);
    if !shallow.is_empty() {
        return shallow;
    }

    let mut found = BTreeSet::new();
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);
    let mut visited = 0usize;

    while let Some((dir, depth)) = queue.pop_front() {
        visited += 1;
        if visited > MAX_VISITED {
            tracing::warn!(root = %root.display(), "skill search stopped after visit limit");
            break;
        }

        if is_skill_dir(&dir) {
            found.insert(dir);
            continue;
        }
        if depth >= MAX_DEPTH {
            continue;
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            tracing::debug!(dir = %dir.display(), "skipping unreadable directory");
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            // `DirEntry::file_type` does not follow symlinks.
            let is_real_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if !is_real_dir {
                continue;
            }
            let name = entry.file_name();
            if PRUNED_DIRS.iter().any(|p| name == *p) {
                continue;
            }
            queue.push_back((entry.path(), depth + 1));
        }
    }

    found.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_skill(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), "---\nname: x\n---\n").unwrap();
    }

    #[test]
    fn root_that_is_a_skill_is_sole_result() {
        let tmp = tempfile::tempdir().unwrap();
        make_skill(tmp.path());
        make_skill(&tmp.path().join("nested"));

        assert_eq!(list_skill_dirs(tmp.path()), vec![tmp.path().to_path_buf()]);
        assert_eq!(find_skill_dirs(tmp.path()), vec![tmp.path().to_path_buf()]);
    }

    #[test]
    fn flat_container_lists_children_once() {
        let tmp = tempfile::tempdir().unwrap();
        make_skill(&tmp.path().join("b"));
        make_skill(&tmp.path().join("a"));
        make_skill(&tmp.path().join("a/inner"));
        std::fs::create_dir(tmp.path().join("not-a-skill")).unwrap();
        std::fs::write(tmp.path().join("file.txt"), "x").unwrap();

        let first = list_skill_dirs(tmp.path());
        assert_eq!(first, vec![tmp.path().join("a"), tmp.path().join("b")]);
        assert_eq!(list_skill_dirs(tmp.path()), first);
    }

    #[test]
    fn missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_skill_dirs(&tmp.path().join("nope")).is_empty());
        assert!(find_skill_dirs(&tmp.path().join("nope")).is_empty());
    }

    #[test]
    fn deep_search_prunes_and_stops_at_skills() {
        let tmp = tempfile::tempdir().unwrap();
        make_skill(&tmp.path().join("packages/tools/alpha"));
        make_skill(&tmp.path().join("packages/tools/alpha/examples/inner"));
        make_skill(&tmp.path().join("packages/beta"));
        make_skill(&tmp.path().join("node_modules/dep"));
        make_skill(&tmp.path().join(".git/hooks"));

        let found = find_skill_dirs(tmp.path());
        assert_eq!(
            found,
            vec![
                tmp.path().join("packages/beta"),
                tmp.path().join("packages/tools/alpha"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn shallow_follows_symlinks_deep_does_not() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        make_skill(&outside.path().join("linked"));

        std::os::unix::fs::symlink(outside.path().join("linked"), tmp.path().join("linked")).unwrap();
        assert_eq!(list_skill_dirs(tmp.path()), vec![tmp.path().join("linked")]);

        let deep_root = tempfile::tempdir().unwrap();
        std::fs::create_dir(deep_root.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(outside.path(), deep_root.path().join("sub/link")).unwrap();
        // A cycle back to the root must not hang the search.
        std::os::unix::fs::symlink(deep_root.path(), deep_root.path().join("sub/loop")).unwrap();
        assert!(find_skill_dirs(deep_root.path()).is_empty());
    }
}
