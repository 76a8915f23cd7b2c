//! Git executable discovery and shallow cloning.
//!
//! On Windows `git` is frequently installed without being on `PATH` (or only
//! on the `PATH` of interactive shells), so discovery probes the usual
//! install locations first, then a `where`-style lookup, then copies bundled
//! next to the application. The child process gets the discovered tool's
//! sibling directories prepended to its `PATH` so helpers such as
//! `git-remote-https` resolve.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{Result, SkillError};

/// A resolved git executable plus the directories its helpers live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTool {
    pub program: PathBuf,
    pub extra_path: Vec<PathBuf>,
}

impl GitTool {
    /// Locate git for the current platform.
    pub fn locate() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));

        let found = if cfg!(windows) {
            locate_windows(|name| std::env::var(name).ok(), exe_dir.as_deref())
        } else {
            which::which("git").ok()
        };

        match found {
            Some(program) => {
                let extra_path = sibling_dirs(&program);
                tracing::debug!(program = %program.display(), "resolved git executable");
                Self {
                    program,
                    extra_path,
                }
            }
            None => {
                tracing::debug!("git not found, relying on PATH lookup at spawn time");
                Self {
                    program: PathBuf::from("git"),
                    extra_path: Vec::new(),
                }
            }
        }
    }

    /// Build a `git` command with the shaped environment.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(path) = self.search_path() {
            cmd.env("PATH", path);
        }
        cmd
    }

    /// `PATH` for the child: extra directories first, then the inherited
    /// value. `None` when there is nothing to add.
    fn search_path(&self) -> Option<OsString> {
        if self.extra_path.is_empty() {
            return None;
        }
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let dirs = self
            .extra_path
            .iter()
            .cloned()
            .chain(std::env::split_paths(&inherited));
        std::env::join_paths(dirs).ok()
    }

    /// `git clone --depth 1 [--branch <ref>] -- <url> <dest>`.
    pub async fn shallow_clone(&self, url: &str, git_ref: Option<&str>, dest: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(["clone", "--depth", "1"]);
        if let Some(r) = git_ref {
            cmd.args(["--branch", r]);
        }
        cmd.arg("--").arg(url).arg(dest);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        tracing::info!(url = %url, git_ref = ?git_ref, dest = %dest.display(), "cloning repository");

        let output = cmd
            .output()
            .await
            .map_err(|e| SkillError::Clone(format!("failed to run {}: {e}", self.program.display())))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("no error output");
        Err(SkillError::Clone(format!(
            "exit code {}: {detail}",
            output
                .status
                .code()
                .map_or_else(|| "none".to_owned(), |c| c.to_string())
        )))
    }
}

/// Windows discovery order: install directories, `where` lookup, bundled
/// copies next to the executable.
fn locate_windows(
    env: impl Fn(&str) -> Option<String>,
    exe_dir: Option<&Path>,
) -> Option<PathBuf> {
    let mut install_dirs = Vec::new();
    for var in ["ProgramFiles", "ProgramW6432", "ProgramFiles(x86)"] {
        if let Some(base) = env(var) {
            install_dirs.push(PathBuf::from(base).join("Git"));
        }
    }
    if let Some(local) = env("LOCALAPPDATA") {
        install_dirs.push(PathBuf::from(local).join("Programs").join("Git"));
    }

    let installed = install_dirs
        .iter()
        .flat_map(|root| [root.join("cmd").join("git.exe"), root.join("bin").join("git.exe")])
        .find(|p| p.is_file());
    if installed.is_some() {
        return installed;
    }

    if let Ok(found) = which::which("git") {
        return Some(found);
    }

    let exe_dir = exe_dir?;
    bundled_candidates(exe_dir).into_iter().find(|p| p.is_file())
}

/// Locations an application bundle may ship git in.
fn bundled_candidates(exe_dir: &Path) -> Vec<PathBuf> {
    let resources = exe_dir.join("resources");
    [resources.join("git"), exe_dir.join("git")]
        .into_iter()
        .flat_map(|root| {
            [
                root.join("cmd").join("git.exe"),
                root.join("bin").join("git.exe"),
                root.join("cmd").join("git"),
                root.join("bin").join("git"),
            ]
        })
        .collect()
}

/// Helper directories of a git installation, given its executable.
///
/// For `<root>/cmd/git.exe` this is `<root>/cmd`, `<root>/bin`,
/// `<root>/mingw64/bin` and `<root>/usr/bin` (those that exist).
fn sibling_dirs(program: &Path) -> Vec<PathBuf> {
    let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Vec::new();
    };
    let mut dirs = vec![dir.to_path_buf()];
    if let Some(root) = dir.parent() {
        for rel in ["cmd", "bin", "mingw64/bin", "usr/bin"] {
            let candidate = root.join(rel);
            if candidate.is_dir() && !dirs.contains(&candidate) {
                dirs.push(candidate);
            }
        }
    }
    dirs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_git_install(root: &Path) -> PathBuf {
        for rel in ["cmd", "bin", "mingw64/bin", "usr/bin"] {
            std::fs::create_dir_all(root.join(rel)).unwrap();
        }
        let exe = root.join("cmd").join("git.exe");
        std::fs::write(&exe, b"").unwrap();
        exe
    }

    #[test]
    fn sibling_dirs_cover_helpers() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = fake_git_install(&tmp.path().join("Git"));

        let dirs = sibling_dirs(&exe);
        let root = tmp.path().join("Git");
        assert_eq!(dirs[0], root.join("cmd"));
        assert!(dirs.contains(&root.join("bin")));
        assert!(dirs.contains(&root.join("mingw64/bin")));
        assert!(dirs.contains(&root.join("usr/bin")));
        assert_eq!(dirs.len(), 4);
    }

    #[test]
    fn bare_program_has_no_siblings() {
        assert!(sibling_dirs(Path::new("git")).is_empty());
    }

    #[test]
    fn windows_probe_prefers_install_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let program_files = tmp.path().join("Program Files");
        let exe = fake_git_install(&program_files.join("Git"));
        let pf = program_files.to_string_lossy().into_owned();

        let found = locate_windows(
            |name| (name == "ProgramFiles").then(|| pf.clone()),
            None,
        );
        assert_eq!(found, Some(exe));
    }

    #[test]
    fn bundled_candidates_live_next_to_executable() {
        let exe_dir = Path::new("app");
        let candidates = bundled_candidates(exe_dir);
        assert_eq!(candidates[0], exe_dir.join("resources/git/cmd/git.exe"));
        assert!(candidates.contains(&exe_dir.join("git/bin/git.exe")));
    }

    #[test]
    fn search_path_prepends_extra_dirs() {
        let tool = GitTool {
            program: PathBuf::from("/opt/git/bin/git"),
            extra_path: vec![PathBuf::from("/opt/git/bin")],
        };
        let path = tool.search_path().unwrap();
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, PathBuf::from("/opt/git/bin"));

        let bare = GitTool {
            program: PathBuf::from("git"),
            extra_path: Vec::new(),
        };
        assert!(bare.search_path().is_none());
    }

    #[tokio::test]
    async fn clone_of_missing_repo_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("no-such-repo");
        let tool = GitTool::locate();

        let err = tool
            .shallow_clone(missing.to_str().unwrap(), None, &tmp.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::Clone(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn url_is_passed_after_option_terminator() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("args.log");
        let script = tmp.path().join("git");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = GitTool {
            program: script,
            extra_path: Vec::new(),
        };
        let dest = tmp.path().join("dest");
        tool.shallow_clone("--upload-pack=touch x.git", Some("v1"), &dest)
            .await
            .unwrap();

        let args: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect();
        assert_eq!(
            args,
            vec![
                "clone".to_owned(),
                "--depth".into(),
                "1".into(),
                "--branch".into(),
                "v1".into(),
                "--".into(),
                "--upload-pack=touch x.git".into(),
                dest.display().to_string(),
            ]
        );
    }
}
