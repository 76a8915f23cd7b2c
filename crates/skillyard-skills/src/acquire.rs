//! Acquisition pipeline: materialise an [`AcquisitionPlan`] as a directory
//! tree on local disk.
//!
//! Remote sources are shallow-cloned; when cloning fails and the repository
//! lives on the recognised web host, a handful of archive URLs are tried in
//! order instead. Everything fetched or extracted lands in a scratch
//! directory owned by the returned [`Acquisition`], which removes it on
//! [`Acquisition::release`] or when dropped, however the caller's operation
//! ended.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::archive::{ArchiveKind, extract_archive, unwrap_single_root};
use crate::error::{Result, SkillError};
use crate::git::GitTool;
use crate::manifest::MANIFEST_FILE;
use crate::path_safety::{resolve_within, sanitize_folder_name};
use crate::source::{AcquisitionPlan, LocalKind, RemoteSource, WebRepo};

/// Default web base for archive downloads.
pub const DEFAULT_WEB_BASE: &str = "https://github.com";

/// Default API base for zipball downloads.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Ref assumed when a web repository is downloaded without an explicit ref.
const DEFAULT_ARCHIVE_REF: &str = "main";

const DOWNLOAD_FILE: &str = ".download.zip";
const EXTRACT_DIR: &str = ".extracted";

/// An acquired source tree.
///
/// Owns the scratch directory (if any) the tree was materialised in; the
/// directory is removed on drop and removal failures are logged.
#[derive(Debug)]
pub struct Acquisition {
    root: PathBuf,
    name_hint: Option<String>,
    scratch: Option<TempDir>,
}

impl Acquisition {
    fn in_scratch() -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("skillyard-acquire-")
            .tempdir()?;
        Ok(Self {
            root: scratch.path().to_path_buf(),
            name_hint: None,
            scratch: Some(scratch),
        })
    }

    /// Root of the acquired tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder name to install under when the root itself is a skill.
    pub fn name_hint(&self) -> Option<&str> {
        self.name_hint.as_deref()
    }

    /// Narrow the acquisition to `subpath` beneath the current root.
    fn scope_to(&mut self, subpath: &str) -> Result<()> {
        let scoped = scope_to_subpath(&self.root, subpath)?;
        if let Some(name) = scoped.file_name() {
            self.name_hint = Some(sanitize_folder_name(&name.to_string_lossy()));
        }
        self.root = scoped;
        Ok(())
    }
}

impl Acquisition {
    /// Remove the scratch directory on the blocking pool.
    ///
    /// Dropping also cleans up, but does the removal on the current thread;
    /// async callers should prefer this.
    pub async fn release(mut self) {
        let Some(scratch) = self.scratch.take() else {
            return;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || close_scratch(scratch)).await {
            tracing::warn!(error = %e, "scratch cleanup task failed");
        }
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            close_scratch(scratch);
        }
    }
}

fn close_scratch(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    match scratch.close() {
        Ok(()) => tracing::debug!(path = %path.display(), "removed acquisition scratch directory"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove acquisition scratch directory"
        ),
    }
}

/// Executes acquisition plans.
#[derive(Debug, Clone)]
pub struct Acquirer {
    http: reqwest::Client,
    git: GitTool,
    web_base: String,
    api_base: String,
}

impl Acquirer {
    /// Create an acquirer that downloads archives from `web_base` /
    /// `api_base` and clones with the platform's git.
    pub fn new(web_base: &str, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("skillyard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            git: GitTool::locate(),
            web_base: web_base.trim_end_matches('/').to_owned(),
            api_base: api_base.trim_end_matches('/').to_owned(),
        })
    }

    /// Replace the git tool used for cloning.
    pub fn with_git(mut self, git: GitTool) -> Self {
        self.git = git;
        self
    }

    /// Materialise `plan` on local disk.
    pub async fn acquire(&self, plan: &AcquisitionPlan) -> Result<Acquisition> {
        tracing::info!(source = %plan.describe(), "acquiring skill source");
        match plan {
            AcquisitionPlan::Local { path, kind } => self.acquire_local(path, *kind).await,
            AcquisitionPlan::Remote(remote) => self.acquire_remote(remote).await,
        }
    }

    async fn acquire_local(&self, path: &Path, kind: LocalKind) -> Result<Acquisition> {
        match kind {
            LocalKind::Directory | LocalKind::Manifest => Ok(Acquisition {
                root: path.canonicalize()?,
                name_hint: None,
                scratch: None,
            }),
            LocalKind::Archive(archive_kind) => {
                let mut acquisition = Acquisition::in_scratch()?;
                let dest = acquisition.root.join(EXTRACT_DIR);
                let archive = path.to_path_buf();
                let extract_to = dest.clone();
                tokio::task::spawn_blocking(move || extract_archive(&archive, archive_kind, &extract_to))
                    .await??;
                acquisition.root = dest;
                acquisition.name_hint = Some(sanitize_folder_name(archive_stem(path)));
                Ok(acquisition)
            }
        }
    }

    async fn acquire_remote(&self, remote: &RemoteSource) -> Result<Acquisition> {
        let mut acquisition = Acquisition::in_scratch()?;
        let folder = remote_folder_name(remote);
        let clone_dest = acquisition.root.join(&folder);

        let root = match self
            .git
            .shallow_clone(&remote.repo_url, remote.git_ref.as_deref(), &clone_dest)
            .await
        {
            Ok(()) => clone_dest,
            Err(clone_err) => {
                let Some(web) = &remote.web else {
                    return Err(clone_err);
                };
                tracing::warn!(
                    repo = %remote.repo_url,
                    error = %clone_err,
                    "clone failed, falling back to archive download"
                );
                let scratch = acquisition.root.clone();
                match self
                    .download_archive(web, remote.git_ref.as_deref(), &scratch)
                    .await
                {
                    Ok(root) => root,
                    Err(archive_err) => {
                        return Err(SkillError::Acquisition {
                            repo: remote.repo_url.clone(),
                            clone: inner_message(clone_err),
                            archive: inner_message(archive_err),
                        });
                    }
                }
            }
        };

        acquisition.root = root;
        acquisition.name_hint = Some(folder);
        if let Some(subpath) = &remote.source_subpath {
            acquisition.scope_to(subpath)?;
        }
        Ok(acquisition)
    }

    /// Try each archive candidate in order; the first success response is
    /// extracted and its single wrapper directory unwrapped.
    async fn download_archive(
        &self,
        web: &WebRepo,
        git_ref: Option<&str>,
        scratch: &Path,
    ) -> Result<PathBuf> {
        let mut failures = Vec::new();

        for url in archive_candidates(web, git_ref, &self.web_base, &self.api_base) {
            tracing::debug!(url = %url, "trying archive download");
            let response = match self.http.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    failures.push(format!("{url}: {e}"));
                    continue;
                }
            };
            if !response.status().is_success() {
                failures.push(format!("{url}: HTTP {}", response.status()));
                continue;
            }

            let bytes = response.bytes().await?;
            let zip_path = scratch.join(DOWNLOAD_FILE);
            tokio::fs::write(&zip_path, &bytes).await?;

            let extract_dir = scratch.join(EXTRACT_DIR);
            let root = tokio::task::spawn_blocking(move || {
                extract_archive(&zip_path, ArchiveKind::Zip, &extract_dir)?;
                unwrap_single_root(&extract_dir)
            })
            .await??;

            tracing::info!(url = %url, bytes = bytes.len(), "downloaded repository archive");
            return Ok(root);
        }

        Err(SkillError::Download(failures.join("; ")))
    }
}

/// Archive URLs for `web`, in the order they are tried: the ref as a branch,
/// as a tag, as a generic archive, then the API zipball.
pub fn archive_candidates(
    web: &WebRepo,
    git_ref: Option<&str>,
    web_base: &str,
    api_base: &str,
) -> Vec<String> {
    let web_base = web_base.trim_end_matches('/');
    let api_base = api_base.trim_end_matches('/');
    let WebRepo { owner, repo } = web;
    let r = git_ref.unwrap_or(DEFAULT_ARCHIVE_REF);

    let zipball = match git_ref {
        Some(r) => format!("{api_base}/repos/{owner}/{repo}/zipball/{r}"),
        None => format!("{api_base}/repos/{owner}/{repo}/zipball"),
    };

    vec![
        format!("{web_base}/{owner}/{repo}/archive/refs/heads/{r}.zip"),
        format!("{web_base}/{owner}/{repo}/archive/refs/tags/{r}.zip"),
        format!("{web_base}/{owner}/{repo}/archive/{r}.zip"),
        zipball,
    ]
}

/// Resolve `subpath` beneath `root`; it must exist and be a directory or a
/// `SKILL.md` file (which scopes to its parent).
pub fn scope_to_subpath(root: &Path, subpath: &str) -> Result<PathBuf> {
    let target = resolve_within(root, subpath)?;
    let meta = match std::fs::metadata(&target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SkillError::MissingSubpath(subpath.to_owned()));
        }
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        return Ok(target);
    }
    if target.file_name().is_some_and(|n| n == MANIFEST_FILE) {
        if let Some(parent) = target.parent() {
            return Ok(parent.to_path_buf());
        }
    }
    Err(SkillError::InvalidSource {
        source_str: subpath.to_owned(),
        reason: format!("subpath must be a directory or a `{MANIFEST_FILE}` file"),
    })
}

/// Folder name for a remote clone: the plan's hint, else the last segment of
/// the repository URL, sanitised.
fn remote_folder_name(remote: &RemoteSource) -> String {
    let raw = remote.repo_name_hint.clone().unwrap_or_else(|| {
        let trimmed = remote.repo_url.trim_end_matches('/');
        let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
        last.strip_suffix(".git").unwrap_or(last).to_owned()
    });
    sanitize_folder_name(&raw)
}

fn archive_stem(path: &Path) -> &str {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    for ext in [".tar.gz", ".tgz", ".zip", ".tar"] {
        if lower.ends_with(ext) {
            return &name[..name.len() - ext.len()];
        }
    }
    name
}

fn inner_message(err: SkillError) -> String {
    match err {
        SkillError::Clone(msg) | SkillError::Download(msg) => msg,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
