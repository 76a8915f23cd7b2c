//! Source normalizer: turns an arbitrary source string into an
//! [`AcquisitionPlan`].
//!
//! Accepted inputs, checked in order:
//!
//! 1. An existing local directory, archive file, or `SKILL.md` file.
//! 2. A web URL of the form `https://host/owner/repo/(tree|blob)/ref/sub/path`.
//! 3. `owner/repo` shorthand.
//! 4. A URL with a scheme, an SSH remote (`git@host:owner/repo`), or anything
//!    ending in `.git`.
//!
//! Anything else is rejected before any filesystem or network work happens.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::archive::ArchiveKind;
use crate::error::{Result, SkillError};
use crate::manifest::MANIFEST_FILE;

/// Default host for shorthand and web-URL sources.
pub const DEFAULT_GIT_HOST: &str = "github.com";

static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-]+)/([A-Za-z0-9_.\-]+)$").expect("shorthand pattern is valid")
});

static SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("scheme pattern is valid")
});

static SSH_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+@[A-Za-z0-9_.\-]+:").expect("ssh pattern is valid")
});

/// How to materialise a skill source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionPlan {
    /// Already on disk.
    Local { path: PathBuf, kind: LocalKind },
    /// Must be cloned or downloaded.
    Remote(RemoteSource),
}

/// What a local source path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    /// A directory (a skill, or a container of skills).
    Directory,
    /// An archive that must be extracted first.
    Archive(ArchiveKind),
    /// A `SKILL.md` file; its parent directory is the source.
    Manifest,
}

/// A remote repository source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    /// URL handed to `git clone`.
    pub repo_url: String,
    /// Branch, tag, or commit-ish to check out.
    pub git_ref: Option<String>,
    /// Path inside the repository to scope the acquisition to.
    pub source_subpath: Option<String>,
    /// Preferred folder name for the clone.
    pub repo_name_hint: Option<String>,
    /// Set when the repository is on the recognised web host, enabling the
    /// archive-download fallback.
    pub web: Option<WebRepo>,
}

/// An `owner/repo` pair on the recognised web host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRepo {
    pub owner: String,
    pub repo: String,
}

impl AcquisitionPlan {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Local { path, .. } => format!("local:{}", path.display()),
            Self::Remote(remote) => match (&remote.git_ref, &remote.source_subpath) {
                (Some(r), Some(sub)) => format!("{}@{r}:{sub}", remote.repo_url),
                (Some(r), None) => format!("{}@{r}", remote.repo_url),
                (None, Some(sub)) => format!("{}:{sub}", remote.repo_url),
                (None, None) => remote.repo_url.clone(),
            },
        }
    }
}

/// Classify `source` into an acquisition plan.
///
/// `host` is the web host used for shorthand expansion and tree/blob URL
/// recognition (normally [`DEFAULT_GIT_HOST`]).
pub fn normalize_source(source: &str, host: &str) -> Result<AcquisitionPlan> {
    let trimmed = source.trim();
    let invalid = |reason: String| SkillError::InvalidSource {
        source_str: trimmed.to_owned(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("source is empty".into()));
    }

    // 1. Local path.
    let local = Path::new(trimmed);
    if local.exists() {
        return classify_local(local).ok_or_else(|| {
            invalid(format!(
                "local file is neither `{MANIFEST_FILE}` nor a supported archive"
            ))
        });
    }

    // 2. Web tree/blob URL (and plain repository URLs on the web host).
    if let Some(plan) = parse_web_url(trimmed, host).map_err(invalid)? {
        return Ok(plan);
    }

    // 3. owner/repo shorthand.
    if let Some(caps) = SHORTHAND.captures(trimmed) {
        let owner = caps[1].to_owned();
        let repo = strip_git_suffix(&caps[2]).to_owned();
        return Ok(AcquisitionPlan::Remote(RemoteSource {
            repo_url: format!("https://{host}/{owner}/{repo}.git"),
            git_ref: None,
            source_subpath: None,
            repo_name_hint: Some(repo.clone()),
            web: Some(WebRepo { owner, repo }),
        }));
    }

    // 4. Anything that already looks like a clone URL. A leading `-` would
    // reach `git clone` as an option.
    if trimmed.starts_with('-') {
        return Err(invalid("repository URL must not start with `-`".into()));
    }
    if SCHEME.is_match(trimmed) || SSH_REMOTE.is_match(trimmed) || trimmed.ends_with(".git") {
        return Ok(AcquisitionPlan::Remote(RemoteSource {
            repo_url: trimmed.to_owned(),
            git_ref: None,
            source_subpath: None,
            repo_name_hint: None,
            web: None,
        }));
    }

    Err(invalid(
        "expected a local path, owner/repo, or a repository URL".into(),
    ))
}

fn classify_local(path: &Path) -> Option<AcquisitionPlan> {
    if path.is_dir() {
        return Some(AcquisitionPlan::Local {
            path: path.to_path_buf(),
            kind: LocalKind::Directory,
        });
    }

    if path.file_name().is_some_and(|n| n == MANIFEST_FILE) {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        return Some(AcquisitionPlan::Local {
            path: parent.to_path_buf(),
            kind: LocalKind::Manifest,
        });
    }

    ArchiveKind::detect(path).map(|kind| AcquisitionPlan::Local {
        path: path.to_path_buf(),
        kind: LocalKind::Archive(kind),
    })
}

/// Recognise `http(s)://host/owner/repo[/(tree|blob)/ref[/subpath]]`.
///
/// Returns `Ok(None)` when `input` is not a URL on `host`, so later rules can
/// still match it.
fn parse_web_url(input: &str, host: &str) -> std::result::Result<Option<AcquisitionPlan>, String> {
    let Ok(url) = url::Url::parse(input) else {
        return Ok(None);
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Ok(None);
    }
    let Some(url_host) = url.host_str() else {
        return Ok(None);
    };
    let host_matches =
        url_host.eq_ignore_ascii_case(host) || url_host.eq_ignore_ascii_case(&format!("www.{host}"));
    if !host_matches {
        return Ok(None);
    }

    // The URL parser collapses `.` and `..` segments, so the layout is read
    // from the raw input to keep traversal attempts visible.
    let mut segments: Vec<&str> = raw_path(input).split('/').skip(1).collect();
    if segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }

    if segments.len() < 2 || segments[0].is_empty() || segments[1].is_empty() {
        return Ok(None);
    }

    let owner = segments[0].to_owned();
    let repo = strip_git_suffix(segments[1]).to_owned();
    let web = WebRepo {
        owner: owner.clone(),
        repo: repo.clone(),
    };
    let repo_url = format!("https://{host}/{owner}/{repo}.git");

    match segments.len() {
        2 => Ok(Some(AcquisitionPlan::Remote(RemoteSource {
            repo_url,
            git_ref: None,
            source_subpath: None,
            repo_name_hint: Some(repo),
            web: Some(web),
        }))),
        n if n >= 4 && matches!(segments[2], "tree" | "blob") => {
            let git_ref = decode_segment(segments[3])?;
            if git_ref.is_empty() {
                return Err("ref is empty".into());
            }
            let source_subpath = if n > 4 {
                Some(validate_subpath(&segments[4..])?)
            } else {
                None
            };
            let repo_name_hint = source_subpath
                .as_deref()
                .and_then(|sub| sub.rsplit('/').next())
                .filter(|_| segments[2] == "tree")
                .map(str::to_owned)
                .or(Some(repo));
            Ok(Some(AcquisitionPlan::Remote(RemoteSource {
                repo_url,
                git_ref: Some(git_ref),
                source_subpath,
                repo_name_hint,
                web: Some(web),
            })))
        }
        _ => Err(format!(
            "unsupported URL layout; expected /owner/repo or /owner/repo/tree/<ref>/<path>, got {}",
            raw_path(input)
        )),
    }
}

/// The path portion of `input` as typed: everything after the authority, up
/// to any query or fragment.
fn raw_path(input: &str) -> &str {
    let after_scheme = input.split_once("://").map_or(input, |(_, rest)| rest);
    let path = after_scheme
        .find('/')
        .map_or("", |idx| &after_scheme[idx..]);
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn decode_segment(segment: &str) -> std::result::Result<String, String> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|e| format!("invalid percent-encoding in `{segment}`: {e}"))
}

/// Decode subpath segments and reject `.`/`..` and empty results.
pub fn validate_subpath(segments: &[&str]) -> std::result::Result<String, String> {
    let mut parts = Vec::new();
    for raw in segments {
        let decoded = decode_segment(raw)?;
        for part in decoded.split(['/', '\\']) {
            match part {
                "" => continue,
                "." | ".." => return Err(format!("subpath segment `{part}` is not allowed")),
                other => parts.push(other.to_owned()),
            }
        }
    }
    if parts.is_empty() {
        return Err("subpath is empty".into());
    }
    Ok(parts.join("/"))
}

fn strip_git_suffix(name: &str) -> &str {
    name.strip_suffix(".git").unwrap_or(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
