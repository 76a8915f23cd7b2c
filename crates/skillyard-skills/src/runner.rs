//! Script runner: execute skill scripts as supervised subprocesses.
//!
//! A run never returns an error: spawn failures, non-zero exits and timeouts
//! are all described by the returned [`ScriptOutcome`].
//!
//! On timeout the child is asked to stop (`SIGTERM` on Unix, a kill request
//! elsewhere); if it is still alive after the grace window it is killed
//! outright.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;

/// Env flag asking a host executable to behave as a script interpreter.
pub const RUN_AS_NODE_ENV: &str = "SKILLYARD_RUN_AS_NODE";

/// Default hard timeout for a script run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Default wait between the graceful stop request and the forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(2_000);

/// What to run.
#[derive(Debug, Clone, Default)]
pub struct ScriptCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

/// Timing limits for a run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub timeout: Duration,
    pub kill_grace: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

/// Why a run could not produce a normal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptErrorKind {
    /// The executable does not exist.
    NotFound,
    /// Spawning failed for another reason.
    Spawn,
    /// Waiting on the child failed.
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOutcome {
    /// Zero exit code and no timeout.
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ScriptError>,
}

impl ScriptOutcome {
    fn failed(kind: ScriptErrorKind, message: String, started: Instant) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: elapsed_ms(started),
            timed_out: false,
            error: Some(ScriptError { kind, message }),
        }
    }

    /// Whether the run failed because the executable was missing.
    pub fn is_not_found(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == ScriptErrorKind::NotFound)
    }
}

/// Run `command` to completion or until `limits.timeout` expires.
pub async fn run_script(command: &ScriptCommand, limits: RunLimits) -> ScriptOutcome {
    let started = Instant::now();

    let mut cmd = tokio::process::Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let kind = if e.kind() == std::io::ErrorKind::NotFound {
                ScriptErrorKind::NotFound
            } else {
                ScriptErrorKind::Spawn
            };
            tracing::debug!(program = %command.program.display(), error = %e, "failed to spawn script");
            return ScriptOutcome::failed(
                kind,
                format!("failed to start {}: {e}", command.program.display()),
                started,
            );
        }
    };

    let stdout_task = tokio::spawn(drain(child.stdout.take()));
    let stderr_task = tokio::spawn(drain(child.stderr.take()));

    let (status, timed_out) = match tokio::time::timeout(limits.timeout, child.wait()).await {
        Ok(status) => (status, false),
        Err(_) => {
            tracing::warn!(
                program = %command.program.display(),
                timeout_ms = limits.timeout.as_millis() as u64,
                "script timed out, terminating"
            );
            (terminate(&mut child, limits.kill_grace).await, true)
        }
    };

    // Grandchildren may hold the pipes open after the child is gone.
    let stdout = collect(stdout_task, limits.kill_grace).await;
    let stderr = collect(stderr_task, limits.kill_grace).await;

    match status {
        Ok(status) => {
            let exit_code = status.code();
            ScriptOutcome {
                success: !timed_out && exit_code == Some(0),
                exit_code,
                stdout,
                stderr,
                duration_ms: elapsed_ms(started),
                timed_out,
                error: None,
            }
        }
        Err(e) => ScriptOutcome {
            stdout,
            stderr,
            timed_out,
            ..ScriptOutcome::failed(ScriptErrorKind::Io, format!("failed to wait for script: {e}"), started)
        },
    }
}

/// Graceful stop, then a forced kill once `grace` has passed.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    request_stop(child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(pid = ?child.id(), "script ignored stop request, killing");
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::debug!(pid, error = %e, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "failed to request termination");
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "error reading script output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(task: tokio::task::JoinHandle<String>, wait: Duration) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(wait, task).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "output reader failed");
            String::new()
        }
        Err(_) => {
            abort.abort();
            tracing::debug!("output pipe still open after exit, giving up on it");
            String::new()
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Runtime candidates
// ---------------------------------------------------------------------------

/// An executable able to run a skill script, with any env it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCandidate {
    pub label: String,
    pub program: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl RuntimeCandidate {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// Candidates tried in order: a plain `node` in development builds, then the
/// host runtime in interpreter mode (or `node` when no host runtime is set).
pub fn default_runtime_candidates(host_runtime: Option<&Path>) -> Vec<RuntimeCandidate> {
    let mut candidates = Vec::new();
    if cfg!(debug_assertions) {
        candidates.push(RuntimeCandidate::new("node", "node"));
    }
    match host_runtime {
        Some(host) => candidates
            .push(RuntimeCandidate::new("host", host).with_env(RUN_AS_NODE_ENV, "1")),
        None if candidates.is_empty() => candidates.push(RuntimeCandidate::new("node", "node")),
        None => {}
    }
    candidates
}

/// Run `script` with each candidate in turn, moving on only when the
/// candidate's executable is missing. Any other outcome is final.
pub async fn run_with_candidates(
    candidates: &[RuntimeCandidate],
    script: &Path,
    args: &[String],
    cwd: Option<&Path>,
    env: &BTreeMap<String, String>,
    limits: RunLimits,
) -> ScriptOutcome {
    let mut last = None;
    for candidate in candidates {
        let mut merged = env.clone();
        merged.extend(candidate.env.clone());

        let mut full_args = vec![script.to_string_lossy().into_owned()];
        full_args.extend(args.iter().cloned());

        let command = ScriptCommand {
            program: candidate.program.clone(),
            args: full_args,
            cwd: cwd.map(Path::to_path_buf),
            env: merged,
        };
        let outcome = run_script(&command, limits).await;
        if !outcome.is_not_found() {
            return outcome;
        }
        tracing::debug!(runtime = %candidate.label, "runtime not found, trying next candidate");
        last = Some(outcome);
    }

    last.unwrap_or_else(|| {
        ScriptOutcome::failed(
            ScriptErrorKind::NotFound,
            "no script runtime available".into(),
            Instant::now(),
        )
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
