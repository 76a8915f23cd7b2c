//! Named connectivity tests: run a skill's probe scripts and classify the
//! results.
//!
//! Every check of a test runs with the same environment (the skill's `.env`
//! plus caller overrides) and the same timeout. The test passes only when
//! every check passes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::env_file::{ENV_FILE, read_env_file};
use crate::error::{Result, SkillError};
use crate::path_safety::resolve_within;
use crate::runner::{RunLimits, RuntimeCandidate, ScriptOutcome, run_with_candidates};

/// One probe script.
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityCheck {
    pub name: &'static str,
    /// Path relative to the skill directory.
    pub script: &'static str,
    pub args: &'static [&'static str],
}

/// A named group of checks bound to one skill.
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityTest {
    pub name: &'static str,
    pub skill_id: &'static str,
    pub checks: &'static [ConnectivityCheck],
}

/// Built-in tests, looked up by name.
pub const BUILTIN_TESTS: &[ConnectivityTest] = &[ConnectivityTest {
    name: "email",
    skill_id: "imap-smtp-email",
    checks: &[
        ConnectivityCheck {
            name: "imap",
            script: "scripts/imap.js",
            args: &["--check"],
        },
        ConnectivityCheck {
            name: "smtp",
            script: "scripts/smtp.js",
            args: &["--check"],
        },
    ],
}];

pub fn find_test(name: &str) -> Result<&'static ConnectivityTest> {
    BUILTIN_TESTS
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| SkillError::UnknownTest(name.to_owned()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ScriptOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReport {
    pub test: String,
    pub skill_id: String,
    pub passed: bool,
    pub checks: Vec<CheckResult>,
}

/// Classify a run. Failure messages prefer the timeout marker, then the
/// spawn error, then the last non-empty output line, then a generic message.
pub fn classify(outcome: &ScriptOutcome, limits: RunLimits) -> (CheckStatus, Option<String>) {
    if outcome.success {
        return (CheckStatus::Pass, None);
    }
    if outcome.timed_out {
        return (
            CheckStatus::Fail,
            Some(format!("timed out after {} ms", limits.timeout.as_millis())),
        );
    }
    if let Some(error) = &outcome.error {
        return (CheckStatus::Fail, Some(error.message.clone()));
    }
    let line = last_line(&outcome.stderr).or_else(|| last_line(&outcome.stdout));
    let message = line.map(str::to_owned).unwrap_or_else(|| match outcome.exit_code {
        Some(code) => format!("check failed with exit code {code}"),
        None => "check failed".to_owned(),
    });
    (CheckStatus::Fail, Some(message))
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

/// Run every check of `test` against `skill_dir` concurrently.
pub async fn run_connectivity_test(
    test: &ConnectivityTest,
    skill_dir: &Path,
    overrides: &BTreeMap<String, String>,
    candidates: &[RuntimeCandidate],
    limits: RunLimits,
) -> Result<ConnectivityReport> {
    let mut env = read_env_file(&skill_dir.join(ENV_FILE))?;
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let runs = test.checks.iter().map(|check| {
        let env = &env;
        async move {
            let script = match resolve_within(skill_dir, check.script) {
                Ok(path) if path.is_file() => path,
                _ => {
                    return CheckResult {
                        name: check.name.to_owned(),
                        status: CheckStatus::Fail,
                        message: Some(format!("script not found: {}", check.script)),
                        outcome: None,
                    };
                }
            };
            let args: Vec<String> = check.args.iter().map(|a| (*a).to_owned()).collect();
            let outcome =
                run_with_candidates(candidates, &script, &args, Some(skill_dir), env, limits).await;
            let (status, message) = classify(&outcome, limits);
            tracing::debug!(check = check.name, ?status, "connectivity check finished");
            CheckResult {
                name: check.name.to_owned(),
                status,
                message,
                outcome: Some(outcome),
            }
        }
    });
    let checks = futures::future::join_all(runs).await;

    let passed = !checks.is_empty() && checks.iter().all(|c| c.status == CheckStatus::Pass);
    tracing::info!(test = test.name, skill = test.skill_id, passed, "connectivity test finished");
    Ok(ConnectivityReport {
        test: test.name.to_owned(),
        skill_id: test.skill_id.to_owned(),
        passed,
        checks,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ScriptError, ScriptErrorKind};
    use std::time::Duration;

    fn outcome() -> ScriptOutcome {
        ScriptOutcome {
            success: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 5,
            timed_out: false,
            error: None,
        }
    }

    #[test]
    fn email_test_is_builtin() {
        let test = find_test("email").unwrap();
        assert_eq!(test.skill_id, "imap-smtp-email");
        assert_eq!(test.checks.len(), 2);
        assert!(matches!(find_test("fax"), Err(SkillError::UnknownTest(_))));
    }

    #[test]
    fn classification_preference_order() {
        let limits = RunLimits {
            timeout: Duration::from_millis(20_000),
            kill_grace: Duration::from_millis(2_000),
        };

        let ok = ScriptOutcome {
            success: true,
            exit_code: Some(0),
            ..outcome()
        };
        assert_eq!(classify(&ok, limits), (CheckStatus::Pass, None));

        let timed_out = ScriptOutcome {
            timed_out: true,
            exit_code: None,
            stderr: "partial".into(),
            ..outcome()
        };
        assert_eq!(
            classify(&timed_out, limits).1.as_deref(),
            Some("timed out after 20000 ms")
        );

        let spawn = ScriptOutcome {
            error: Some(ScriptError {
                kind: ScriptErrorKind::Spawn,
                message: "permission denied".into(),
            }),
            stderr: "ignored".into(),
            ..outcome()
        };
        assert_eq!(classify(&spawn, limits).1.as_deref(), Some("permission denied"));

        let stderr = ScriptOutcome {
            stderr: "connecting\nAuth failed: bad password\n\n".into(),
            stdout: "from stdout".into(),
            ..outcome()
        };
        assert_eq!(
            classify(&stderr, limits).1.as_deref(),
            Some("Auth failed: bad password")
        );

        let stdout_only = ScriptOutcome {
            stdout: "ECONNREFUSED\n".into(),
            ..outcome()
        };
        assert_eq!(classify(&stdout_only, limits).1.as_deref(), Some("ECONNREFUSED"));

        assert_eq!(
            classify(&outcome(), limits).1.as_deref(),
            Some("check failed with exit code 1")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn report_fails_when_any_check_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let skill = tmp.path();
        std::fs::create_dir(skill.join("scripts")).unwrap();
        std::fs::write(skill.join(ENV_FILE), "IMAP_HOST=imap.example.com\nSMTP_OK=0\n").unwrap();
        std::fs::write(
            skill.join("scripts/imap.js"),
            "echo \"imap $IMAP_HOST $1\"; exit 0",
        )
        .unwrap();
        std::fs::write(
            skill.join("scripts/smtp.js"),
            "[ \"$SMTP_OK\" = 1 ] && exit 0; echo 'SMTP login rejected' >&2; exit 2",
        )
        .unwrap();

        let test = find_test("email").unwrap();
        let candidates = vec![RuntimeCandidate::new("sh", "sh")];

        let report = run_connectivity_test(test, skill, &BTreeMap::new(), &candidates, RunLimits::default())
            .await
            .unwrap();
        assert!(!report.passed);
        assert_eq!(report.checks[0].status, CheckStatus::Pass);
        assert_eq!(
            report.checks[0].outcome.as_ref().unwrap().stdout,
            "imap imap.example.com --check\n"
        );
        assert_eq!(report.checks[1].status, CheckStatus::Fail);
        assert_eq!(report.checks[1].message.as_deref(), Some("SMTP login rejected"));

        let mut overrides = BTreeMap::new();
        overrides.insert("SMTP_OK".to_owned(), "1".to_owned());
        let report = run_connectivity_test(test, skill, &overrides, &candidates, RunLimits::default())
            .await
            .unwrap();
        assert!(report.passed);
    }

    #[tokio::test]
    async fn missing_scripts_fail_without_running() {
        let tmp = tempfile::tempdir().unwrap();
        let test = find_test("email").unwrap();
        let report = run_connectivity_test(test, tmp.path(), &BTreeMap::new(), &[], RunLimits::default())
            .await
            .unwrap();
        assert!(!report.passed);
        assert!(report.checks.iter().all(|c| c.outcome.is_none()));
    }
}
