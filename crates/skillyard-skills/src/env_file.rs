//! Per-skill `.env` configuration.
//!
//! Parsing goes through `dotenvy`; writing emits one `KEY=VALUE` line per
//! entry, double-quoting values that would not survive a round trip bare.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SkillError};

/// Per-skill config filename.
pub const ENV_FILE: &str = ".env";

static KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env key pattern is valid"));

/// Read `path` as `KEY=VALUE` lines. A missing file is an empty map.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(env_error(path, e)),
    };

    let mut values = BTreeMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| env_error(path, e))?;
        values.insert(key, value);
    }
    Ok(values)
}

/// Replace `path` with `values`. Keys are validated before anything is
/// written; the file is swapped in atomically.
pub fn write_env_file(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    for key in values.keys() {
        validate_key(key)?;
    }

    let mut out = String::new();
    for (key, value) in values {
        out.push_str(key);
        out.push('=');
        out.push_str(&encode_value(value));
        out.push('\n');
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(out.as_bytes())?;
    tmp.persist(path).map_err(|e| SkillError::Io(e.error))?;
    tracing::debug!(path = %path.display(), keys = values.len(), "skill config written");
    Ok(())
}

pub fn validate_key(key: &str) -> Result<()> {
    if KEY.is_match(key) {
        Ok(())
    } else {
        Err(SkillError::InvalidConfig(format!(
            "`{key}` is not a valid variable name"
        )))
    }
}

fn encode_value(value: &str) -> String {
    let bare_ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@+,".contains(c));
    if bare_ok {
        return value.to_owned();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '$' => quoted.push_str("\\$"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

fn env_error(path: &Path, err: dotenvy::Error) -> SkillError {
    SkillError::InvalidConfig(format!("{}: {err}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
