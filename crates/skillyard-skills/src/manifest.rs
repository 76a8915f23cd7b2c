//! SKILL.md parser.
//!
//! A SKILL.md file consists of:
//! 1. An optional header block delimited by `---` lines, holding flat
//!    `key: value` pairs.
//! 2. A free-form body holding the skill's instructions.
//!
//! ```text
//! ---
//! name: web-search
//! description: Search the web and summarise results.
//! official: true
//! ---
//!
//! # Web Search
//!
//! Instructions for the assistant go here...
//! ```
//!
//! Parsing never fails: a missing or unterminated header yields an empty
//! header map and the whole text as body, and header lines that are not
//! `key: value` pairs are skipped.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;

/// The file that marks a directory as a skill.
pub const MANIFEST_FILE: &str = "SKILL.md";

const DELIMITER: &str = "---";

static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-]+)\s*:\s*(.*)$").expect("header line pattern is valid")
});

/// A parsed manifest: header key/value pairs plus the body text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub header: BTreeMap<String, String>,
    pub body: String,
}

impl Manifest {
    /// Return a header value, trimmed, if present and non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.header
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Display name: the `name` header, else `fallback` (the directory
    /// basename).
    pub fn name_or(&self, fallback: &str) -> String {
        self.get("name").unwrap_or(fallback).to_owned()
    }

    /// Description: the `description` header, else the first non-empty body
    /// line, else `name`.
    pub fn description_or(&self, name: &str) -> String {
        if let Some(desc) = self.get("description") {
            return desc.to_owned();
        }
        self.body
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(name)
            .to_owned()
    }

    /// Whether the manifest carries a truthy `official` flag.
    pub fn is_official(&self) -> bool {
        self.get("official")
            .or_else(|| self.get("isOfficial"))
            .is_some_and(is_truthy)
    }

    /// The instruction body with surrounding whitespace removed.
    pub fn prompt(&self) -> &str {
        self.body.trim()
    }
}

/// Parse manifest text into header and body.
pub fn parse_manifest(content: &str) -> Manifest {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    match split_header(content) {
        Some((header_block, body)) => Manifest {
            header: parse_header(header_block),
            body: body.to_owned(),
        },
        None => Manifest {
            header: BTreeMap::new(),
            body: content.to_owned(),
        },
    }
}

/// Read and parse a manifest file.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_manifest(&content))
}

/// Split `content` into `(header_block, body)` when it opens with a `---`
/// line and has a matching closing `---` line.
fn split_header(content: &str) -> Option<(&str, &str)> {
    let (first, mut rest) = next_line(content)?;
    if first != DELIMITER {
        return None;
    }

    let header_start = content.len() - rest.len();
    loop {
        let line_start = content.len() - rest.len();
        let (line, after) = next_line(rest)?;
        if line == DELIMITER {
            return Some((&content[header_start..line_start], after));
        }
        rest = after;
    }
}

/// Return the next line (without its terminator) and the remaining text.
/// Returns `None` once the input is exhausted.
fn next_line(text: &str) -> Option<(&str, &str)> {
    if text.is_empty() {
        return None;
    }
    let (line, rest) = match text.find('\n') {
        Some(idx) => (&text[..idx], &text[idx + 1..]),
        None => (text, ""),
    };
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn parse_header(block: &str) -> BTreeMap<String, String> {
    let mut header = BTreeMap::new();
    for raw in block.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(caps) = HEADER_LINE.captures(line) else {
            tracing::trace!(line = %line, "skipping malformed manifest header line");
            continue;
        };
        let value = strip_quotes(caps[2].trim());
        header.insert(caps[1].to_owned(), value.to_owned());
    }
    header
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Interpret a header value as a boolean flag.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
