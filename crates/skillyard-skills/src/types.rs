//! Shared value types returned by the skill manager.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::roots::RootKind;

/// Read-only projection of one skill directory, recomputed on every
/// registry read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    /// Directory basename; the identity used across roots and in the state
    /// map.
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub is_official: bool,
    /// Whether an independent scan of the bundled root contains `id`.
    pub is_built_in: bool,
    /// Manifest modification time, RFC 3339 UTC.
    pub updated_at: String,
    /// Manifest body, trimmed.
    pub prompt: String,
    /// Absolute path of the manifest file.
    pub skill_path: PathBuf,
    /// Resolved default sort key.
    pub order: i64,
    /// Root the winning copy came from.
    pub root_kind: RootKind,
}

/// One skill copied into the primary root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledSkill {
    pub id: String,
    pub path: PathBuf,
}

/// Broadcast whenever the on-disk skill set may have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillsChanged {
    /// A watched root or skill directory saw filesystem activity.
    Filesystem,
    /// The manager itself mutated the inventory.
    Mutation,
}
