//! Enable-state persistence.
//!
//! The enable-state map (`id -> {enabled}`) lives as JSON under a single key
//! of an external key-value store. Older installs stored an array of full
//! skill snapshots under the same key; reads understand that shape and
//! [`SkillStateStore::migrate`] rewrites it as a map once.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Key holding the enable-state map.
pub const STATE_KEY: &str = "skills_state";

/// Minimal string key-value store the state map is persisted in.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl KeyValueStore for skillyard_store::KvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(skillyard_store::KvStore::get(self, key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        Ok(skillyard_store::KvStore::set(self, key, value).await?)
    }
}

/// Persisted state of one skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillState {
    pub enabled: bool,
}

/// `id -> state`.
pub type EnableStateMap = BTreeMap<String, SkillState>;

/// Reads and writes the enable-state map.
#[derive(Clone)]
pub struct SkillStateStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SkillStateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the map. The legacy array shape is converted in memory only;
    /// see [`migrate`](Self::migrate).
    pub async fn load(&self) -> Result<EnableStateMap> {
        Ok(self.read().await?.map(|(map, _)| map).unwrap_or_default())
    }

    /// Rewrite a legacy array in map form. Returns whether anything was
    /// rewritten. Callers serialise this against other writers.
    pub async fn migrate(&self) -> Result<bool> {
        match self.read().await? {
            Some((map, true)) => {
                self.save(&map).await?;
                tracing::info!(entries = map.len(), "migrated legacy skill state to map form");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Stored map plus whether it was in the legacy shape.
    async fn read(&self) -> Result<Option<(EnableStateMap, bool)>> {
        let Some(raw) = self.kv.get(STATE_KEY).await? else {
            return Ok(None);
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable skill state");
                return Ok(None);
            }
        };

        match value {
            Value::Object(entries) => Ok(Some((
                entries
                    .into_iter()
                    .filter_map(|(id, entry)| match serde_json::from_value(entry) {
                        Ok(state) => Some((id, state)),
                        Err(e) => {
                            tracing::warn!(skill = %id, error = %e, "skipping malformed state entry");
                            None
                        }
                    })
                    .collect(),
                false,
            ))),
            Value::Array(items) => Ok(Some((migrate_legacy(items), true))),
            other => {
                tracing::warn!(kind = %value_kind(&other), "ignoring skill state of unexpected shape");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, map: &EnableStateMap) -> Result<()> {
        let json = serde_json::to_string(map)?;
        self.kv.set(STATE_KEY, &json).await
    }

    /// Record `enabled` for `id`.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut map = self.load().await?;
        map.insert(id.to_owned(), SkillState { enabled });
        self.save(&map).await
    }

    /// Drop the entry for `id`, returning whether one existed.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut map = self.load().await?;
        let existed = map.remove(id).is_some();
        if existed {
            self.save(&map).await?;
        }
        Ok(existed)
    }
}

/// Convert `[{id, enabled, ...}, ...]` snapshots into the map form.
fn migrate_legacy(items: Vec<Value>) -> EnableStateMap {
    let mut map = EnableStateMap::new();
    for item in items {
        let Some(id) = item.get("id").and_then(Value::as_str) else {
            continue;
        };
        let enabled = item.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        map.insert(id.to_owned(), SkillState { enabled });
    }
    map
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
