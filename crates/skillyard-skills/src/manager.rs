//! Skill manager: the operations exposed to the host application.
//!
//! Reads recompute everything from disk and take no locks. Mutations (add,
//! delete, enable/disable, config writes, bundled sync) are serialised by a
//! single async mutex so two of them never interleave on the same inventory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, RwLock, broadcast};

use crate::acquire::Acquirer;
use crate::bundled::{DEFAULT_REPAIR_RULES, SyncReport, sync_bundled};
use crate::config::SkillsConfig;
use crate::connectivity::{ConnectivityReport, find_test, run_connectivity_test};
use crate::env_file::{ENV_FILE, read_env_file, write_env_file};
use crate::error::{Result, SkillError};
use crate::installer::install_skill_dirs;
use crate::path_safety::validate_skill_id;
use crate::registry::{ResolvedSkill, build_registry, builtin_ids, find_skill};
use crate::roots::SkillRoots;
use crate::runner::{RunLimits, RuntimeCandidate, default_runtime_candidates};
use crate::scanner::find_skill_dirs;
use crate::source::normalize_source;
use crate::state::{KeyValueStore, SkillStateStore};
use crate::types::{InstalledSkill, SkillRecord, SkillsChanged};
use crate::watcher::SkillWatcher;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Facade over discovery, acquisition, installation, watching and script
/// execution.
pub struct SkillManager {
    config: SkillsConfig,
    roots: RwLock<SkillRoots>,
    state: SkillStateStore,
    acquirer: Acquirer,
    runtimes: Vec<RuntimeCandidate>,
    limits: RunLimits,
    changes: broadcast::Sender<SkillsChanged>,
    watcher: Mutex<SkillWatcher>,
    mutation: Mutex<()>,
    state_migrated: OnceCell<()>,
}

impl SkillManager {
    /// Create a manager for `config`, resolving relative roots against
    /// `working_dir` and persisting enable state in `kv`.
    pub fn new(config: SkillsConfig, working_dir: &Path, kv: Arc<dyn KeyValueStore>) -> Result<Self> {
        let roots = SkillRoots::resolve(&config, working_dir);
        tracing::info!(
            primary = %roots.primary.display(),
            external = ?roots.external,
            bundled = ?roots.bundled,
            "skill roots resolved"
        );

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let watcher = SkillWatcher::new(
            Duration::from_millis(config.watch_debounce_ms),
            changes.clone(),
        );
        Ok(Self {
            acquirer: Acquirer::new(&config.web_base, &config.api_base)?,
            runtimes: default_runtime_candidates(config.host_runtime.as_deref()),
            limits: RunLimits {
                timeout: Duration::from_millis(config.script_timeout_ms),
                kill_grace: Duration::from_millis(config.kill_grace_ms),
            },
            state: SkillStateStore::new(kv),
            roots: RwLock::new(roots),
            watcher: Mutex::new(watcher),
            mutation: Mutex::new(()),
            state_migrated: OnceCell::new(),
            changes,
            config,
        })
    }

    /// Replace the runtime candidates used for connectivity scripts.
    pub fn with_runtimes(mut self, runtimes: Vec<RuntimeCandidate>) -> Self {
        self.runtimes = runtimes;
        self
    }

    /// Replace the acquirer used by [`add_skill`](Self::add_skill).
    pub fn with_acquirer(mut self, acquirer: Acquirer) -> Self {
        self.acquirer = acquirer;
        self
    }

    /// Receive a value every time the skill set may have changed.
    pub fn subscribe(&self) -> broadcast::Receiver<SkillsChanged> {
        self.changes.subscribe()
    }

    /// Snapshot of the current roots.
    pub async fn roots(&self) -> SkillRoots {
        self.roots.read().await.clone()
    }

    pub async fn primary_root(&self) -> PathBuf {
        self.roots.read().await.primary.clone()
    }

    // -- reads --------------------------------------------------------------

    /// The merged registry, sorted by `(order, name)`.
    pub async fn list_skills(&self) -> Result<Vec<SkillRecord>> {
        self.migrate_state().await?;
        let state = self.state.load().await?;
        let roots = self.roots().await;
        blocking(move || Ok(build_registry(&roots, &state))).await
    }

    /// Read a skill's `.env` values.
    pub async fn get_skill_config(&self, id: &str) -> Result<BTreeMap<String, String>> {
        validate_skill_id(id)?;
        let resolved = self.resolve(id).await?;
        read_env_file(&resolved.dir.join(ENV_FILE))
    }

    /// Run the named connectivity test against skill `id`.
    pub async fn test_connectivity(
        &self,
        id: &str,
        test_name: &str,
        overrides: &BTreeMap<String, String>,
    ) -> Result<ConnectivityReport> {
        validate_skill_id(id)?;
        let test = find_test(test_name)?;
        if test.skill_id != id {
            return Err(SkillError::UnknownTest(format!("{test_name} (for skill {id})")));
        }
        let resolved = self.resolve(id).await?;
        run_connectivity_test(test, &resolved.dir, overrides, &self.runtimes, self.limits).await
    }

    // -- mutations ----------------------------------------------------------

    /// Persist the enabled flag for `id`.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        validate_skill_id(id)?;
        let _guard = self.mutation.lock().await;
        self.resolve(id).await?;
        self.state.set_enabled(id, enabled).await?;
        tracing::info!(skill = %id, enabled, "skill enable state changed");
        self.notify();
        Ok(())
    }

    /// Delete a skill from the primary root and drop its state entry.
    ///
    /// Built-in skills and skills that only live in a read-only root are
    /// refused without touching the filesystem.
    pub async fn delete_skill(&self, id: &str) -> Result<()> {
        validate_skill_id(id)?;
        let _guard = self.mutation.lock().await;
        let roots = self.roots().await;

        let lookup_roots = roots.clone();
        let lookup_id = id.to_owned();
        let (builtin, resolved) = blocking(move || {
            Ok((
                builtin_ids(&lookup_roots).contains(&lookup_id),
                find_skill(&lookup_roots, &lookup_id),
            ))
        })
        .await?;

        if builtin {
            return Err(SkillError::BuiltIn(id.to_owned()));
        }
        let resolved = resolved.ok_or_else(|| SkillError::NotFound(id.to_owned()))?;
        if !resolved.kind.is_writable() {
            return Err(SkillError::ReadOnly {
                id: id.to_owned(),
                root: resolved.kind.to_string(),
            });
        }

        // `id` has no separators, so this names the entry itself. A symlinked
        // skill is unlinked; its target belongs to someone else.
        let target = roots.primary.join(id);
        blocking(move || {
            if std::fs::symlink_metadata(&target)?.file_type().is_symlink() {
                std::fs::remove_file(&target).or_else(|_| std::fs::remove_dir(&target))?;
            } else {
                std::fs::remove_dir_all(&target)?;
            }
            Ok(())
        })
        .await?;
        self.state.remove(id).await?;
        tracing::info!(skill = %id, "skill deleted");

        self.notify();
        Ok(())
    }

    /// Acquire `source` and install every skill found in it into the primary
    /// root.
    pub async fn add_skill(&self, source: &str) -> Result<Vec<InstalledSkill>> {
        // Classification happens before any filesystem or network work.
        let plan = normalize_source(source, &self.config.git_host)?;

        let _guard = self.mutation.lock().await;
        let acquisition = self.acquirer.acquire(&plan).await?;

        let root = acquisition.root().to_path_buf();
        let hint = acquisition.name_hint().map(str::to_owned);
        let primary = self.roots().await.primary;
        let installed = blocking(move || {
            let dirs = find_skill_dirs(&root);
            if dirs.is_empty() {
                return Err(SkillError::NoSkillsFound(plan.describe()));
            }
            install_skill_dirs(&primary, &root, hint.as_deref(), &dirs)
        })
        .await;
        acquisition.release().await;
        let installed = installed?;

        self.refresh_watcher().await?;
        self.notify();
        Ok(installed)
    }

    /// Replace a skill's `.env` values.
    pub async fn set_skill_config(&self, id: &str, values: &BTreeMap<String, String>) -> Result<()> {
        validate_skill_id(id)?;
        let _guard = self.mutation.lock().await;
        let resolved = self.resolve(id).await?;
        if !resolved.kind.is_writable() {
            return Err(SkillError::ReadOnly {
                id: id.to_owned(),
                root: resolved.kind.to_string(),
            });
        }
        write_env_file(&resolved.dir.join(ENV_FILE), values)?;
        tracing::info!(skill = %id, keys = values.len(), "skill config updated");
        Ok(())
    }

    /// Copy missing bundled skills into the primary root and repair broken
    /// copies.
    pub async fn sync_bundled(&self) -> Result<SyncReport> {
        let _guard = self.mutation.lock().await;
        let roots = self.roots().await;
        let Some(bundled) = roots.bundled.clone() else {
            return Ok(SyncReport::default());
        };
        let primary = roots.primary.clone();
        let report = blocking(move || sync_bundled(&bundled, &primary, DEFAULT_REPAIR_RULES)).await?;

        if !report.copied.is_empty() || !report.repaired.is_empty() {
            self.refresh_watcher().await?;
            self.notify();
        }
        Ok(report)
    }

    // -- watching -----------------------------------------------------------

    pub async fn start_watching(&self) -> Result<()> {
        let roots = self.roots().await;
        self.watcher.lock().await.start(roots)
    }

    pub async fn stop_watching(&self) {
        self.watcher.lock().await.stop();
    }

    pub async fn is_watching(&self) -> bool {
        self.watcher.lock().await.is_running()
    }

    /// Re-resolve roots against `working_dir` and restart watches if they
    /// were running.
    pub async fn working_dir_changed(&self, working_dir: &Path) -> Result<()> {
        let roots = SkillRoots::resolve(&self.config, working_dir);
        tracing::info!(primary = %roots.primary.display(), "working directory changed");
        *self.roots.write().await = roots;
        self.refresh_watcher().await?;
        self.notify();
        Ok(())
    }

    // -- helpers ------------------------------------------------------------

    async fn refresh_watcher(&self) -> Result<()> {
        let mut watcher = self.watcher.lock().await;
        if watcher.is_running() {
            watcher.start(self.roots().await)?;
        }
        Ok(())
    }

    async fn resolve(&self, id: &str) -> Result<ResolvedSkill> {
        let roots = self.roots().await;
        let id = id.to_owned();
        blocking(move || find_skill(&roots, &id).ok_or(SkillError::NotFound(id))).await
    }

    /// Rewrite a legacy state encoding once, under the mutation lock.
    async fn migrate_state(&self) -> Result<()> {
        self.state_migrated
            .get_or_try_init(|| async {
                let _guard = self.mutation.lock().await;
                self.state.migrate().await.map(|_| ())
            })
            .await
            .map(|_| ())
    }

    fn notify(&self) {
        let _ = self.changes.send(SkillsChanged::Mutation);
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
