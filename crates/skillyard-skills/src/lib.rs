//! Skill package management for Skillyard.
//!
//! A skill is a directory holding a `SKILL.md` manifest plus any scripts or
//! assets it needs. This crate provides:
//!
//! - **Discovery** scans the primary, external and bundled roots and merges
//!   them into one registry keyed by folder name (primary wins).
//!
//! - **Acquisition** turns a user-supplied source (local path, archive,
//!   `owner/repo` shorthand, web URL, or git URL) into a directory on disk,
//!   falling back from `git clone` to archive download.
//!
//! - **Installation** copies every skill found in an acquisition into the
//!   primary root under a collision-free folder name.
//!
//! - **Watching** debounces filesystem events on all roots into a single
//!   change notification.
//!
//! - **Script execution** runs skill probe scripts with a timeout and
//!   runtime fallback, classifying the outcome for connectivity tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skillyard_skills::{SkillManager, SkillsConfig};
//! use skillyard_store::{Database, KvStore};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let db = Database::open_and_migrate("data/skillyard.db").await?;
//! let manager = SkillManager::new(
//!     SkillsConfig::default(),
//!     &std::env::current_dir()?,
//!     Arc::new(KvStore::new(db)),
//! )?;
//!
//! manager.add_skill("octo/skills").await?;
//! for skill in manager.list_skills().await? {
//!     println!("{} ({})", skill.name, skill.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod archive;
pub mod bundled;
pub mod config;
pub mod connectivity;
pub mod defaults;
pub mod env_file;
pub mod error;
pub mod git;
pub mod installer;
pub mod manager;
pub mod manifest;
pub mod path_safety;
pub mod registry;
pub mod roots;
pub mod runner;
pub mod scanner;
pub mod source;
pub mod state;
pub mod types;
pub mod watcher;

pub use acquire::{Acquirer, Acquisition};
pub use bundled::{RepairRule, SyncReport};
pub use config::SkillsConfig;
pub use connectivity::{CheckResult, CheckStatus, ConnectivityReport};
pub use error::{Result, SkillError};
pub use manager::SkillManager;
pub use manifest::{MANIFEST_FILE, Manifest};
pub use roots::{RootKind, SkillRoots};
pub use runner::{RunLimits, RuntimeCandidate, ScriptOutcome};
pub use source::{AcquisitionPlan, normalize_source};
pub use state::{KeyValueStore, SkillStateStore};
pub use types::{InstalledSkill, SkillRecord, SkillsChanged};
