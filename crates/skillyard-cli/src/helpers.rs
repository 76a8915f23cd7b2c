//! Shared helper functions used across CLI subcommands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use skillyard_skills::{SkillManager, SkillsConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Manager construction
// ---------------------------------------------------------------------------

/// Load configuration, open the state database and build the manager.
pub async fn open_manager(config_path: &Path) -> Result<SkillManager> {
    let config = SkillsConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    if let Some(parent) = config.state_db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let db = skillyard_store::Database::open_and_migrate(config.state_db.clone())
        .await
        .context("failed to open database")?;
    info!(path = %config.state_db.display(), "store initialized");

    let working_dir = std::env::current_dir().context("failed to read working directory")?;
    let kv = Arc::new(skillyard_store::KvStore::new(db));
    SkillManager::new(config, &working_dir, kv).context("failed to initialise skill manager")
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
