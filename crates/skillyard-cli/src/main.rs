//! CLI entry point for Skillyard.
//!
//! This binary provides the `skillyard` command with subcommands for
//! listing, installing, configuring, testing and watching skills.

mod cli;
mod helpers;

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Parser;
use skillyard_skills::{CheckStatus, SkillManager, SkillsChanged};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use cli::{Cli, Commands, ConfigAction};
use helpers::{init_tracing, open_manager, print_json};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let cli = Cli::parse();
    let manager = open_manager(&cli.config).await?;

    match cli.command {
        Commands::List => cmd_list(&manager, cli.json).await,
        Commands::Add { source } => cmd_add(&manager, &source, cli.json).await,
        Commands::Delete { id } => {
            manager.delete_skill(&id).await?;
            println!("Deleted {id}");
            Ok(())
        }
        Commands::Enable { id } => {
            manager.set_enabled(&id, true).await?;
            println!("Enabled {id}");
            Ok(())
        }
        Commands::Disable { id } => {
            manager.set_enabled(&id, false).await?;
            println!("Disabled {id}");
            Ok(())
        }
        Commands::Config { action } => cmd_config(&manager, action, cli.json).await,
        Commands::Test { id, test, env } => {
            cmd_test(&manager, &id, &test, env.into_iter().collect(), cli.json).await
        }
        Commands::SyncBundled => {
            let report = manager.sync_bundled().await?;
            if cli.json {
                return print_json(&report);
            }
            println!(
                "Copied {} skill(s), repaired {} skill(s)",
                report.copied.len(),
                report.repaired.len()
            );
            Ok(())
        }
        Commands::Watch => cmd_watch(&manager).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_list(manager: &SkillManager, json: bool) -> Result<()> {
    let skills = manager.list_skills().await?;
    if json {
        return print_json(&skills);
    }
    if skills.is_empty() {
        println!("No skills found.");
        return Ok(());
    }

    println!();
    println!("  {:<28} {:<9} {:<9} NAME", "ID", "ROOT", "STATE");
    for skill in &skills {
        let state = if skill.enabled { "enabled" } else { "disabled" };
        let marker = if skill.is_built_in { " (built-in)" } else { "" };
        println!(
            "  {:<28} {:<9} {:<9} {}{marker}",
            skill.id,
            skill.root_kind.to_string(),
            state,
            skill.name
        );
    }
    println!();
    Ok(())
}

async fn cmd_add(manager: &SkillManager, source: &str, json: bool) -> Result<()> {
    let installed = manager.add_skill(source).await?;
    if json {
        return print_json(&installed);
    }
    for skill in &installed {
        println!("Installed {} -> {}", skill.id, skill.path.display());
    }
    Ok(())
}

async fn cmd_config(manager: &SkillManager, action: ConfigAction, json: bool) -> Result<()> {
    match action {
        ConfigAction::Get { id } => {
            let values = manager.get_skill_config(&id).await?;
            if json {
                return print_json(&values);
            }
            for (key, value) in &values {
                println!("{key}={value}");
            }
        }
        ConfigAction::Set { id, values } => {
            let values: BTreeMap<_, _> = values.into_iter().collect();
            manager.set_skill_config(&id, &values).await?;
            println!("Wrote {} value(s) for {id}", values.len());
        }
    }
    Ok(())
}

async fn cmd_test(
    manager: &SkillManager,
    id: &str,
    test: &str,
    overrides: BTreeMap<String, String>,
    json: bool,
) -> Result<()> {
    let report = manager.test_connectivity(id, test, &overrides).await?;
    if json {
        print_json(&report)?;
    } else {
        for check in &report.checks {
            let status = match check.status {
                CheckStatus::Pass => "ok",
                CheckStatus::Fail => "FAIL",
            };
            match &check.message {
                Some(message) => println!("  {:<8} {status:<5} {message}", check.name),
                None => println!("  {:<8} {status}", check.name),
            }
        }
    }

    if report.passed {
        Ok(())
    } else {
        anyhow::bail!("connectivity test `{test}` failed")
    }
}

async fn cmd_watch(manager: &SkillManager) -> Result<()> {
    let mut changes = manager.subscribe();
    manager.start_watching().await?;
    info!("watching skill roots, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(SkillsChanged::Filesystem | SkillsChanged::Mutation) => {
                    let count = manager.list_skills().await?.len();
                    println!("skills changed ({count} discovered)");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed change notifications");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.stop_watching().await;
    Ok(())
}
