//! CLI argument definitions for Skillyard.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Skillyard -- install and manage SKILL.md packages.
#[derive(Parser)]
#[command(
    name = "skillyard",
    version,
    about = "Skillyard -- install and manage SKILL.md packages",
    long_about = "Discovers skills across the primary, external and bundled roots, installs \
                  new ones from local paths, archives or git repositories, and runs their \
                  connectivity checks."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = "config/skills.toml")]
    pub config: PathBuf,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every discovered skill.
    List,

    /// Install skills from a local path, archive, `owner/repo` shorthand,
    /// web URL, or git URL.
    Add {
        /// Where to fetch the skill(s) from.
        source: String,
    },

    /// Delete a skill from the primary root.
    Delete {
        /// The skill id (folder name).
        id: String,
    },

    /// Enable a skill.
    Enable {
        /// The skill id (folder name).
        id: String,
    },

    /// Disable a skill.
    Disable {
        /// The skill id (folder name).
        id: String,
    },

    /// Read or write a skill's `.env` configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run a named connectivity test against a skill.
    Test {
        /// The skill id (folder name).
        id: String,
        /// Test name, e.g. `email`.
        test: String,
        /// Extra environment entries as `KEY=VALUE`, overriding the skill's
        /// `.env`.
        #[arg(long = "env", short = 'e', value_parser = parse_key_value)]
        env: Vec<(String, String)>,
    },

    /// Copy bundled skills into the primary root and repair broken copies.
    SyncBundled,

    /// Watch all roots and print a line every time the skill set changes.
    Watch,
}

/// Actions for a skill's `.env` file.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current values.
    Get {
        /// The skill id (folder name).
        id: String,
    },
    /// Replace the values with the given `KEY=VALUE` pairs.
    Set {
        /// The skill id (folder name).
        id: String,
        /// Entries to write.
        #[arg(value_parser = parse_key_value)]
        values: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_pairs() {
        assert_eq!(
            parse_key_value("IMAP_HOST=imap.example.com").unwrap(),
            ("IMAP_HOST".to_owned(), "imap.example.com".to_owned())
        );
        assert_eq!(
            parse_key_value("TOKEN=a=b").unwrap(),
            ("TOKEN".to_owned(), "a=b".to_owned())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn parses_test_command_with_overrides() {
        let cli = Cli::try_parse_from([
            "skillyard",
            "--json",
            "test",
            "imap-smtp-email",
            "email",
            "-e",
            "SMTP_PORT=587",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, PathBuf::from("config/skills.toml"));
        match cli.command {
            Commands::Test { id, test, env } => {
                assert_eq!(id, "imap-smtp-email");
                assert_eq!(test, "email");
                assert_eq!(env, vec![("SMTP_PORT".to_owned(), "587".to_owned())]);
            }
            _ => panic!("expected test command"),
        }
    }
}
