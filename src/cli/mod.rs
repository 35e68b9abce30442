//! CLI definitions and command implementations for rcsync.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use remote_config_sync::config::TokenSource;
use std::path::PathBuf;

/// rcsync - Patch Firebase Remote Config templates with ETag-guarded writes
#[derive(Parser)]
#[command(name = "rcsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/rcsync/rcsync.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// The change to apply before writing.
#[derive(Args, Debug, Clone, Default)]
pub struct PatchArgs {
    /// Replace a string value, e.g. parameters.test.defaultValue.value=prod3
    #[arg(long, value_name = "PATH=VALUE", conflicts_with_all = ["set_json", "group"])]
    pub set: Option<String>,

    /// Replace a value with parsed JSON, e.g. parameters.test.defaultValue={"value":"prod3"}
    #[arg(long, value_name = "PATH=JSON", conflicts_with = "group")]
    pub set_json: Option<String>,

    /// Parameter group to replace from <patch_dir>/<group>_<state>.json
    #[arg(long, value_name = "NAME")]
    pub group: Option<String>,

    /// Group state: enabled or disabled
    #[arg(long, value_name = "STATE", requires = "group")]
    pub state: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a config file for a Firebase project
    Init {
        /// Firebase project id
        #[arg(short, long)]
        project: String,

        /// Where access tokens come from
        #[arg(long, value_enum, default_value_t = TokenSource::Env)]
        token_source: TokenSource,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Manage the access token kept in the system keyring
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Fetch the current template and save a local snapshot
    Pull,

    /// Fetch, patch and publish the template in one go
    Sync {
        #[command(flatten)]
        patch: PatchArgs,

        /// Overwrite the server template even if it changed since the fetch
        #[arg(long)]
        force: bool,

        /// Do not save a snapshot of the fetched template
        #[arg(long)]
        no_snapshot: bool,

        /// Let the server validate the patched template without publishing it
        #[arg(long, conflicts_with = "force")]
        dry_run: bool,
    },

    /// Patch a snapshot from an earlier pull and publish it
    Push {
        /// Snapshot file (default: newest in snapshot_dir)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// ETag to guard the write with (default: the one saved with the snapshot)
        #[arg(long, conflicts_with = "force")]
        etag: Option<String>,

        /// Overwrite the server template without an ETag check
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        patch: PatchArgs,
    },

    /// Restore a previously published template version
    Rollback {
        /// Version number to restore (see `rcsync versions`)
        version: String,
    },

    /// List recently published template versions
    Versions {
        /// Maximum number of versions to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store an access token for the configured project
    SetToken {
        /// Token to store (prompted without echo if omitted)
        #[arg(long)]
        token: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_set() {
        let cli = Cli::try_parse_from([
            "rcsync",
            "sync",
            "--set",
            "parameters.test.defaultValue.value=prod3",
        ])
        .unwrap();

        match cli.command {
            Commands::Sync {
                patch,
                force,
                dry_run,
                ..
            } => {
                assert_eq!(
                    patch.set.as_deref(),
                    Some("parameters.test.defaultValue.value=prod3")
                );
                assert!(!force);
                assert!(!dry_run);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_state_is_free_text() {
        let cli = Cli::try_parse_from([
            "rcsync",
            "sync",
            "--group",
            "banner",
            "--state",
            "neither-enable-nor-disable",
        ])
        .unwrap();

        match cli.command {
            Commands::Sync { patch, .. } => {
                assert_eq!(patch.state.as_deref(), Some("neither-enable-nor-disable"));
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Cli::try_parse_from(["rcsync", "sync", "--set", "a=b", "--group", "g"]).is_err());
        assert!(Cli::try_parse_from(["rcsync", "sync", "--set", "a=b", "--force", "--dry-run"]).is_err());
        assert!(Cli::try_parse_from(["rcsync", "push", "--etag", "e", "--force", "--set", "a=b"]).is_err());
    }

    #[test]
    fn test_state_requires_group() {
        assert!(Cli::try_parse_from(["rcsync", "sync", "--set", "a=b", "--state", "enabled"]).is_err());
        assert!(Cli::try_parse_from(["rcsync", "push", "--state", "disabled"]).is_err());
    }

    #[test]
    fn test_parse_init() {
        let cli = Cli::try_parse_from([
            "rcsync",
            "init",
            "--project",
            "demo",
            "--token-source",
            "keyring",
        ])
        .unwrap();

        match cli.command {
            Commands::Init {
                project,
                token_source,
                force,
            } => {
                assert_eq!(project, "demo");
                assert_eq!(token_source, TokenSource::Keyring);
                assert!(!force);
            }
            _ => panic!("expected init"),
        }

        assert!(Cli::try_parse_from(["rcsync", "init"]).is_err());
        assert!(Cli::try_parse_from(["rcsync", "init", "-p", "demo", "--token-source", "vault"]).is_err());
    }

    #[test]
    fn test_parse_auth_set_token() {
        let cli = Cli::try_parse_from(["rcsync", "auth", "set-token", "--token", "ya29.x"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Auth { action: AuthAction::SetToken { ref token } } if token.as_deref() == Some("ya29.x")
        ));

        let cli = Cli::try_parse_from(["rcsync", "auth", "set-token"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Auth { action: AuthAction::SetToken { token: None } }
        ));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["rcsync", "rollback", "21", "-v", "--config", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Rollback { ref version } if version == "21"));
    }
}
