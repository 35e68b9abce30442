//! rcsync - Firebase Remote Config patch tool
//!
//! Usage:
//!   rcsync init -p <PROJECT>       - Write a config file
//!   rcsync auth set-token          - Store an access token in the keyring
//!   rcsync pull                    - Fetch the template into a snapshot
//!   rcsync sync --set PATH=VALUE   - Fetch, patch and publish (ETag guarded)
//!   rcsync push --set PATH=VALUE   - Patch the newest snapshot and publish
//!   rcsync rollback <VERSION>      - Restore a stored version
//!   rcsync versions                - List stored versions

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{AuthAction, Cli, Commands};
use remote_config_sync::config::default_config_path;
use remote_config_sync::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("rcsync={}", log_level).parse()?)
                .add_directive(format!("remote_config_sync={}", log_level).parse()?),
        )
        .with_target(false)
        .init();

    let config_path = cli.config;
    let config = || Config::load_or_default(config_path.as_deref());

    match cli.command {
        // init writes the config file, so it must not load one
        Commands::Init {
            project,
            token_source,
            force,
        } => {
            let path = config_path.clone().unwrap_or_else(default_config_path);
            cli::commands::init(&path, &project, token_source, force)
        }
        Commands::Auth {
            action: AuthAction::SetToken { token },
        } => cli::commands::set_token(&config()?, token),
        Commands::Pull => cli::commands::pull(&config()?),
        Commands::Sync {
            patch,
            force,
            no_snapshot,
            dry_run,
        } => cli::commands::sync(&config()?, &patch, force, no_snapshot, dry_run),
        Commands::Push {
            snapshot,
            etag,
            force,
            patch,
        } => cli::commands::push(&config()?, snapshot, etag, force, &patch),
        Commands::Rollback { version } => cli::commands::rollback(&config()?, &version),
        Commands::Versions { limit } => cli::commands::versions(&config()?, limit),
    }
}
