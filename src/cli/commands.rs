//! Command implementations for the rcsync CLI.
//!
//! Commands:
//! - init: write a config file
//! - auth set-token: store an access token in the system keyring
//! - pull: fetch the template and store a snapshot
//! - sync: fetch -> patch -> guarded write (all-in-one)
//! - push: patch a stored snapshot and write it back
//! - rollback: restore a stored server version
//! - versions: list stored server versions

use crate::cli::PatchArgs;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use remote_config_sync::config::TokenSource;
use remote_config_sync::sync::{CycleOutcome, KeyringToken, TokenProvider};
use remote_config_sync::{
    snapshot, Config, ConfigSyncCycle, HttpBackend, PatchSpec, SyncError, VersionToken, WriteMode,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

type Cycle = ConfigSyncCycle<HttpBackend, Box<dyn TokenProvider>>;

/// Build the cycle for the configured project.
fn build_cycle(config: &Config, snapshots: bool) -> Result<Cycle> {
    let project_id = config.project_id()?;
    let tokens = config.token_provider(&project_id)?;
    let backend = HttpBackend::new(&config.base_url, &project_id)?;

    println!(
        "{} {}",
        "Project:".dimmed(),
        project_id.white().bold()
    );

    let cycle = ConfigSyncCycle::new(backend, tokens);
    Ok(if snapshots {
        cycle.with_snapshot_dir(&config.snapshot_dir)
    } else {
        cycle
    })
}

/// Turn the patch flags into a PatchSpec. Fails before any network call.
pub fn build_patch(args: &PatchArgs, patch_dir: &Path) -> Result<PatchSpec> {
    let spec = match (&args.set, &args.set_json, &args.group) {
        (Some(expr), None, None) => PatchSpec::parse_assignment(expr, false)?,
        (None, Some(expr), None) => PatchSpec::parse_assignment(expr, true)?,
        (None, None, Some(group)) => PatchSpec::load_group(patch_dir, group, args.state.as_deref())?,
        (None, None, None) => bail!("Nothing to patch: pass --set, --set-json or --group"),
        _ => bail!("Only one of --set, --set-json and --group may be given"),
    };
    Ok(spec)
}

/// Run `work` behind a spinner.
fn with_spinner<T>(message: &str, work: impl FnOnce() -> T) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = work();
    spinner.finish_and_clear();
    Ok(result)
}

/// Print a hint for conflicts, then hand the error to main.
fn report(err: SyncError) -> anyhow::Error {
    if err.is_conflict() {
        println!(
            "\n{}",
            "The template was changed on the server after it was fetched.".yellow()
        );
        println!(
            "{}",
            "Nothing was written. Run the command again to patch the latest version.".yellow()
        );
    }
    anyhow::Error::new(err)
}

fn print_outcome(outcome: &CycleOutcome) {
    if let Some(path) = &outcome.snapshot {
        println!("  {} Snapshot: {}", "✓".green(), path.display());
    }
    if let Some(etag) = &outcome.base_etag {
        println!("  {} Based on ETag: {}", "✓".green(), etag.to_string().dimmed());
    }

    if outcome.validated_only {
        println!("  {} Template is valid (not published)", "✓".green());
        return;
    }

    let version = outcome
        .result
        .version_number
        .as_deref()
        .map(|v| format!(" (version {})", v))
        .unwrap_or_default();
    println!("  {} Published{}", "✓".green(), version);
    if let Some(etag) = &outcome.result.etag {
        println!("  {} New ETag: {}", "✓".green(), etag.to_string().cyan());
    }
}

/// Prompt for a secret without echoing it
fn prompt_secret(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let secret = rpassword::read_password().context("Cannot read token")?;
    if secret.trim().is_empty() {
        bail!("Token cannot be empty");
    }

    Ok(secret)
}

/// Write a new config file for `project_id`
pub fn init(path: &Path, project_id: &str, token_source: TokenSource, force: bool) -> Result<()> {
    let project_id = project_id.trim();
    if project_id.is_empty() {
        bail!("Project id cannot be empty");
    }
    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = Config::default();
    config.project_id = Some(project_id.to_string());
    config.auth.source = token_source;
    config.save(path)?;

    println!("  {} Config written to {}", "✓".green(), path.display());
    if token_source == TokenSource::Keyring {
        println!(
            "  {} Run {} to store an access token",
            "→".cyan(),
            "rcsync auth set-token".bold()
        );
    }
    Ok(())
}

/// Store an access token in the system keyring
pub fn set_token(config: &Config, token: Option<String>) -> Result<()> {
    let project_id = config.project_id()?;
    let token = match token {
        Some(token) => token,
        None => prompt_secret("Access token: ")?,
    };
    let token = token.trim();
    if token.is_empty() {
        bail!("Token cannot be empty");
    }

    KeyringToken::default_entry(&project_id).store(token)?;

    println!(
        "  {} Token stored in keyring for {}",
        "✓".green(),
        project_id.white().bold()
    );
    if config.auth.source != TokenSource::Keyring {
        println!(
            "{}",
            "Set auth.source = \"keyring\" in the config file to use it.".yellow()
        );
    }
    Ok(())
}

/// Fetch the template and save it as a snapshot
pub fn pull(config: &Config) -> Result<()> {
    let cycle = build_cycle(config, true)?;

    let (path, etag) = with_spinner("Fetching template...", || cycle.pull())?.map_err(report)?;

    println!("  {} Snapshot: {}", "✓".green(), path.display());
    println!("  {} ETag: {}", "✓".green(), etag.to_string().cyan());
    Ok(())
}

/// Fetch, patch and write back, guarded by the fetched ETag
pub fn sync(
    config: &Config,
    patch: &PatchArgs,
    force: bool,
    no_snapshot: bool,
    dry_run: bool,
) -> Result<()> {
    let spec = build_patch(patch, &config.patch_dir)?;
    let cycle = build_cycle(config, config.write_snapshots && !no_snapshot)?;

    println!("{} {}", "Patch:".dimmed(), spec.to_string().white());
    if force {
        println!(
            "{}",
            "WARNING: --force overwrites any change made on the server since the fetch".yellow()
        );
    }

    let mode = if force { WriteMode::Force } else { WriteMode::Guarded };
    let outcome = with_spinner("Syncing template...", || {
        if dry_run {
            cycle.dry_run(&spec)
        } else {
            cycle.run(&spec, mode)
        }
    })?
    .map_err(report)?;

    print_outcome(&outcome);
    Ok(())
}

/// Patch a stored snapshot and write it back
pub fn push(
    config: &Config,
    snapshot_path: Option<PathBuf>,
    etag: Option<String>,
    force: bool,
    patch: &PatchArgs,
) -> Result<()> {
    let spec = build_patch(patch, &config.patch_dir)?;

    let snapshot_path = match snapshot_path {
        Some(path) => path,
        None => snapshot::latest(&config.snapshot_dir)?.with_context(|| {
            format!(
                "No snapshot found in {}. Run `rcsync pull` first",
                config.snapshot_dir.display()
            )
        })?,
    };

    let etag = match etag {
        Some(raw) => Some(VersionToken::new(raw).context("--etag cannot be empty")?),
        None => None,
    };

    let cycle = build_cycle(config, false)?;
    println!("{} {}", "Snapshot:".dimmed(), snapshot_path.display());
    println!("{} {}", "Patch:".dimmed(), spec.to_string().white());

    let mode = if force { WriteMode::Force } else { WriteMode::Guarded };
    let outcome = with_spinner("Publishing template...", || {
        cycle.push_snapshot(&snapshot_path, etag, &spec, mode)
    })?
    .map_err(report)?;

    print_outcome(&outcome);
    Ok(())
}

/// Restore a stored version on the server
pub fn rollback(config: &Config, version: &str) -> Result<()> {
    let cycle = build_cycle(config, false)?;

    let result = with_spinner(&format!("Rolling back to version {}...", version), || {
        cycle.rollback(version)
    })?
    .map_err(report)?;

    println!("  {} Rolled back to version {}", "✓".green(), version.cyan());
    if let Some(etag) = result.etag {
        println!("  {} New ETag: {}", "✓".green(), etag.to_string().cyan());
    }
    Ok(())
}

/// List stored versions
pub fn versions(config: &Config, limit: u32) -> Result<()> {
    let cycle = build_cycle(config, false)?;

    let versions =
        with_spinner("Listing versions...", || cycle.list_versions(limit))?.map_err(report)?;

    if versions.is_empty() {
        println!("{}", "No versions found.".yellow());
        return Ok(());
    }

    println!();
    for version in &versions {
        let user = version
            .update_user
            .as_ref()
            .and_then(|u| u.email.as_deref())
            .unwrap_or("-");
        println!(
            "  {} {} {}",
            format!("#{}", version.version_number).cyan().bold(),
            version.update_time.as_deref().unwrap_or("-").dimmed(),
            user
        );
        if let Some(kind) = &version.update_type {
            println!("     {}", kind.dimmed());
        }
        if let Some(description) = &version.description {
            println!("     {}", description);
        }
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_config_sync::PatchError;
    use tempfile::TempDir;

    fn args() -> PatchArgs {
        PatchArgs::default()
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rcsync").join("rcsync.toml");

        init(&path, " demo ", TokenSource::Keyring, false).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("demo"));
        assert_eq!(config.auth.source, TokenSource::Keyring);
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rcsync.toml");

        init(&path, "first", TokenSource::Env, false).unwrap();
        assert!(init(&path, "second", TokenSource::Env, false).is_err());
        assert_eq!(
            Config::load(&path).unwrap().project_id.as_deref(),
            Some("first")
        );

        init(&path, "second", TokenSource::Command, true).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("second"));
        assert_eq!(config.auth.source, TokenSource::Command);
    }

    #[test]
    fn test_init_rejects_blank_project() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rcsync.toml");

        assert!(init(&path, "  ", TokenSource::Env, false).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_build_patch_set() {
        let patch = PatchArgs {
            set: Some("parameters.test.defaultValue.value=prod3".to_string()),
            ..args()
        };
        let spec = build_patch(&patch, Path::new(".")).unwrap();
        assert_eq!(spec.target(), "parameters.test.defaultValue.value");
    }

    #[test]
    fn test_build_patch_requires_one_option() {
        assert!(build_patch(&args(), Path::new(".")).is_err());
    }

    #[test]
    fn test_build_patch_unset_state_is_patch_error() {
        let temp_dir = TempDir::new().unwrap();
        let patch = PatchArgs {
            group: Some("banner".to_string()),
            state: Some("neither-enable-nor-disable".to_string()),
            ..args()
        };

        let err = build_patch(&patch, temp_dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::UnsetOption { .. })
        ));
    }
}
