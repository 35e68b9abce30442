//! Config module - Manages rcsync configuration (rcsync.toml).
//!
//! Configuration file contains:
//! - Firebase project and API base URL
//! - Snapshot and patch file directories
//! - Access token source

use crate::sync::backend::DEFAULT_BASE_URL;
use crate::sync::token::{CommandToken, EnvToken, KeyringToken, StaticToken, TokenProvider};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `project_id`.
pub const PROJECT_ID_ENV: &str = "FIREBASE_PROJECT_ID";

/// Where the bearer token comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    /// Environment variable (default)
    #[default]
    Env,
    /// Output of an external command
    Command,
    /// System keychain
    Keyring,
    /// Token written in the config file
    Static,
}

/// Access token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub source: TokenSource,

    /// Variable read when `source = "env"`
    #[serde(default = "default_env_var")]
    pub env_var: String,

    /// Program and arguments run when `source = "command"`
    #[serde(default = "default_token_command")]
    pub command: Vec<String>,

    /// Token used when `source = "static"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_env_var() -> String {
    "FIREBASE_ACCESS_TOKEN".to_string()
}

fn default_token_command() -> Vec<String> {
    ["gcloud", "auth", "print-access-token"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            source: TokenSource::default(),
            env_var: default_env_var(),
            command: default_token_command(),
            token: None,
        }
    }
}

/// Main rcsync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Firebase project id (overridden by FIREBASE_PROJECT_ID)
    #[serde(default)]
    pub project_id: Option<String>,

    /// Remote Config API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory for fetched template snapshots
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Directory holding `<group>_enabled.json` / `<group>_disabled.json`
    #[serde(default = "default_patch_dir")]
    pub patch_dir: PathBuf,

    /// Write a snapshot after every fetch
    #[serde(default = "default_write_snapshots")]
    pub write_snapshots: bool,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("./snapshots")
}

fn default_patch_dir() -> PathBuf {
    PathBuf::from("./patches")
}

fn default_write_snapshots() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            base_url: default_base_url(),
            snapshot_dir: default_snapshot_dir(),
            patch_dir: default_patch_dir(),
            write_snapshots: default_write_snapshots(),
            auth: AuthConfig::default(),
        }
    }
}

/// Get default config directory (~/.config/rcsync/).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("rcsync"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get default config file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("rcsync.toml")
}

impl Config {
    /// Load config from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Cannot parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `path` if given, else the default path, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save config to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Cannot serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Cannot write config file: {}", path.display()))?;

        // May hold a static token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Project id, with FIREBASE_PROJECT_ID taking precedence over the file.
    pub fn project_id(&self) -> Result<String> {
        self.resolve_project_id(std::env::var(PROJECT_ID_ENV).ok())
    }

    fn resolve_project_id(&self, env_value: Option<String>) -> Result<String> {
        let project_id = env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.project_id.clone())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        match project_id {
            Some(id) => Ok(id),
            None => bail!(
                "No Firebase project configured. Set project_id in the config file or {}",
                PROJECT_ID_ENV
            ),
        }
    }

    /// Build the configured token provider.
    pub fn token_provider(&self, project_id: &str) -> Result<Box<dyn TokenProvider>> {
        let provider: Box<dyn TokenProvider> = match self.auth.source {
            TokenSource::Env => Box::new(EnvToken::new(&self.auth.env_var)),
            TokenSource::Command => Box::new(CommandToken::new(&self.auth.command)?),
            TokenSource::Keyring => Box::new(KeyringToken::default_entry(project_id)),
            TokenSource::Static => match &self.auth.token {
                Some(token) => Box::new(StaticToken::new(token)),
                None => bail!("auth.source is \"static\" but auth.token is not set"),
            },
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.write_snapshots);
        assert_eq!(config.auth.source, TokenSource::Env);
        assert_eq!(config.auth.command[0], "gcloud");
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let config: Config = toml::from_str(
            r#"
            project_id = "demo"

            [auth]
            source = "command"
            command = ["print-token", "--quiet"]
            "#,
        )?;

        assert_eq!(config.project_id.as_deref(), Some("demo"));
        assert_eq!(config.snapshot_dir, PathBuf::from("./snapshots"));
        assert_eq!(config.auth.source, TokenSource::Command);
        assert_eq!(config.auth.env_var, "FIREBASE_ACCESS_TOKEN");
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("nested").join("rcsync.toml");

        let config = Config {
            project_id: Some("demo".to_string()),
            write_snapshots: false,
            ..Config::default()
        };
        config.save(&config_path)?;

        let loaded = Config::load(&config_path)?;
        assert_eq!(loaded.project_id.as_deref(), Some("demo"));
        assert!(!loaded.write_snapshots);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_save_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("perms.toml");

        Config::default().save(&config_path)?;

        let mode = std::fs::metadata(&config_path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "Config file should have 0600 permissions");
        Ok(())
    }

    #[test]
    fn test_project_id_resolution() {
        let config = Config {
            project_id: Some("from-file".to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolve_project_id(None).unwrap(), "from-file");
        assert_eq!(
            config.resolve_project_id(Some("from-env".to_string())).unwrap(),
            "from-env"
        );
        assert_eq!(
            config.resolve_project_id(Some("  ".to_string())).unwrap(),
            "from-file"
        );
        assert!(Config::default().resolve_project_id(None).is_err());
    }

    #[test]
    fn test_static_source_requires_token() {
        let mut config = Config::default();
        config.auth.source = TokenSource::Static;
        assert!(config.token_provider("demo").is_err());

        config.auth.token = Some("abc".to_string());
        let provider = config.token_provider("demo").unwrap();
        assert_eq!(provider.access_token().unwrap(), "abc");
    }
}
