//! Access token sources for the Remote Config API.
//!
//! The cycle only needs a bearer token. Where it comes from is pluggable:
//! - `StaticToken`: a token handed over directly (tests, CI secrets)
//! - `EnvToken`: read from an environment variable on every request
//! - `CommandToken`: stdout of an external command (e.g. `gcloud auth print-access-token`)
//! - `KeyringToken`: a token stored in the system keychain

use crate::error::{SyncError, SyncResult};
use std::process::Command;
use tracing::debug;

/// Keyring service name used by `KeyringToken::default_entry`.
pub const KEYRING_SERVICE: &str = "rcsync";

/// Supplies a bearer access token.
pub trait TokenProvider {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn access_token(&self) -> SyncResult<String>;
}

impl<T: TokenProvider + ?Sized> TokenProvider for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn access_token(&self) -> SyncResult<String> {
        (**self).access_token()
    }
}

fn non_empty(token: String, source: &str) -> SyncResult<String> {
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(SyncError::Auth(format!("{} returned an empty token", source)));
    }
    Ok(token)
}

/// Fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn name(&self) -> &'static str {
        "static"
    }

    fn access_token(&self) -> SyncResult<String> {
        non_empty(self.0.clone(), "static token")
    }
}

/// Token read from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvToken {
    fn name(&self) -> &'static str {
        "env"
    }

    fn access_token(&self) -> SyncResult<String> {
        let token = std::env::var(&self.var)
            .map_err(|e| SyncError::Auth(format!("environment variable {}: {}", self.var, e)))?;
        non_empty(token, &self.var)
    }
}

/// Token printed by an external command.
#[derive(Debug, Clone)]
pub struct CommandToken {
    program: String,
    args: Vec<String>,
}

impl CommandToken {
    /// Build from `[program, args...]`.
    pub fn new(command: &[String]) -> SyncResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SyncError::Config("auth.command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl TokenProvider for CommandToken {
    fn name(&self) -> &'static str {
        "command"
    }

    fn access_token(&self) -> SyncResult<String> {
        debug!("Requesting access token from `{}`", self.program);

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| SyncError::Auth(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::Auth(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        non_empty(String::from_utf8_lossy(&output.stdout).into_owned(), &self.program)
    }
}

/// Token stored in the system keychain.
pub struct KeyringToken {
    service: String,
    user: String,
}

impl KeyringToken {
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }

    /// Entry for a project: service `rcsync`, user = project id.
    pub fn default_entry(project_id: &str) -> Self {
        Self::new(KEYRING_SERVICE, project_id)
    }

    fn entry(&self) -> SyncResult<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| SyncError::Auth(format!("keyring entry {}/{}: {}", self.service, self.user, e)))
    }

    /// Store a token for later runs.
    pub fn store(&self, token: &str) -> SyncResult<()> {
        self.entry()?
            .set_password(token)
            .map_err(|e| SyncError::Auth(format!("cannot store token in keyring: {}", e)))
    }
}

impl TokenProvider for KeyringToken {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn access_token(&self) -> SyncResult<String> {
        let token = self
            .entry()?
            .get_password()
            .map_err(|e| SyncError::Auth(format!("cannot read token from keyring: {}", e)))?;
        non_empty(token, "keyring")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::new(" abc \n").access_token().unwrap(), "abc");
        assert!(matches!(StaticToken::new("").access_token(), Err(SyncError::Auth(_))));
    }

    #[test]
    fn test_env_token_missing_var() {
        let provider = EnvToken::new("RCSYNC_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert!(matches!(provider.access_token(), Err(SyncError::Auth(_))));
    }

    #[test]
    fn test_command_token_rejects_empty_command() {
        assert!(matches!(CommandToken::new(&[]), Err(SyncError::Config(_))));
    }

    #[test]
    #[cfg(unix)]
    fn test_command_token_reads_stdout() {
        let command = vec!["echo".to_string(), "token-from-cli".to_string()];
        let provider = CommandToken::new(&command).unwrap();
        assert_eq!(provider.access_token().unwrap(), "token-from-cli");
    }

    #[test]
    #[cfg(unix)]
    fn test_command_token_failure_is_auth_error() {
        let command = vec!["false".to_string()];
        let provider = CommandToken::new(&command).unwrap();
        assert!(matches!(provider.access_token(), Err(SyncError::Auth(_))));
    }

    #[test]
    fn test_boxed_provider() {
        let provider: Box<dyn TokenProvider> = Box::new(StaticToken::new("boxed"));
        assert_eq!(provider.name(), "static");
        assert_eq!(provider.access_token().unwrap(), "boxed");
    }
}
