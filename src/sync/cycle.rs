//! One fetch -> patch -> write cycle against the Remote Config backend.
//!
//! The ETag obtained by the fetch is the only precondition a normal write
//! may use. Writing without it requires `WriteMode::Force`.

use crate::error::{SyncError, SyncResult};
use crate::patch::{apply_patch, PatchSpec};
use crate::snapshot;
use crate::sync::backend::{ConfigBackend, VersionInfo, WriteResult};
use crate::sync::token::TokenProvider;
use crate::template::{Precondition, Template, VersionToken};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How the patched template is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// `If-Match` with the fetched ETag.
    #[default]
    Guarded,
    /// `If-Match: *`, overwriting concurrent changes.
    Force,
}

/// What a completed cycle did.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// ETag the template was read with.
    pub base_etag: Option<VersionToken>,
    /// Snapshot written after the fetch, if snapshots are enabled.
    pub snapshot: Option<PathBuf>,
    pub result: WriteResult,
    /// The server only validated the template.
    pub validated_only: bool,
}

/// Orchestrates reads and writes of one project's template.
pub struct ConfigSyncCycle<B, T> {
    backend: B,
    tokens: T,
    snapshot_dir: Option<PathBuf>,
}

impl<B: ConfigBackend, T: TokenProvider> ConfigSyncCycle<B, T> {
    pub fn new(backend: B, tokens: T) -> Self {
        Self {
            backend,
            tokens,
            snapshot_dir: None,
        }
    }

    /// Persist every fetched template into `dir` before patching.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn access_token(&self) -> SyncResult<String> {
        debug!("Requesting access token from {} source", self.tokens.name());
        self.tokens.access_token()
    }

    /// Read the current template. A response without ETag is an error.
    pub fn fetch(&self) -> SyncResult<(Template, VersionToken)> {
        let access_token = self.access_token()?;
        let fetched = self.backend.read(&access_token)?;

        let etag = fetched.etag.ok_or_else(|| SyncError::Fetch {
            operation: "fetch",
            status: Some(200),
            body: "ETag not found in response headers".to_string(),
        })?;

        info!("Fetched template (ETag {})", etag);
        Ok((fetched.template, etag))
    }

    /// Publish `template` only if the server still holds revision `etag`.
    pub fn write(&self, template: &Template, etag: &VersionToken) -> SyncResult<WriteResult> {
        self.send(template, &Precondition::IfMatch(etag.clone()), false)
    }

    /// Publish `template` regardless of the server revision.
    pub fn force_write(&self, template: &Template) -> SyncResult<WriteResult> {
        warn!("Force write: concurrent changes on the server will be overwritten");
        self.send(template, &Precondition::Force, false)
    }

    /// Ask the server to validate `template` against revision `etag` without publishing.
    pub fn validate(&self, template: &Template, etag: &VersionToken) -> SyncResult<WriteResult> {
        self.send(template, &Precondition::IfMatch(etag.clone()), true)
    }

    fn send(
        &self,
        template: &Template,
        precondition: &Precondition,
        validate_only: bool,
    ) -> SyncResult<WriteResult> {
        let access_token = self.access_token()?;
        let result = self
            .backend
            .write(&access_token, template, precondition, validate_only)?;

        if validate_only {
            info!("Template validated by server");
        } else {
            match &result.etag {
                Some(etag) => info!("Updated template successfully, new ETag {}", etag),
                None => warn!("Updated template successfully, but server sent no ETag"),
            }
        }
        Ok(result)
    }

    /// Fetch, snapshot (if enabled), patch and write back.
    pub fn run(&self, spec: &PatchSpec, mode: WriteMode) -> SyncResult<CycleOutcome> {
        self.cycle(spec, mode, false)
    }

    /// Like `run`, but the server only validates the patched template.
    pub fn dry_run(&self, spec: &PatchSpec) -> SyncResult<CycleOutcome> {
        self.cycle(spec, WriteMode::Guarded, true)
    }

    fn cycle(&self, spec: &PatchSpec, mode: WriteMode, validate_only: bool) -> SyncResult<CycleOutcome> {
        let (template, etag) = self.fetch()?;

        let snapshot = match &self.snapshot_dir {
            Some(dir) => Some(snapshot::save(dir, &template, &etag, Local::now())?),
            None => None,
        };

        let patched = apply_patch(template, spec)?;

        let result = match (mode, validate_only) {
            (_, true) => self.validate(&patched, &etag)?,
            (WriteMode::Guarded, false) => self.write(&patched, &etag)?,
            (WriteMode::Force, false) => self.force_write(&patched)?,
        };

        Ok(CycleOutcome {
            base_etag: Some(etag),
            snapshot,
            result,
            validated_only: validate_only,
        })
    }

    /// Fetch and store a snapshot without writing anything.
    pub fn pull(&self) -> SyncResult<(PathBuf, VersionToken)> {
        let dir = self
            .snapshot_dir
            .as_deref()
            .ok_or_else(|| SyncError::Config("snapshot directory is not configured".to_string()))?;

        let (template, etag) = self.fetch()?;
        let path = snapshot::save(dir, &template, &etag, Local::now())?;
        Ok((path, etag))
    }

    /// Patch a snapshot from an earlier `pull` and write it back.
    ///
    /// The precondition is `etag` if given, else the ETag recorded next to
    /// the snapshot. With neither, only `WriteMode::Force` may proceed.
    pub fn push_snapshot(
        &self,
        path: &Path,
        etag: Option<VersionToken>,
        spec: &PatchSpec,
        mode: WriteMode,
    ) -> SyncResult<CycleOutcome> {
        let snapshot = snapshot::load(path)?;
        let base_etag = etag.or(snapshot.etag);

        if mode == WriteMode::Guarded && base_etag.is_none() {
            return Err(SyncError::Snapshot {
                path: path.to_path_buf(),
                reason: "no ETag recorded for this snapshot; pass one explicitly or force the write"
                    .to_string(),
            });
        }

        let patched = apply_patch(snapshot.template, spec)?;

        let result = match (mode, &base_etag) {
            (WriteMode::Guarded, Some(etag)) => self.write(&patched, etag)?,
            _ => self.force_write(&patched)?,
        };

        Ok(CycleOutcome {
            base_etag,
            snapshot: Some(snapshot.path),
            result,
            validated_only: false,
        })
    }

    /// Restore a stored revision on the server. Local snapshots are untouched.
    pub fn rollback(&self, version_number: &str) -> SyncResult<WriteResult> {
        let raw = version_number.trim();
        let version_number = match raw.parse::<u64>() {
            Ok(n) if n > 0 && raw.chars().all(|c| c.is_ascii_digit()) => n.to_string(),
            _ => {
                return Err(SyncError::Config(format!(
                    "version number must be a positive integer, got '{}'",
                    raw
                )))
            }
        };

        let access_token = self.access_token()?;
        let result = self.backend.rollback(&access_token, &version_number)?;
        info!("Rolled back to version {}", version_number);
        Ok(result)
    }

    /// Most recent stored revisions, newest first.
    pub fn list_versions(&self, limit: u32) -> SyncResult<Vec<VersionInfo>> {
        let access_token = self.access_token()?;
        self.backend.list_versions(&access_token, limit.clamp(1, 300))
    }
}
