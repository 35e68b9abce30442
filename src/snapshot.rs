//! Local snapshots of fetched templates.
//!
//! A snapshot is `config_<YYYYMMDDHHMMSS>.json` plus a sidecar
//! `config_<...>.json.etag` holding the ETag the template was fetched with,
//! so a later `push` can write it back with the right precondition.
//! Existing snapshots are never overwritten: a second snapshot within the
//! same second gets a `_001`, `_002`, ... suffix, which still sorts after the
//! first one by name.

use crate::error::{SyncError, SyncResult};
use crate::template::{Template, VersionToken};
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const SNAPSHOT_PREFIX: &str = "config_";
const SNAPSHOT_EXT: &str = "json";
const ETAG_EXT: &str = "etag";
const MAX_SAME_SECOND: u32 = 999;

/// A template read back from disk.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    pub template: Template,
    /// `None` when the sidecar file is missing or empty.
    pub etag: Option<VersionToken>,
}

/// File name for a snapshot taken at `at`.
pub fn snapshot_file_name(at: DateTime<Local>) -> String {
    format!(
        "{}{}.{}",
        SNAPSHOT_PREFIX,
        at.format("%Y%m%d%H%M%S"),
        SNAPSHOT_EXT
    )
}

fn suffixed_file_name(at: DateTime<Local>, n: u32) -> String {
    format!(
        "{}{}_{:03}.{}",
        SNAPSHOT_PREFIX,
        at.format("%Y%m%d%H%M%S"),
        n,
        SNAPSHOT_EXT
    )
}

fn etag_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_owned();
    name.push(".");
    name.push(ETAG_EXT);
    PathBuf::from(name)
}

fn snapshot_error(path: &Path, reason: impl ToString) -> SyncError {
    SyncError::Snapshot {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Write `template` and its ETag into `dir`. Returns the snapshot path.
pub fn save(
    dir: &Path,
    template: &Template,
    etag: &VersionToken,
    at: DateTime<Local>,
) -> SyncResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| snapshot_error(dir, e))?;

    let json = template
        .to_json_pretty()
        .map_err(|e| snapshot_error(dir, e))?;

    let (path, mut file) = create_new_snapshot(dir, at)?;
    file.write_all(json.as_bytes())
        .map_err(|e| snapshot_error(&path, e))?;
    fs::write(etag_path(&path), etag.as_str()).map_err(|e| snapshot_error(&path, e))?;

    info!("Retrieved template has been written to {}", path.display());
    Ok(path)
}

fn create_new_snapshot(dir: &Path, at: DateTime<Local>) -> SyncResult<(PathBuf, fs::File)> {
    for n in 0..=MAX_SAME_SECOND {
        let name = if n == 0 {
            snapshot_file_name(at)
        } else {
            suffixed_file_name(at, n)
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(snapshot_error(&path, e)),
        }
    }

    Err(snapshot_error(
        &dir.join(snapshot_file_name(at)),
        "too many snapshots taken within the same second",
    ))
}

/// Read a snapshot and its sidecar ETag.
pub fn load(path: &Path) -> SyncResult<Snapshot> {
    let content = fs::read_to_string(path).map_err(|e| snapshot_error(path, e))?;
    let template = Template::from_json(&content).map_err(|e| snapshot_error(path, e))?;

    let etag = match fs::read_to_string(etag_path(path)) {
        Ok(raw) => VersionToken::new(raw),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(snapshot_error(path, e)),
    };

    Ok(Snapshot {
        path: path.to_path_buf(),
        template,
        etag,
    })
}

/// Most recent snapshot in `dir`, judged by file name.
pub fn latest(dir: &Path) -> SyncResult<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut newest: Option<PathBuf> = None;
    for entry in fs::read_dir(dir).map_err(|e| snapshot_error(dir, e))? {
        let path = entry.map_err(|e| snapshot_error(dir, e))?.path();
        let is_snapshot = path.extension().is_some_and(|ext| ext == SNAPSHOT_EXT)
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SNAPSHOT_PREFIX));

        if is_snapshot && newest.as_ref().map_or(true, |n| path.file_name() > n.file_name()) {
            newest = Some(path);
        }
    }

    Ok(newest)
}
