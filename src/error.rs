//! Error types for one sync cycle.
//!
//! Every failure aborts the cycle and is handed back to the caller. Only
//! `Conflict` is expected during normal operation: another writer published
//! a newer template, and the caller may fetch again and re-run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or applying a [`PatchSpec`](crate::patch::PatchSpec).
#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("patch path is empty")]
    EmptyPath,

    #[error("expected PATH=VALUE, got '{0}'")]
    InvalidAssignment(String),

    #[error("key '{key}' not found (patch path '{path}')")]
    MissingKey { path: String, key: String },

    #[error("value at '{path}' is not a JSON object")]
    NotAnObject { path: String },

    #[error("value at '{path}' is {expected}, replacement is {found}")]
    KindMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("option '{option}' must be 'enabled' or 'disabled', got '{value}'")]
    UnsetOption { option: String, value: String },

    #[error("patch file not found: {}", .0.display())]
    MissingFragment(PathBuf),

    #[error("patch file {} is invalid: {reason}", .path.display())]
    InvalidFragment { path: PathBuf, reason: String },
}

/// Errors surfaced by [`ConfigSyncCycle`](crate::sync::ConfigSyncCycle).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot obtain access token: {0}")]
    Auth(String),

    #[error("{operation} failed ({}): {body}", describe_status(.status))]
    Fetch {
        operation: &'static str,
        status: Option<u16>,
        body: String,
    },

    #[error("patch rejected: {0}")]
    Patch(#[from] PatchError),

    #[error("{operation} rejected, template changed on server (status {status}, If-Match {etag}): {body}")]
    Conflict {
        operation: &'static str,
        status: u16,
        etag: String,
        body: String,
    },

    #[error("{operation} failed ({}): {body}", describe_status(.status))]
    Write {
        operation: &'static str,
        status: Option<u16>,
        body: String,
    },

    #[error("snapshot {}: {reason}", .path.display())]
    Snapshot { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether re-running the whole cycle can succeed without operator changes.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no response".to_string(),
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
