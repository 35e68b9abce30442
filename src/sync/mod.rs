//! Sync module - Talk to the Remote Config service.
//!
//! This module contains:
//! - TokenProvider trait and access token sources
//! - ConfigBackend trait and the HTTP backend
//! - ConfigSyncCycle: ETag-guarded fetch -> patch -> write

pub mod backend;
pub mod cycle;
pub mod token;

pub use backend::{ConfigBackend, Fetched, HttpBackend, VersionInfo, WriteResult};
pub use cycle::{ConfigSyncCycle, CycleOutcome, WriteMode};
pub use token::{CommandToken, EnvToken, KeyringToken, StaticToken, TokenProvider};
