//! Requirement evaluation and load-order remediation for modorder.
//!
//! This crate ties the schema layer and remote fetching together into the
//! `Engine`: the context object that owns the manifest cache, evaluates every
//! requirement against a host `Catalog`, aggregates issues by owning package,
//! and applies remediation actions to the active order. It also provides
//! content hashing for source drift checks, the per-package user data store,
//! and a directory scanner that builds a catalog from a mods folder.

pub mod catalog;
pub mod drift;
pub mod engine;
pub mod issues;
pub mod manifest;
pub mod requirement;
pub mod resolution;
pub mod scan;
pub mod userdata;
pub mod version_check;

pub use catalog::{Catalog, LegacyDeclarations, ModList, Package};
pub use drift::{content_hash, diff_trees, sync_copy, DriftReport};
pub use engine::{Engine, EngineOptions};
pub use issues::{Issue, IssueGroup};
pub use manifest::Manifest;
pub use requirement::{Context, Kind, Requirement, SyncStatus};
pub use resolution::{Action, Outcome, Resolution, SearchSite};
pub use scan::{load_catalog, load_modlist, save_modlist, scan_mods_dir, ModListFile};
pub use userdata::UserDataStore;
pub use version_check::{validate_transition, CheckPhase, CheckState, VersionCheck};

use thiserror::Error;

/// No issue.
pub const SEVERITY_NONE: u8 = 0;
/// Informational or still in progress.
pub const SEVERITY_NOTICE: u8 = 1;
/// Wrong but resolvable.
pub const SEVERITY_MINOR: u8 = 2;
/// Missing, conflicting, or misordered.
pub const SEVERITY_CRITICAL: u8 = 3;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] modorder_schema::ManifestError),
    #[error("remote error: {0}")]
    Remote(#[from] modorder_remote::RemoteError),
    #[error("invalid version check transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("package not installed: {0}")]
    PackageNotFound(String),
    #[error("package not active: {0}")]
    NotActive(String),
    #[error("no user data directory configured")]
    NoUserDataStore,
    #[error("user data integrity failure for {id}: expected {expected}, got {actual}")]
    IntegrityFailure {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
