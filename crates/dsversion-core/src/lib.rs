//! Dataset versioning for catalog platforms.
//!
//! A version is a named pointer onto one immutable activity in the host's
//! audit log. This crate binds versions to activities, reconstructs
//! datasets and resources as they were at a version, diffs two points in
//! history, and restores a dataset to an earlier version.
//!
//! - [`ActivityResolver`]: finds activities and their snapshots
//! - [`VersionService`]: creates and manages version records
//! - [`SnapshotService`]: rebuilds historical datasets and resources
//! - [`DiffEngine`] and [`RestoreEngine`]: compare and restore
//!
//! [`Versioning`] wires them together over a [`Host`] and a
//! [`VersionStore`](dsversion_storage::VersionStore).

pub mod activity;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod helpers;
pub mod host;
pub mod restore;
pub mod snapshot;
pub mod versions;

pub use activity::ActivityResolver;
pub use bootstrap::{backfill, init_db, BackfillReport, InitOutcome};
pub use config::VersionsConfig;
pub use context::ActionContext;
pub use diff::{DiffEngine, DiffFormat, VersionDiff};
pub use error::{ErrorKind, VersionError, VersionResult};
pub use host::{Dict, Host, MemoryHost};
pub use restore::RestoreEngine;
pub use snapshot::SnapshotService;
pub use versions::{CreateVersion, OwnerRef, VersionPatch, VersionService};

pub use dsversion_storage::Version;

use dsversion_storage::VersionStore;
use std::sync::Arc;

/// All versioning services over one host and one version store.
#[derive(Clone)]
pub struct Versioning {
    pub versions: VersionService,
    pub snapshots: SnapshotService,
    pub diffs: DiffEngine,
    pub restores: RestoreEngine,
}

impl Versioning {
    pub fn new(host: Host, store: Arc<dyn VersionStore>, config: VersionsConfig) -> Self {
        let versions = VersionService::new(host, store, Arc::new(config));
        let snapshots = SnapshotService::new(versions.clone());
        Self {
            diffs: DiffEngine::new(snapshots.clone()),
            restores: RestoreEngine::new(snapshots.clone()),
            versions,
            snapshots,
        }
    }

    pub fn config(&self) -> &VersionsConfig {
        self.versions.config()
    }
}
