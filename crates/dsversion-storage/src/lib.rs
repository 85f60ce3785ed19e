//! Version record store for dsversion.
//!
//! This crate owns the single persisted entity, [`Version`], and the
//! [`VersionStore`] abstraction over it, with two backends:
//! - JSON file storage (default)
//! - In-memory storage (for testing and embedding)
//!
//! Every mutating call is one short transaction: the backend checks the
//! table's unique constraints and either commits the whole change or
//! returns an error having written nothing.

pub mod error;
pub mod json;
pub mod memory;
pub mod model;
pub mod table;

pub use error::{StorageError, StorageResult};
pub use json::JsonVersionStore;
pub use memory::MemoryVersionStore;
pub use model::{NewVersion, Version, VersionChanges, VersionScope};
pub use table::VersionTable;

use async_trait::async_trait;

/// A trait for version table backends.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Whether the version table exists.
    async fn tables_exist(&self) -> StorageResult<bool>;

    /// Create the version table. Existing rows are kept.
    async fn create_tables(&self) -> StorageResult<()>;

    /// Insert a new version.
    ///
    /// Fails with [`StorageError::DuplicateName`] or
    /// [`StorageError::DuplicateActivity`] without writing anything.
    async fn insert(&self, version: NewVersion) -> StorageResult<Version>;

    /// Get a version by id.
    async fn get(&self, id: &str) -> StorageResult<Option<Version>>;

    /// Find a version by name within a scope.
    async fn find_by_name(&self, scope: &VersionScope, name: &str)
        -> StorageResult<Option<Version>>;

    /// All versions of a package bound to an activity.
    async fn find_by_activity(
        &self,
        package_id: &str,
        activity_id: &str,
    ) -> StorageResult<Vec<Version>>;

    /// All versions in a scope, newest first.
    async fn list(&self, scope: &VersionScope) -> StorageResult<Vec<Version>>;

    /// Replace the mutable fields of a version.
    async fn update(&self, id: &str, changes: VersionChanges) -> StorageResult<Version>;

    /// Delete one version. Deleting a missing id is [`StorageError::NotFound`].
    async fn delete(&self, id: &str) -> StorageResult<Version>;

    /// Delete every version in a scope in one transaction.
    async fn clear(&self, scope: &VersionScope) -> StorageResult<usize>;
}
