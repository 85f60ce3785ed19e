//! In-memory version store.

use crate::{
    NewVersion, StorageError, StorageResult, Version, VersionChanges, VersionScope, VersionStore,
    VersionTable,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::RwLock;

/// In-memory version store.
///
/// The table lives behind a single lock, so constraint checks and the write
/// they guard happen atomically. Nothing is persisted.
pub struct MemoryVersionStore {
    table: RwLock<Option<VersionTable>>,
}

impl MemoryVersionStore {
    /// Create a store whose table already exists.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Some(VersionTable::new())),
        }
    }

    /// Create a store whose table has not been created yet.
    pub fn uninitialized() -> Self {
        Self {
            table: RwLock::new(None),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&VersionTable) -> R) -> StorageResult<R> {
        let guard = self
            .table
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        let table = guard.as_ref().ok_or(StorageError::TableMissing)?;
        Ok(f(table))
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut VersionTable) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        let table = guard.as_mut().ok_or(StorageError::TableMissing)?;

        // Work on a copy so a failed mutation cannot leave partial changes.
        let mut working = table.clone();
        let result = f(&mut working)?;
        *table = working;
        Ok(result)
    }
}

impl Default for MemoryVersionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn tables_exist(&self) -> StorageResult<bool> {
        let guard = self
            .table
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(guard.is_some())
    }

    async fn create_tables(&self) -> StorageResult<()> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        if guard.is_none() {
            *guard = Some(VersionTable::new());
        }
        Ok(())
    }

    async fn insert(&self, version: NewVersion) -> StorageResult<Version> {
        self.write(|table| table.insert(version, Utc::now()))
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Version>> {
        self.read(|table| table.get(id).cloned())
    }

    async fn find_by_name(
        &self,
        scope: &VersionScope,
        name: &str,
    ) -> StorageResult<Option<Version>> {
        self.read(|table| table.find_by_name(scope, name).cloned())
    }

    async fn find_by_activity(
        &self,
        package_id: &str,
        activity_id: &str,
    ) -> StorageResult<Vec<Version>> {
        self.read(|table| table.find_by_activity(package_id, activity_id))
    }

    async fn list(&self, scope: &VersionScope) -> StorageResult<Vec<Version>> {
        self.read(|table| table.list(scope))
    }

    async fn update(&self, id: &str, changes: VersionChanges) -> StorageResult<Version> {
        self.write(|table| table.update(id, changes))
    }

    async fn delete(&self, id: &str) -> StorageResult<Version> {
        self.write(|table| table.remove(id))
    }

    async fn clear(&self, scope: &VersionScope) -> StorageResult<usize> {
        self.write(|table| Ok(table.clear(scope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_version(name: &str, activity_id: &str) -> NewVersion {
        NewVersion {
            package_id: "pkg_1".to_string(),
            resource_id: None,
            activity_id: activity_id.to_string(),
            name: name.to_string(),
            notes: Some("notes".to_string()),
            creator_user_id: "usr_1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryVersionStore::new();
        let created = store.insert(new_version("v1", "act_1")).await.unwrap();

        let fetched = store.get(&created.id).await.unwrap();
        assert_eq!(fetched, Some(created.clone()));

        let by_name = store
            .find_by_name(&VersionScope::dataset("pkg_1"), "v1")
            .await
            .unwrap();
        assert_eq!(by_name, Some(created));
    }

    #[tokio::test]
    async fn test_memory_store_uninitialized() {
        let store = MemoryVersionStore::uninitialized();
        assert!(!store.tables_exist().await.unwrap());

        let err = store.insert(new_version("v1", "act_1")).await.unwrap_err();
        assert!(matches!(err, StorageError::TableMissing));

        store.create_tables().await.unwrap();
        assert!(store.tables_exist().await.unwrap());
        store.insert(new_version("v1", "act_1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_create_tables_keeps_rows() {
        let store = MemoryVersionStore::new();
        store.insert(new_version("v1", "act_1")).await.unwrap();
        store.create_tables().await.unwrap();

        let rows = store.list(&VersionScope::dataset("pkg_1")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_delete_twice() {
        let store = MemoryVersionStore::new();
        let created = store.insert(new_version("v1", "act_1")).await.unwrap();

        store.delete(&created.id).await.unwrap();
        let err = store.delete(&created.id).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(store.get(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_same_name() {
        let store = Arc::new(MemoryVersionStore::new());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert(new_version("HEAD", &format!("act_{i}"))).await
            }));
        }

        let mut ok = 0;
        let mut duplicate = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(StorageError::DuplicateName { .. }) => duplicate += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(duplicate, 7);
        let rows = store.list(&VersionScope::dataset("pkg_1")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
