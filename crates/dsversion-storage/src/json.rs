//! JSON file-based version store.
//!
//! The whole table is one JSON document, `<base_path>/version.json`. Each
//! mutation reads the table, applies the change in memory, checks
//! constraints, and replaces the file atomically (write to a temp file, then
//! rename). A failed check never reaches the rename.
//!
//! Writers hold an exclusive advisory lock on `version.json.lock` for the
//! whole read-modify-write, so a `backfill` run and a live server sharing
//! one directory never overwrite each other's rows.

use crate::{
    NewVersion, StorageError, StorageResult, Version, VersionChanges, VersionScope, VersionStore,
    VersionTable,
};
use async_trait::async_trait;
use chrono::Utc;
use dsversion_util::TimingGuard;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

const TABLE_FILE: &str = "version.json";
const LOCK_FILE: &str = "version.json.lock";

/// JSON file-based version store.
pub struct JsonVersionStore {
    base_path: PathBuf,
    /// Serializes transactions within this process. Other processes are
    /// kept out by the lock file.
    lock: Mutex<()>,
}

impl JsonVersionStore {
    /// Create a store rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the table file.
    pub fn table_path(&self) -> PathBuf {
        self.base_path.join(TABLE_FILE)
    }

    /// Path of the advisory lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.base_path.join(LOCK_FILE)
    }

    /// Block until this process holds the exclusive lock on the table.
    /// The lock is released when the returned file is dropped.
    async fn lock_table(&self) -> StorageResult<File> {
        let path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(file)
    }

    async fn load(&self) -> StorageResult<VersionTable> {
        let path = self.table_path();
        debug!(path = %path.display(), "Reading version table");

        match fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::TableMissing),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn save(&self, table: &VersionTable) -> StorageResult<()> {
        let path = self.table_path();
        debug!(path = %path.display(), rows = table.len(), "Writing version table");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(table)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn read<R>(&self, f: impl FnOnce(&VersionTable) -> R) -> StorageResult<R> {
        let _timing = TimingGuard::store("read");
        let _guard = self.lock.lock().await;
        let table = self.load().await?;
        Ok(f(&table))
    }

    async fn transaction<R>(
        &self,
        f: impl FnOnce(&mut VersionTable) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let _timing = TimingGuard::store("transaction");
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_table().await?;
        let mut table = self.load().await?;
        let result = f(&mut table)?;
        self.save(&table).await?;
        Ok(result)
    }
}

#[async_trait]
impl VersionStore for JsonVersionStore {
    async fn tables_exist(&self) -> StorageResult<bool> {
        Ok(self.table_path().exists())
    }

    async fn create_tables(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_table().await?;
        if self.table_path().exists() {
            return Ok(());
        }
        self.save(&VersionTable::new()).await?;
        info!(path = %self.table_path().display(), "Created version table");
        Ok(())
    }

    async fn insert(&self, version: NewVersion) -> StorageResult<Version> {
        self.transaction(|table| table.insert(version, Utc::now()))
            .await
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Version>> {
        self.read(|table| table.get(id).cloned()).await
    }

    async fn find_by_name(
        &self,
        scope: &VersionScope,
        name: &str,
    ) -> StorageResult<Option<Version>> {
        self.read(|table| table.find_by_name(scope, name).cloned())
            .await
    }

    async fn find_by_activity(
        &self,
        package_id: &str,
        activity_id: &str,
    ) -> StorageResult<Vec<Version>> {
        self.read(|table| table.find_by_activity(package_id, activity_id))
            .await
    }

    async fn list(&self, scope: &VersionScope) -> StorageResult<Vec<Version>> {
        self.read(|table| table.list(scope)).await
    }

    async fn update(&self, id: &str, changes: VersionChanges) -> StorageResult<Version> {
        self.transaction(|table| table.update(id, changes)).await
    }

    async fn delete(&self, id: &str) -> StorageResult<Version> {
        self.transaction(|table| table.remove(id)).await
    }

    async fn clear(&self, scope: &VersionScope) -> StorageResult<usize> {
        self.transaction(|table| Ok(table.clear(scope))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_version(name: &str, activity_id: &str, resource_id: Option<&str>) -> NewVersion {
        NewVersion {
            package_id: "pkg_1".to_string(),
            resource_id: resource_id.map(str::to_string),
            activity_id: activity_id.to_string(),
            name: name.to_string(),
            notes: None,
            creator_user_id: "usr_1".to_string(),
        }
    }

    async fn store() -> (tempfile::TempDir, JsonVersionStore) {
        let dir = tempdir().unwrap();
        let store = JsonVersionStore::new(dir.path().join("versions"));
        store.create_tables().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = JsonVersionStore::new(dir.path());
        assert!(!store.tables_exist().await.unwrap());

        store.create_tables().await.unwrap();
        store.insert(new_version("v1", "act_1", None)).await.unwrap();
        store.create_tables().await.unwrap();

        assert!(store.tables_exist().await.unwrap());
        let rows = store.list(&VersionScope::dataset("pkg_1")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_reported() {
        let dir = tempdir().unwrap();
        let store = JsonVersionStore::new(dir.path());
        let err = store.get("ver_1").await.unwrap_err();
        assert!(matches!(err, StorageError::TableMissing));
    }

    #[tokio::test]
    async fn test_insert_and_reopen() {
        let (dir, store) = store().await;
        let created = store.insert(new_version("v1", "act_1", None)).await.unwrap();

        let reopened = JsonVersionStore::new(dir.path().join("versions"));
        let fetched = reopened.get(&created.id).await.unwrap();
        assert_eq!(fetched, Some(created));
    }

    #[tokio::test]
    async fn test_failed_insert_writes_nothing() {
        let (_dir, store) = store().await;
        store.insert(new_version("HEAD", "act_1", None)).await.unwrap();
        let before = std::fs::read_to_string(store.table_path()).unwrap();

        let err = store
            .insert(new_version("HEAD", "act_2", None))
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());

        let after = std::fs::read_to_string(store.table_path()).unwrap();
        assert_eq!(before, after);
        assert!(!store.table_path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_dir, store) = store().await;
        let created = store
            .insert(new_version("1", "act_1", Some("res_1")))
            .await
            .unwrap();

        let updated = store
            .update(
                &created.id,
                VersionChanges {
                    name: "1.1".to_string(),
                    notes: Some("edited".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "1.1");
        assert_eq!(updated.created, created.created);

        store.delete(&created.id).await.unwrap();
        assert!(matches!(
            store.delete(&created.id).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_clear_scope() {
        let (_dir, store) = store().await;
        store
            .insert(new_version("1", "act_1", Some("res_1")))
            .await
            .unwrap();
        store
            .insert(new_version("2", "act_2", Some("res_1")))
            .await
            .unwrap();
        store.insert(new_version("1", "act_1", None)).await.unwrap();

        let removed = store
            .clear(&VersionScope::resource("pkg_1", "res_1"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.list(&VersionScope::dataset("pkg_1")).await.unwrap().len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_separate_handles_do_not_lose_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("versions");
        JsonVersionStore::new(&path).create_tables().await.unwrap();

        let writers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|writer| {
                let store = JsonVersionStore::new(&path);
                tokio::spawn(async move {
                    for i in 0..15 {
                        let name = format!("{writer}-{i}");
                        let resource_id = format!("res_{writer}");
                        store
                            .insert(new_version(&name, "act_1", Some(resource_id.as_str())))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let reopened = JsonVersionStore::new(&path);
        for writer in ["a", "b"] {
            let scope = VersionScope::resource("pkg_1", format!("res_{writer}"));
            assert_eq!(reopened.list(&scope).await.unwrap().len(), 15);
        }
        assert!(reopened.lock_path().exists());
    }
}
