//! In-memory representation of the version table.
//!
//! Both backends load a [`VersionTable`], mutate it, and only persist the
//! result when every constraint holds. A failed mutation therefore leaves
//! nothing behind.

use crate::{NewVersion, StorageError, StorageResult, Version, VersionChanges, VersionScope};
use chrono::{DateTime, Utc};
use dsversion_util::Identifier;
use serde::{Deserialize, Serialize};

/// Rows of the version table in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionTable {
    #[serde(default)]
    rows: Vec<Version>,
}

impl VersionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a new row, assigning `id` and `created`.
    ///
    /// `created` never goes backwards: if the clock reads earlier than the
    /// newest row, the newest row's timestamp is reused.
    pub fn insert(&mut self, new: NewVersion, now: DateTime<Utc>) -> StorageResult<Version> {
        let created = self
            .rows
            .iter()
            .map(|v| v.created)
            .max()
            .map_or(now, |newest| newest.max(now));

        let version = Version {
            id: Identifier::version(),
            package_id: new.package_id,
            resource_id: new.resource_id,
            activity_id: new.activity_id,
            name: new.name,
            notes: new.notes,
            creator_user_id: new.creator_user_id,
            created,
        };

        self.check_constraints(&version)?;
        self.rows.push(version.clone());
        Ok(version)
    }

    /// Get a row by id.
    pub fn get(&self, id: &str) -> Option<&Version> {
        self.rows.iter().find(|v| v.id == id)
    }

    /// Find a row by name within a scope.
    pub fn find_by_name(&self, scope: &VersionScope, name: &str) -> Option<&Version> {
        self.rows
            .iter()
            .find(|v| scope.contains(v) && v.name == name)
    }

    /// All rows of a package bound to an activity, at any granularity.
    pub fn find_by_activity(&self, package_id: &str, activity_id: &str) -> Vec<Version> {
        newest_first(
            self.rows
                .iter()
                .filter(|v| v.package_id == package_id && v.activity_id == activity_id),
        )
    }

    /// All rows in a scope, newest first.
    pub fn list(&self, scope: &VersionScope) -> Vec<Version> {
        newest_first(self.rows.iter().filter(|v| scope.contains(v)))
    }

    /// Apply new mutable fields to a row.
    pub fn update(&mut self, id: &str, changes: VersionChanges) -> StorageResult<Version> {
        let index = self
            .rows
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| StorageError::not_found(id))?;

        let mut candidate = self.rows[index].clone();
        candidate.name = changes.name;
        candidate.notes = changes.notes;

        self.check_constraints(&candidate)?;
        self.rows[index] = candidate.clone();
        Ok(candidate)
    }

    /// Remove exactly one row.
    pub fn remove(&mut self, id: &str) -> StorageResult<Version> {
        let index = self
            .rows
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| StorageError::not_found(id))?;
        Ok(self.rows.remove(index))
    }

    /// Remove every row in a scope, returning how many were removed.
    pub fn clear(&mut self, scope: &VersionScope) -> usize {
        let before = self.rows.len();
        self.rows.retain(|v| !scope.contains(v));
        before - self.rows.len()
    }

    /// Enforce the table's unique constraints against every other row.
    ///
    /// - `(package_id, resource_id, name)` is unique.
    /// - `(package_id, activity_id)` is unique among dataset-level rows.
    fn check_constraints(&self, candidate: &Version) -> StorageResult<()> {
        for row in self.rows.iter().filter(|v| v.id != candidate.id) {
            if row.package_id == candidate.package_id
                && row.resource_id == candidate.resource_id
                && row.name == candidate.name
            {
                return Err(StorageError::DuplicateName {
                    package_id: candidate.package_id.clone(),
                    name: candidate.name.clone(),
                });
            }

            if candidate.is_dataset_level()
                && row.is_dataset_level()
                && row.package_id == candidate.package_id
                && row.activity_id == candidate.activity_id
            {
                return Err(StorageError::DuplicateActivity {
                    activity_id: candidate.activity_id.clone(),
                    existing_id: row.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Sort by `created` descending; rows inserted later win ties.
fn newest_first<'a>(rows: impl DoubleEndedIterator<Item = &'a Version>) -> Vec<Version> {
    let mut versions: Vec<Version> = rows.rev().cloned().collect();
    versions.sort_by(|a, b| b.created.cmp(&a.created));
    versions
}
