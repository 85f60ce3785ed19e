//! The persisted version entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named pointer onto one activity snapshot of a dataset or resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique identifier, generated at insert.
    pub id: String,

    /// Owning dataset.
    pub package_id: String,

    /// Owning resource for resource-level versions.
    #[serde(default)]
    pub resource_id: Option<String>,

    /// Activity this version is bound to. Never changes after insert.
    pub activity_id: String,

    /// Short human label, unique within `(package_id, resource_id)`.
    pub name: String,

    /// Free-text description.
    #[serde(default)]
    pub notes: Option<String>,

    /// User credited with the version.
    pub creator_user_id: String,

    /// Set once by the store, in UTC.
    pub created: DateTime<Utc>,
}

impl Version {
    /// The scope this version's name is unique within.
    pub fn scope(&self) -> VersionScope {
        VersionScope {
            package_id: self.package_id.clone(),
            resource_id: self.resource_id.clone(),
        }
    }

    /// Whether this is a dataset-level version.
    pub fn is_dataset_level(&self) -> bool {
        self.resource_id.is_none()
    }
}

/// Values supplied by the caller when inserting a version.
///
/// `id` and `created` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersion {
    pub package_id: String,
    pub resource_id: Option<String>,
    pub activity_id: String,
    pub name: String,
    pub notes: Option<String>,
    pub creator_user_id: String,
}

/// The mutable fields of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChanges {
    pub name: String,
    pub notes: Option<String>,
}

/// `(package_id, resource_id)` pair that version names are unique within.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionScope {
    pub package_id: String,
    pub resource_id: Option<String>,
}

impl VersionScope {
    /// Scope of dataset-level versions.
    pub fn dataset(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            resource_id: None,
        }
    }

    /// Scope of one resource's versions.
    pub fn resource(package_id: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            resource_id: Some(resource_id.into()),
        }
    }

    /// Whether a version falls in this scope.
    pub fn contains(&self, version: &Version) -> bool {
        version.package_id == self.package_id && version.resource_id == self.resource_id
    }
}

impl std::fmt::Display for VersionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.resource_id {
            Some(resource_id) => write!(f, "{}/{}", self.package_id, resource_id),
            None => write!(f, "{}", self.package_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(resource_id: Option<&str>) -> Version {
        Version {
            id: "ver_1".to_string(),
            package_id: "pkg_1".to_string(),
            resource_id: resource_id.map(str::to_string),
            activity_id: "act_1".to_string(),
            name: "v1".to_string(),
            notes: None,
            creator_user_id: "usr_1".to_string(),
            created: Utc::now(),
        }
    }

    #[test]
    fn test_scope_contains_matches_resource_exactly() {
        let dataset_level = version(None);
        let resource_level = version(Some("res_1"));

        assert!(VersionScope::dataset("pkg_1").contains(&dataset_level));
        assert!(!VersionScope::dataset("pkg_1").contains(&resource_level));
        assert!(VersionScope::resource("pkg_1", "res_1").contains(&resource_level));
        assert!(!VersionScope::resource("pkg_1", "res_2").contains(&resource_level));
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(VersionScope::dataset("pkg_1").to_string(), "pkg_1");
        assert_eq!(
            VersionScope::resource("pkg_1", "res_1").to_string(),
            "pkg_1/res_1"
        );
    }

    #[test]
    fn test_version_deserializes_without_optional_fields() {
        let json = r#"{
            "id": "ver_1",
            "package_id": "pkg_1",
            "activity_id": "act_1",
            "name": "v1",
            "creator_user_id": "usr_1",
            "created": "2024-01-01T00:00:00Z"
        }"#;
        let version: Version = serde_json::from_str(json).unwrap();
        assert!(version.is_dataset_level());
        assert!(version.notes.is_none());
    }
}
