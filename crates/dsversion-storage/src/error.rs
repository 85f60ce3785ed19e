//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during version table operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Row not found
    #[error("Version not found: {0}")]
    NotFound(String),

    /// The `(package_id, resource_id, name)` constraint was violated.
    #[error("Duplicate version name {name:?} for package {package_id}")]
    DuplicateName { package_id: String, name: String },

    /// A dataset-level version already points at this activity.
    #[error("Activity {activity_id} is already bound to version {existing_id}")]
    DuplicateActivity {
        activity_id: String,
        existing_id: String,
    },

    /// The version table has not been created yet.
    #[error("Version table does not exist; run init-db first")]
    TableMissing,

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StorageError {
    /// Create a not found error for the given version id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Whether this error is a uniqueness constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. } | Self::DuplicateActivity { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_not_found_formats_id() {
        let err = StorageError::not_found("ver_123");
        assert_eq!(err.to_string(), "Version not found: ver_123");
    }

    #[test]
    fn storage_error_duplicate_name_displays() {
        let err = StorageError::DuplicateName {
            package_id: "pkg_1".to_string(),
            name: "HEAD".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate version name \"HEAD\" for package pkg_1"
        );
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn storage_error_duplicate_activity_is_constraint_violation() {
        let err = StorageError::DuplicateActivity {
            activity_id: "act_1".to_string(),
            existing_id: "ver_1".to_string(),
        };
        assert!(err.is_constraint_violation());
        assert!(!StorageError::TableMissing.is_constraint_violation());
    }

    #[test]
    fn storage_error_io_wraps_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StorageError::from(io_err);
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn storage_error_json_wraps_serde_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err = StorageError::from(json_err);
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn storage_error_lock_poisoned_displays() {
        let err = StorageError::LockPoisoned("rwlock poisoned".to_string());
        assert_eq!(err.to_string(), "Lock poisoned: rwlock poisoned");
    }
}
