//! Domain error types.

use crate::host::HostError;
use dsversion_storage::StorageError;
use thiserror::Error;

/// Result type for versioning operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Errors surfaced by the versioning services.
#[derive(Debug, Error)]
pub enum VersionError {
    /// A dataset, resource, version or activity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Caller-supplied data violates an invariant.
    #[error("{0}")]
    Validation(String),

    /// The acting user failed the delegated authorization check.
    #[error("{0}")]
    NotAuthorized(String),

    /// Version table failure.
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Host platform failure.
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// A record or snapshot could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by callers to map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    NotAuthorized,
    Internal,
}

impl VersionError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotAuthorized(_) => ErrorKind::NotAuthorized,
            Self::Storage(_) | Self::Host(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Constraint violations become validation errors here and nowhere else.
impl From<StorageError> for VersionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateName { .. } => {
                Self::validation("Version names must be unique per dataset or resource")
            }
            StorageError::DuplicateActivity { .. } => {
                Self::validation("Version already exists for this activity")
            }
            StorageError::NotFound(_) => Self::not_found("Version not found"),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_name_becomes_validation() {
        let err: VersionError = StorageError::DuplicateName {
            package_id: "pkg_1".to_string(),
            name: "HEAD".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("must be unique"));
    }

    #[test]
    fn test_duplicate_activity_becomes_validation() {
        let err: VersionError = StorageError::DuplicateActivity {
            activity_id: "act_1".to_string(),
            existing_id: "ver_1".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Version already exists for this activity");
    }

    #[test]
    fn test_infrastructure_errors_are_internal() {
        let err: VersionError = StorageError::TableMissing.into();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err: VersionError = HostError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_encode_failure_is_internal_not_storage() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: VersionError = json_err.into();
        assert!(matches!(err, VersionError::Serialization(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().starts_with("Serialization error"));
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let err: VersionError = StorageError::not_found("ver_1").into();
        assert!(err.is_not_found());
    }
}
