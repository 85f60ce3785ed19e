//! Assertion helpers for versioning results.
//!
//! Each helper checks the error kind and, where given, a fragment of the
//! message, and prints the actual outcome when it does not match.

use dsversion_core::{ErrorKind, VersionResult};
use std::fmt::Debug;

fn assert_kind<T: Debug>(result: &VersionResult<T>, kind: ErrorKind, fragment: Option<&str>) {
    match result {
        Err(err) => {
            assert_eq!(
                err.kind(),
                kind,
                "Expected {kind:?} error, got {:?}: {err}",
                err.kind()
            );
            if let Some(fragment) = fragment {
                assert!(
                    err.to_string().contains(fragment),
                    "Error message does not contain expected text.\nExpected to find: {fragment}\nActual: {err}"
                );
            }
        }
        Ok(value) => panic!("Expected {kind:?} error, got Ok({value:?})"),
    }
}

/// Assert that a result is a not-found error.
pub fn assert_not_found<T: Debug>(result: &VersionResult<T>) {
    assert_kind(result, ErrorKind::NotFound, None);
}

/// Assert that a result is a not-found error with a message containing `fragment`.
pub fn assert_not_found_with<T: Debug>(result: &VersionResult<T>, fragment: &str) {
    assert_kind(result, ErrorKind::NotFound, Some(fragment));
}

/// Assert that a result is a validation error with a message containing `fragment`.
pub fn assert_validation<T: Debug>(result: &VersionResult<T>, fragment: &str) {
    assert_kind(result, ErrorKind::Validation, Some(fragment));
}

/// Assert that a result is an authorization failure.
pub fn assert_not_authorized<T: Debug>(result: &VersionResult<T>) {
    assert_kind(result, ErrorKind::NotAuthorized, None);
}

/// Assert that a rendered diff contains every expected line.
pub fn assert_diff_lines(diff: &str, expected: &[&str]) {
    for line in expected {
        assert!(
            diff.lines().any(|l| l == *line),
            "Diff does not contain line: {line}\nActual diff:\n{diff}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsversion_core::VersionError;

    #[test]
    fn test_assert_kinds() {
        let result: VersionResult<()> = Err(VersionError::not_found("Version not found"));
        assert_not_found(&result);
        assert_not_found_with(&result, "Version");

        let result: VersionResult<()> = Err(VersionError::validation("Missing value: name"));
        assert_validation(&result, "name");
    }

    #[test]
    #[should_panic(expected = "Expected NotFound error")]
    fn test_assert_not_found_panics_on_ok() {
        let result: VersionResult<u32> = Ok(1);
        assert_not_found(&result);
    }

    #[test]
    fn test_assert_diff_lines() {
        assert_diff_lines("--- a\n+++ b\n-x\n+y\n", &["-x", "+y"]);
    }
}
