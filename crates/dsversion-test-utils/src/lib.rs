//! Testing utilities and fixtures for dsversion.
//!
//! - **Fixtures**: a seeded in-memory catalog with versioning attached, and
//!   catalog files for driving the CLI
//! - **Assertions**: helpers that check versioning error kinds
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use dsversion_core::{CreateVersion, OwnerRef};
//! use dsversion_test_utils::{assertions::assert_not_found, fixtures::TestCatalog};
//!
//! #[tokio::test]
//! async fn test_latest_without_versions() {
//!     let catalog = TestCatalog::new();
//!     let owner = OwnerRef::dataset("roads");
//!     let result = catalog.versioning.versions.latest(&catalog.editor_ctx(), &owner).await;
//!     assert_not_found(&result);
//! }
//! ```

pub mod assertions;
pub mod fixtures;

pub use fixtures::{CatalogFile, TestCatalog};
