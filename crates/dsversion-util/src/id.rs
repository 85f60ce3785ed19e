//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in dsversion follow the pattern: `prefix_ulid`
//! For example: `ver_01hqxyz...` for versions.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Version,
    Activity,
    Package,
    Resource,
    User,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Version => "ver",
            IdPrefix::Activity => "act",
            IdPrefix::Package => "pkg",
            IdPrefix::Resource => "res",
            IdPrefix::User => "usr",
        }
    }
}

/// Identifier generation.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        let ulid = Ulid::new();
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Generate a version ID.
    pub fn version() -> String {
        Self::ascending(IdPrefix::Version)
    }

    /// Generate an activity ID.
    pub fn activity() -> String {
        Self::ascending(IdPrefix::Activity)
    }

    /// Generate a package ID.
    pub fn package() -> String {
        Self::ascending(IdPrefix::Package)
    }

    /// Generate a resource ID.
    pub fn resource() -> String {
        Self::ascending(IdPrefix::Resource)
    }

    /// Generate a user ID.
    pub fn user() -> String {
        Self::ascending(IdPrefix::User)
    }
}
