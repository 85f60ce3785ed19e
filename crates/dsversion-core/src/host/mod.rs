//! Collaborators supplied by the host catalog platform.
//!
//! The versioning services never own datasets, activities, permissions or
//! licenses. They reach them through the traits below, bundled into a
//! [`Host`]. [`MemoryHost`] implements all of them for tests, the CLI and
//! embedding.

mod memory;

pub use memory::{Capacity, MemoryHost};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// A dataset or resource as the host serializes it.
pub type Dict = Map<String, Value>;

/// Result type for host calls.
pub type HostResult<T> = Result<T, HostError>;

/// Failures reported by a host collaborator.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Host object not found: {0}")]
    NotFound(String),

    #[error("Host rejected the change: {0}")]
    Rejected(String),

    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

/// A catalog user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sysadmin: bool,
}

/// An immutable entry of the host's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    /// The dataset this activity was recorded against.
    pub object_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub activity_type: String,
    pub timestamp: DateTime<Utc>,
    /// Serialized payload; dataset activities carry the full dataset under
    /// `package`.
    #[serde(default)]
    pub data: Dict,
}

impl Activity {
    /// The dataset snapshot carried by this activity.
    pub fn package(&self) -> Option<&Dict> {
        self.data.get("package").and_then(Value::as_object)
    }

    /// One resource from the dataset snapshot.
    pub fn resource(&self, resource_id: &str) -> Option<&Dict> {
        self.package()
            .and_then(|package| package.get("resources"))
            .and_then(Value::as_array)?
            .iter()
            .filter_map(Value::as_object)
            .find(|resource| resource.get("id").and_then(Value::as_str) == Some(resource_id))
    }
}

/// Descriptive license metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Actions the authorization oracle is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    PackageShow,
    PackageUpdate,
}

impl HostAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostAction::PackageShow => "package_show",
            HostAction::PackageUpdate => "package_update",
        }
    }
}

/// Dataset and resource lookup plus the update primitive.
#[async_trait]
pub trait DatasetRegistry: Send + Sync {
    /// Look up a dataset by id or name.
    async fn package_show(&self, id_or_name: &str) -> HostResult<Option<Dict>>;

    /// Look up a resource by id. The dict carries its `package_id`.
    async fn resource_show(&self, resource_id: &str) -> HostResult<Option<Dict>>;

    /// Replace the dataset's fields, recording a new activity.
    async fn package_update(
        &self,
        package_id: &str,
        package: Dict,
        user_id: Option<&str>,
    ) -> HostResult<Dict>;

    /// Ids of all datasets.
    async fn package_list(&self) -> HostResult<Vec<String>>;

    /// Look up a user by id or name.
    async fn user_show(&self, id_or_name: &str) -> HostResult<Option<User>>;
}

/// The host's append-only activity log.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// All activities recorded against an object, in any order.
    async fn activities_for(&self, object_id: &str) -> HostResult<Vec<Activity>>;

    /// Fetch one activity.
    async fn activity_show(&self, activity_id: &str) -> HostResult<Option<Activity>>;
}

/// Boolean capability checks.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(
        &self,
        user: Option<&User>,
        action: HostAction,
        package_id: &str,
    ) -> HostResult<bool>;
}

/// Lookup of license display metadata.
pub trait LicenseRegistry: Send + Sync {
    fn license(&self, license_id: &str) -> Option<License>;
}

/// The set of collaborators the services run against.
#[derive(Clone)]
pub struct Host {
    pub registry: Arc<dyn DatasetRegistry>,
    pub activities: Arc<dyn ActivityLog>,
    pub authorizer: Arc<dyn Authorizer>,
    pub licenses: Arc<dyn LicenseRegistry>,
}

impl Host {
    /// Use one value for every collaborator.
    pub fn from_shared<H>(host: Arc<H>) -> Self
    where
        H: DatasetRegistry + ActivityLog + Authorizer + LicenseRegistry + 'static,
    {
        Self {
            registry: host.clone(),
            activities: host.clone(),
            authorizer: host.clone(),
            licenses: host,
        }
    }
}
