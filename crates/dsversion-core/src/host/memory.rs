//! In-memory host catalog.
//!
//! Every write appends an activity carrying a full copy of the dataset, the
//! same way a real catalog's audit log does. Authorization follows
//! organization capacities: sysadmins may do anything, organization admins
//! and editors may update, members may view private datasets, and anyone may
//! view public ones.

use super::{
    Activity, ActivityLog, Authorizer, DatasetRegistry, Dict, HostAction, HostError, HostResult,
    License, LicenseRegistry, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dsversion_util::Identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// A user's role within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capacity {
    Admin,
    Editor,
    Member,
}

impl Capacity {
    fn can_update(&self) -> bool {
        matches!(self, Capacity::Admin | Capacity::Editor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Organization {
    id: String,
    name: String,
    /// User id to capacity.
    #[serde(default)]
    members: BTreeMap<String, Capacity>,
}

/// Serialized form of a whole catalog.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    organizations: Vec<Organization>,
    #[serde(default)]
    licenses: Vec<License>,
    #[serde(default)]
    datasets: Vec<Dict>,
    #[serde(default)]
    activities: Vec<Activity>,
}

/// An in-memory implementation of every host collaborator.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: RwLock<Catalog>,
}

impl MemoryHost {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a host from a catalog document.
    ///
    /// Datasets that have no recorded activity get a `new package` activity.
    pub fn from_catalog_json(content: &str) -> HostResult<Self> {
        let mut catalog: Catalog = serde_json::from_str(content)
            .map_err(|e| HostError::Rejected(format!("Invalid catalog: {e}")))?;

        let datasets = std::mem::take(&mut catalog.datasets);
        for mut package in datasets {
            let package_id = match package.get("id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    let id = Identifier::package();
                    package.insert("id".to_string(), Value::String(id.clone()));
                    id
                }
            };
            normalize_resources(&mut package, &package_id)?;

            let recorded = catalog.activities.iter().any(|a| a.object_id == package_id);
            let creator = string_field(&package, "creator_user_id");
            catalog.datasets.push(package.clone());
            if !recorded {
                record_activity(&mut catalog, &package, creator.as_deref(), "new package");
            }
        }

        Ok(Self {
            state: RwLock::new(catalog),
        })
    }

    /// Load a catalog file.
    pub async fn load(path: &Path) -> HostResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HostError::Unavailable(format!("{}: {e}", path.display())))?;
        let host = Self::from_catalog_json(&content)?;
        info!(path = %path.display(), "Loaded catalog");
        Ok(host)
    }

    /// Serialize the whole catalog, activities included.
    pub fn to_catalog_json(&self) -> HostResult<String> {
        let state = self.read()?;
        serde_json::to_string_pretty(&*state)
            .map_err(|e| HostError::Unavailable(format!("Cannot serialize catalog: {e}")))
    }

    /// Write the catalog back to a file.
    pub async fn save(&self, path: &Path) -> HostResult<()> {
        let content = self.to_catalog_json()?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| HostError::Unavailable(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Saved catalog");
        Ok(())
    }

    /// Register a user.
    pub fn add_user(&self, name: &str, sysadmin: bool) -> HostResult<User> {
        let user = User {
            id: Identifier::user(),
            name: name.to_string(),
            sysadmin,
        };
        self.write()?.users.push(user.clone());
        Ok(user)
    }

    /// Register an organization, returning its id.
    pub fn add_organization(&self, name: &str) -> HostResult<String> {
        let id = format!("org_{name}");
        self.write()?.organizations.push(Organization {
            id: id.clone(),
            name: name.to_string(),
            members: BTreeMap::new(),
        });
        Ok(id)
    }

    /// Give a user a capacity in an organization.
    pub fn add_member(&self, org_id: &str, user_id: &str, capacity: Capacity) -> HostResult<()> {
        let mut state = self.write()?;
        let org = state
            .organizations
            .iter_mut()
            .find(|o| o.id == org_id || o.name == org_id)
            .ok_or_else(|| HostError::NotFound(org_id.to_string()))?;
        org.members.insert(user_id.to_string(), capacity);
        Ok(())
    }

    /// Register a license.
    pub fn add_license(&self, license: License) -> HostResult<()> {
        self.write()?.licenses.push(license);
        Ok(())
    }

    /// Create a dataset. `name` is required and unique.
    pub fn package_create(&self, mut package: Dict, user_id: Option<&str>) -> HostResult<Dict> {
        let mut state = self.write()?;

        let name = string_field(&package, "name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| HostError::Rejected("Missing value: name".to_string()))?;
        if find_package(&state, &name).is_some() {
            return Err(HostError::Rejected(format!(
                "That URL is already in use: {name}"
            )));
        }

        let id = string_field(&package, "id").unwrap_or_else(Identifier::package);
        let now = Utc::now().to_rfc3339();
        package.insert("id".to_string(), Value::String(id.clone()));
        package.entry("private").or_insert(Value::Bool(false));
        package.insert("metadata_created".to_string(), Value::String(now.clone()));
        package.insert("metadata_modified".to_string(), Value::String(now));
        if let Some(user_id) = user_id {
            package.insert(
                "creator_user_id".to_string(),
                Value::String(user_id.to_string()),
            );
        }
        normalize_resources(&mut package, &id)?;

        state.datasets.push(package.clone());
        record_activity(&mut state, &package, user_id, "new package");
        info!(package_id = %id, "Created dataset");
        Ok(package)
    }

    /// Overwrite the supplied top-level fields of a dataset.
    pub fn package_patch(
        &self,
        id_or_name: &str,
        patch: Dict,
        user_id: Option<&str>,
    ) -> HostResult<Dict> {
        let mut current = self
            .package(id_or_name)?
            .ok_or_else(|| HostError::NotFound(id_or_name.to_string()))?;
        for (key, value) in patch {
            if key != "id" {
                current.insert(key, value);
            }
        }
        let id = string_field(&current, "id").unwrap_or_default();
        self.replace(&id, current, user_id)
    }

    /// Append a resource to a dataset, returning the stored resource.
    pub fn resource_create(
        &self,
        package_id: &str,
        mut resource: Dict,
        user_id: Option<&str>,
    ) -> HostResult<Dict> {
        let mut package = self
            .package(package_id)?
            .ok_or_else(|| HostError::NotFound(package_id.to_string()))?;
        let id = string_field(&package, "id").unwrap_or_default();

        let resource_id = string_field(&resource, "id").unwrap_or_else(Identifier::resource);
        resource.insert("id".to_string(), Value::String(resource_id.clone()));
        resource.insert("package_id".to_string(), Value::String(id.clone()));

        if let Some(Value::Array(resources)) = package.get_mut("resources") {
            resources.push(Value::Object(resource.clone()));
        }
        self.replace(&id, package, user_id)?;
        Ok(resource)
    }

    /// Look up a dataset by id or name.
    pub fn package(&self, id_or_name: &str) -> HostResult<Option<Dict>> {
        let state = self.read()?;
        Ok(find_package(&state, id_or_name).cloned())
    }

    fn replace(&self, package_id: &str, mut package: Dict, user_id: Option<&str>) -> HostResult<Dict> {
        let mut state = self.write()?;
        let index = state
            .datasets
            .iter()
            .position(|p| p.get("id").and_then(Value::as_str) == Some(package_id))
            .ok_or_else(|| HostError::NotFound(package_id.to_string()))?;

        let previous = &state.datasets[index];
        package.insert("id".to_string(), Value::String(package_id.to_string()));
        for key in ["name", "creator_user_id", "metadata_created"] {
            if !package.contains_key(key) {
                if let Some(value) = previous.get(key) {
                    package.insert(key.to_string(), value.clone());
                }
            }
        }
        package.insert(
            "metadata_modified".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        normalize_resources(&mut package, package_id)?;

        state.datasets[index] = package.clone();
        record_activity(&mut state, &package, user_id, "changed package");
        debug!(package_id, "Updated dataset");
        Ok(package)
    }

    fn read(&self) -> HostResult<RwLockReadGuard<'_, Catalog>> {
        self.state
            .read()
            .map_err(|e| HostError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> HostResult<RwLockWriteGuard<'_, Catalog>> {
        self.state
            .write()
            .map_err(|e| HostError::Unavailable(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl DatasetRegistry for MemoryHost {
    async fn package_show(&self, id_or_name: &str) -> HostResult<Option<Dict>> {
        self.package(id_or_name)
    }

    async fn resource_show(&self, resource_id: &str) -> HostResult<Option<Dict>> {
        let state = self.read()?;
        let found = state
            .datasets
            .iter()
            .filter_map(|p| p.get("resources").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_object)
            .find(|r| r.get("id").and_then(Value::as_str) == Some(resource_id))
            .cloned();
        Ok(found)
    }

    async fn package_update(
        &self,
        package_id: &str,
        package: Dict,
        user_id: Option<&str>,
    ) -> HostResult<Dict> {
        self.replace(package_id, package, user_id)
    }

    async fn package_list(&self) -> HostResult<Vec<String>> {
        let state = self.read()?;
        Ok(state
            .datasets
            .iter()
            .filter_map(|p| string_field(p, "id"))
            .collect())
    }

    async fn user_show(&self, id_or_name: &str) -> HostResult<Option<User>> {
        let state = self.read()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.id == id_or_name || u.name == id_or_name)
            .cloned())
    }
}

#[async_trait]
impl ActivityLog for MemoryHost {
    async fn activities_for(&self, object_id: &str) -> HostResult<Vec<Activity>> {
        let state = self.read()?;
        Ok(state
            .activities
            .iter()
            .filter(|a| a.object_id == object_id)
            .cloned()
            .collect())
    }

    async fn activity_show(&self, activity_id: &str) -> HostResult<Option<Activity>> {
        let state = self.read()?;
        Ok(state.activities.iter().find(|a| a.id == activity_id).cloned())
    }
}

#[async_trait]
impl Authorizer for MemoryHost {
    async fn is_authorized(
        &self,
        user: Option<&User>,
        action: HostAction,
        package_id: &str,
    ) -> HostResult<bool> {
        let state = self.read()?;
        let Some(package) = find_package(&state, package_id) else {
            return Ok(false);
        };

        if user.is_some_and(|u| u.sysadmin) {
            return Ok(true);
        }

        let private = package
            .get("private")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if action == HostAction::PackageShow && !private {
            return Ok(true);
        }

        let Some(user) = user else {
            return Ok(false);
        };

        let capacity = string_field(package, "owner_org").and_then(|org_id| {
            state
                .organizations
                .iter()
                .find(|o| o.id == org_id || o.name == org_id)
                .and_then(|o| o.members.get(&user.id).copied())
        });

        let allowed = match (action, capacity) {
            (HostAction::PackageShow, Some(_)) => true,
            (HostAction::PackageUpdate, Some(capacity)) => capacity.can_update(),
            (HostAction::PackageUpdate, None) => {
                string_field(package, "owner_org").is_none()
                    && string_field(package, "creator_user_id").as_deref()
                        == Some(user.id.as_str())
            }
            (HostAction::PackageShow, None) => false,
        };
        Ok(allowed)
    }
}

impl LicenseRegistry for MemoryHost {
    fn license(&self, license_id: &str) -> Option<License> {
        let state = self.read().ok()?;
        state.licenses.iter().find(|l| l.id == license_id).cloned()
    }
}

fn find_package<'a>(state: &'a Catalog, id_or_name: &str) -> Option<&'a Dict> {
    state.datasets.iter().find(|p| {
        p.get("id").and_then(Value::as_str) == Some(id_or_name)
            || p.get("name").and_then(Value::as_str) == Some(id_or_name)
    })
}

fn string_field(dict: &Dict, key: &str) -> Option<String> {
    dict.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Give every resource an id and point it at its dataset.
fn normalize_resources(package: &mut Dict, package_id: &str) -> HostResult<()> {
    let resources = package
        .entry("resources")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(items) = resources else {
        return Err(HostError::Rejected("resources must be a list".to_string()));
    };

    for item in items.iter_mut() {
        let Value::Object(resource) = item else {
            return Err(HostError::Rejected("resources must be objects".to_string()));
        };
        if !resource.contains_key("id") {
            resource.insert("id".to_string(), Value::String(Identifier::resource()));
        }
        resource.insert(
            "package_id".to_string(),
            Value::String(package_id.to_string()),
        );
    }
    Ok(())
}

/// Append an activity. Timestamps strictly increase so the log has a total order.
fn record_activity(state: &mut Catalog, package: &Dict, user_id: Option<&str>, activity_type: &str) {
    let object_id = string_field(package, "id").unwrap_or_default();
    let timestamp = next_timestamp(state.activities.last().map(|a| a.timestamp));

    let mut data = Dict::new();
    data.insert("package".to_string(), Value::Object(package.clone()));

    state.activities.push(Activity {
        id: Identifier::activity(),
        object_id,
        user_id: user_id.map(str::to_string),
        activity_type: activity_type.to_string(),
        timestamp,
        data,
    });
}

fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if last >= now => last + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dict(value: Value) -> Dict {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_every_write_records_a_snapshot() {
        let host = MemoryHost::new();
        let created = host
            .package_create(dict(json!({"name": "roads", "notes": "v1"})), None)
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        host.package_patch("roads", dict(json!({"notes": "v2"})), None)
            .unwrap();

        let activities = host.activities_for(&id).await.unwrap();
        assert_eq!(activities.len(), 2);
        assert!(activities[0].timestamp < activities[1].timestamp);
        assert_eq!(activities[0].package().unwrap()["notes"], json!("v1"));
        assert_eq!(activities[1].package().unwrap()["notes"], json!("v2"));
    }

    #[tokio::test]
    async fn test_resource_create_sets_ids() {
        let host = MemoryHost::new();
        let package = host
            .package_create(dict(json!({"name": "roads"})), None)
            .unwrap();
        let package_id = package["id"].as_str().unwrap();

        let resource = host
            .resource_create(package_id, dict(json!({"name": "roads.csv"})), None)
            .unwrap();
        let resource_id = resource["id"].as_str().unwrap();
        assert!(resource_id.starts_with("res_"));

        let shown = host.resource_show(resource_id).await.unwrap().unwrap();
        assert_eq!(shown["package_id"], json!(package_id));
    }

    #[tokio::test]
    async fn test_duplicate_dataset_name_rejected() {
        let host = MemoryHost::new();
        host.package_create(dict(json!({"name": "roads"})), None)
            .unwrap();
        let err = host
            .package_create(dict(json!({"name": "roads"})), None)
            .unwrap_err();
        assert!(matches!(err, HostError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_authorization_by_capacity() {
        let host = MemoryHost::new();
        let org = host.add_organization("transport").unwrap();
        let admin = host.add_user("admin", false).unwrap();
        let editor = host.add_user("editor", false).unwrap();
        let member = host.add_user("member", false).unwrap();
        let outsider = host.add_user("outsider", false).unwrap();
        let sysadmin = host.add_user("root", true).unwrap();
        host.add_member(&org, &admin.id, Capacity::Admin).unwrap();
        host.add_member(&org, &editor.id, Capacity::Editor).unwrap();
        host.add_member(&org, &member.id, Capacity::Member).unwrap();

        let package = host
            .package_create(
                dict(json!({"name": "secret", "owner_org": org, "private": true})),
                Some(admin.id.as_str()),
            )
            .unwrap();
        let id = package["id"].as_str().unwrap();

        let update = HostAction::PackageUpdate;
        let show = HostAction::PackageShow;
        assert!(host.is_authorized(Some(&admin), update, id).await.unwrap());
        assert!(host.is_authorized(Some(&editor), update, id).await.unwrap());
        assert!(!host.is_authorized(Some(&member), update, id).await.unwrap());
        assert!(host.is_authorized(Some(&member), show, id).await.unwrap());
        assert!(!host.is_authorized(Some(&outsider), show, id).await.unwrap());
        assert!(!host.is_authorized(None, show, id).await.unwrap());
        assert!(host.is_authorized(Some(&sysadmin), update, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_public_datasets_are_visible_to_anyone() {
        let host = MemoryHost::new();
        let package = host
            .package_create(dict(json!({"name": "open"})), None)
            .unwrap();
        let id = package["id"].as_str().unwrap();

        assert!(host
            .is_authorized(None, HostAction::PackageShow, id)
            .await
            .unwrap());
        assert!(!host
            .is_authorized(None, HostAction::PackageUpdate, id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_catalog_round_trip_keeps_activities() {
        let catalog = r#"{
            "users": [{"id": "usr_alice", "name": "alice"}],
            "licenses": [{"id": "odc-by", "title": "Open Data Commons Attribution License"}],
            "datasets": [{"id": "pkg_roads", "name": "roads", "creator_user_id": "usr_alice",
                          "resources": [{"id": "res_a", "url_type": "upload"}]}]
        }"#;
        let host = MemoryHost::from_catalog_json(catalog).unwrap();
        let first = host.activities_for("pkg_roads").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].user_id.as_deref(), Some("usr_alice"));

        let reloaded = MemoryHost::from_catalog_json(&host.to_catalog_json().unwrap()).unwrap();
        let second = reloaded.activities_for("pkg_roads").await.unwrap();
        assert_eq!(first, second);
        assert!(reloaded.license("odc-by").is_some());
        assert_eq!(
            reloaded.user_show("alice").await.unwrap().unwrap().id,
            "usr_alice"
        );
    }
}
