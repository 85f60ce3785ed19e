//! Snapshot reconstruction.
//!
//! Rebuilds datasets and resources as they were at a version's bound
//! activity, wrapping the host's plain lookups.

use crate::context::ActionContext;
use crate::error::{VersionError, VersionResult};
use crate::helpers::{download_url, is_upload};
use crate::host::{Dict, HostAction};
use crate::versions::{OwnerRef, VersionService};
use dsversion_storage::Version;
use dsversion_util::TimingGuard;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Field holding the version record on a reconstructed dict.
pub const VERSION_METADATA: &str = "version_metadata";

/// Reconstructs historical datasets and resources.
#[derive(Clone)]
pub struct SnapshotService {
    versions: VersionService,
}

impl SnapshotService {
    pub fn new(versions: VersionService) -> Self {
        Self { versions }
    }

    pub fn versions(&self) -> &VersionService {
        &self.versions
    }

    /// A dataset now (with its `versions` listed) or at a version.
    pub async fn package_at(
        &self,
        ctx: &ActionContext,
        dataset_ref: &str,
        version_ref: Option<&str>,
    ) -> VersionResult<Dict> {
        let _timing = TimingGuard::action("package_show");
        let owner_ref = OwnerRef::dataset(dataset_ref);

        match version_ref {
            None => {
                let mut package = self.current_package(ctx, dataset_ref).await?;
                let versions = self.versions.list(ctx, &owner_ref).await?;
                package.insert("versions".to_string(), to_value(&versions)?);
                Ok(package)
            }
            Some(version_ref) => {
                let version = self
                    .versions
                    .show(ctx, version_ref, Some(&owner_ref))
                    .await?;
                let mut package = self.historical_package(&version).await?;
                package.insert(VERSION_METADATA.to_string(), to_value(&version)?);
                Ok(package)
            }
        }
    }

    /// A resource now (with its `versions` listed) or at a version.
    ///
    /// Historical uploads get a download URL pointing at the versioned copy.
    pub async fn resource_at(
        &self,
        ctx: &ActionContext,
        resource_id: &str,
        version_ref: Option<&str>,
    ) -> VersionResult<Dict> {
        let _timing = TimingGuard::action("resource_show");
        let owner_ref = OwnerRef::resource(resource_id);

        match version_ref {
            None => {
                let owner = self.versions.resolve_owner(&owner_ref).await?;
                let versions = self.versions.list(ctx, &owner_ref).await?;
                let mut resource = owner.resource.unwrap_or_default();
                resource.insert("versions".to_string(), to_value(&versions)?);
                Ok(resource)
            }
            Some(version_ref) => {
                let version = self
                    .versions
                    .show(ctx, version_ref, Some(&owner_ref))
                    .await?;
                let mut resource = self
                    .activity_resource_show(&version.activity_id, resource_id)
                    .await?;

                if is_upload(&resource) {
                    if let Some(url) = resource.get("url").and_then(Value::as_str) {
                        let rewritten =
                            download_url(self.versions.config().site_url(), url, &version.id);
                        resource.insert("url".to_string(), Value::String(rewritten));
                    }
                }
                resource.insert(VERSION_METADATA.to_string(), to_value(&version)?);
                Ok(resource)
            }
        }
    }

    /// One resource from an activity's dataset snapshot.
    pub async fn activity_resource_show(
        &self,
        activity_id: &str,
        resource_id: &str,
    ) -> VersionResult<Dict> {
        let activity = self.versions.resolver().resolve(activity_id).await?;
        activity
            .resource(resource_id)
            .cloned()
            .ok_or_else(|| VersionError::not_found("Resource not found in the activity object."))
    }

    /// The dataset snapshot carried by an activity.
    pub async fn activity_package_show(
        &self,
        activity_id: &str,
        dataset_id: &str,
    ) -> VersionResult<Dict> {
        let activity = self.versions.resolver().resolve(activity_id).await?;
        let package = activity
            .package()
            .filter(|p| {
                let id = p.get("id").and_then(Value::as_str);
                let name = p.get("name").and_then(Value::as_str);
                id == Some(dataset_id) || name == Some(dataset_id)
            })
            .ok_or_else(|| VersionError::not_found("Dataset not found in the activity object."))?;
        Ok(package.clone())
    }

    /// The live dataset, with license display fields filled in.
    pub async fn current_package(
        &self,
        ctx: &ActionContext,
        dataset_ref: &str,
    ) -> VersionResult<Dict> {
        let owner = self
            .versions
            .resolve_owner(&OwnerRef::dataset(dataset_ref))
            .await?;
        self.versions
            .authorize(ctx, HostAction::PackageShow, &owner.package_id)
            .await?;
        let mut package = owner.package;
        self.backfill_license(&mut package);
        Ok(package)
    }

    /// The dataset snapshot bound to a version, with license display fields
    /// filled in. No `version_metadata` is attached.
    pub async fn historical_package(&self, version: &Version) -> VersionResult<Dict> {
        let mut package = self
            .activity_package_show(&version.activity_id, &version.package_id)
            .await?;
        self.backfill_license(&mut package);
        Ok(package)
    }

    /// Attach each resource's latest version name and a link to it.
    pub async fn annotate_current_versions(
        &self,
        ctx: &ActionContext,
        resources: Vec<Dict>,
    ) -> VersionResult<Vec<Dict>> {
        let site_url = self.versions.config().site_url().to_string();
        let mut annotated = Vec::with_capacity(resources.len());

        for mut resource in resources {
            let resource_id = resource.get("id").and_then(Value::as_str).map(str::to_string);
            if let Some(resource_id) = resource_id {
                let latest = self
                    .versions
                    .list(ctx, &OwnerRef::resource(resource_id.clone()))
                    .await?
                    .into_iter()
                    .next();
                if let Some(latest) = latest {
                    resource.insert("version".to_string(), Value::String(latest.name));
                    resource.insert(
                        "version_url".to_string(),
                        Value::String(format!(
                            "{}/dataset/{}/resource/{}?activity_id={}",
                            site_url, latest.package_id, resource_id, latest.activity_id
                        )),
                    );
                }
            }
            annotated.push(resource);
        }
        Ok(annotated)
    }

    /// Refresh license title and URL from the live license registry.
    ///
    /// Snapshots keep only `license_id`; display fields may be stale or absent.
    pub fn backfill_license(&self, package: &mut Dict) {
        let Some(license_id) = package
            .get("license_id")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return;
        };

        match self.versions.host().licenses.license(&license_id) {
            Some(license) => {
                package.insert("license_title".to_string(), Value::String(license.title));
                match license.url {
                    Some(url) => {
                        package.insert("license_url".to_string(), Value::String(url));
                    }
                    None => {
                        package.remove("license_url");
                    }
                }
            }
            None => debug!(license_id, "License not registered"),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> VersionResult<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VersionsConfig;
    use crate::host::{Host, License, MemoryHost};
    use crate::versions::CreateVersion;
    use dsversion_storage::MemoryVersionStore;
    use serde_json::json;
    use std::sync::Arc;

    fn dict(value: Value) -> Dict {
        value.as_object().cloned().unwrap_or_default()
    }

    fn service(host: Arc<MemoryHost>) -> SnapshotService {
        SnapshotService::new(VersionService::new(
            Host::from_shared(host),
            Arc::new(MemoryVersionStore::new()),
            Arc::new(VersionsConfig::default()),
        ))
    }

    #[tokio::test]
    async fn test_activity_package_show_checks_dataset() {
        let host = Arc::new(MemoryHost::new());
        let package = host
            .package_create(dict(json!({"name": "roads"})), None)
            .unwrap();
        let package_id = package["id"].as_str().unwrap();
        let snapshots = service(host);
        let activity = snapshots
            .versions()
            .resolver()
            .latest_activity_for(package_id)
            .await
            .unwrap();

        let shown = snapshots
            .activity_package_show(&activity, "roads")
            .await
            .unwrap();
        assert_eq!(shown["id"], json!(package_id));

        let err = snapshots
            .activity_package_show(&activity, "rivers")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Dataset not found in the activity object.");
    }

    #[tokio::test]
    async fn test_license_backfilled_on_history() {
        let host = Arc::new(MemoryHost::new());
        host.add_license(License {
            id: "odc-by".to_string(),
            title: "Open Data Commons Attribution License".to_string(),
            url: Some("http://www.opendefinition.org/licenses/odc-by".to_string()),
        })
        .unwrap();
        host.package_create(
            dict(json!({"name": "roads", "license_id": "odc-by", "license_title": "stale"})),
            None,
        )
        .unwrap();

        let snapshots = service(host);
        let ctx = ActionContext::system();
        let version = snapshots
            .versions()
            .create(&ctx, CreateVersion::new(OwnerRef::dataset("roads"), "v1"))
            .await
            .unwrap();

        let package = snapshots
            .package_at(&ctx, "roads", Some("v1"))
            .await
            .unwrap();
        assert_eq!(
            package["license_title"],
            json!("Open Data Commons Attribution License")
        );
        assert_eq!(package[VERSION_METADATA]["id"], json!(version.id));
    }

    #[tokio::test]
    async fn test_resource_at_rewrites_upload_url() {
        let host = Arc::new(MemoryHost::new());
        let package = host
            .package_create(dict(json!({"name": "roads"})), None)
            .unwrap();
        let package_id = package["id"].as_str().unwrap().to_string();
        let upload = host
            .resource_create(
                &package_id,
                dict(json!({
                    "url_type": "upload",
                    "url": format!("http://localhost:5000/dataset/{package_id}/resource/r1/download/roads.csv"),
                })),
                None,
            )
            .unwrap();
        let link = host
            .resource_create(
                &package_id,
                dict(json!({"url_type": "", "url": "https://example.com/download/roads.csv"})),
                None,
            )
            .unwrap();

        let snapshots = service(host);
        let ctx = ActionContext::system();
        for resource in [&upload, &link] {
            let id = resource["id"].as_str().unwrap();
            snapshots
                .versions()
                .create(&ctx, CreateVersion::new(OwnerRef::resource(id), "1"))
                .await
                .unwrap();
        }

        let upload_id = upload["id"].as_str().unwrap();
        let shown = snapshots
            .resource_at(&ctx, upload_id, Some("1"))
            .await
            .unwrap();
        let version_id = shown[VERSION_METADATA]["id"].as_str().unwrap();
        assert_eq!(
            shown["url"],
            json!(format!(
                "http://localhost:5000/dataset/{package_id}/resource/r1/version/{version_id}/download/roads.csv"
            ))
        );

        let link_id = link["id"].as_str().unwrap();
        let shown = snapshots.resource_at(&ctx, link_id, Some("1")).await.unwrap();
        assert_eq!(shown["url"], json!("https://example.com/download/roads.csv"));

        let live = snapshots.resource_at(&ctx, link_id, None).await.unwrap();
        assert_eq!(live["versions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_activity_resource_show_missing_resource() {
        let host = Arc::new(MemoryHost::new());
        let package = host
            .package_create(dict(json!({"name": "roads"})), None)
            .unwrap();
        let snapshots = service(host);
        let activity = snapshots
            .versions()
            .resolver()
            .latest_activity_for(package["id"].as_str().unwrap())
            .await
            .unwrap();

        let err = snapshots
            .activity_resource_show(&activity, "res_missing")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Resource not found in the activity object.");
    }
}
