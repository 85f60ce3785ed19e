//! Version binding.
//!
//! Creates, lists, updates and deletes version records, checking them
//! against the host's datasets and activity log before they reach the
//! store. Uniqueness is guaranteed by the store; the checks here only give
//! a friendlier error first.

use crate::activity::ActivityResolver;
use crate::config::VersionsConfig;
use crate::context::ActionContext;
use crate::error::{VersionError, VersionResult};
use crate::host::{Dict, Host, HostAction, User};
use dsversion_storage::{NewVersion, Version, VersionChanges, VersionScope, VersionStore};
use dsversion_util::TimingGuard;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Reference to the dataset or resource that owns versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerRef {
    /// Dataset id or name.
    Dataset(String),
    /// Resource id.
    Resource(String),
}

impl OwnerRef {
    pub fn dataset(id_or_name: impl Into<String>) -> Self {
        Self::Dataset(id_or_name.into())
    }

    pub fn resource(id: impl Into<String>) -> Self {
        Self::Resource(id.into())
    }

    fn label(&self) -> &'static str {
        match self {
            OwnerRef::Dataset(_) => "dataset",
            OwnerRef::Resource(_) => "resource",
        }
    }
}

/// A resolved owner with its current host state.
#[derive(Debug, Clone)]
pub struct Owner {
    pub package_id: String,
    pub package: Dict,
    pub resource_id: Option<String>,
    pub resource: Option<Dict>,
}

impl Owner {
    pub fn scope(&self) -> VersionScope {
        VersionScope {
            package_id: self.package_id.clone(),
            resource_id: self.resource_id.clone(),
        }
    }

    /// Whether `version` belongs to this owner.
    ///
    /// A resource owner also accepts dataset-level versions of its dataset,
    /// since those snapshots contain the resource too.
    pub fn owns(&self, version: &Version) -> bool {
        version.package_id == self.package_id
            && (version.resource_id.is_none() || version.resource_id == self.resource_id)
    }
}

/// Parameters of [`VersionService::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVersion {
    pub owner: OwnerRef,
    pub name: Option<String>,
    pub notes: Option<String>,
    /// Bind to this activity instead of the latest one.
    pub activity_id: Option<String>,
    /// Credit this user instead of the acting user.
    pub creator_user_id: Option<String>,
}

impl CreateVersion {
    pub fn new(owner: OwnerRef, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: Some(name.into()),
            notes: None,
            activity_id: None,
            creator_user_id: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_activity(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    pub fn with_creator(mut self, user_id: impl Into<String>) -> Self {
        self.creator_user_id = Some(user_id.into());
        self
    }
}

/// Partial changes for [`VersionService::patch`]. Only `Some` fields are
/// written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionPatch {
    pub name: Option<String>,
    pub notes: Option<String>,
}

/// Creates and manages version records.
#[derive(Clone)]
pub struct VersionService {
    host: Host,
    store: Arc<dyn VersionStore>,
    resolver: ActivityResolver,
    config: Arc<VersionsConfig>,
}

impl VersionService {
    pub fn new(host: Host, store: Arc<dyn VersionStore>, config: Arc<VersionsConfig>) -> Self {
        let resolver = ActivityResolver::new(host.activities.clone());
        Self {
            host,
            store,
            resolver,
            config,
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn resolver(&self) -> &ActivityResolver {
        &self.resolver
    }

    pub fn config(&self) -> &VersionsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    /// Create a version bound to an activity of its owner.
    pub async fn create(&self, ctx: &ActionContext, req: CreateVersion) -> VersionResult<Version> {
        let _timing = TimingGuard::action("version_create");

        let owner = self.resolve_owner(&req.owner).await?;
        let acting = self
            .authorize(ctx, HostAction::PackageUpdate, &owner.package_id)
            .await?;

        let name = req
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| VersionError::validation("Missing value: name"))?
            .to_string();

        let activity_id = match &req.activity_id {
            Some(id) => {
                self.resolver
                    .resolve_for_package(id, &owner.package_id)
                    .await?
                    .id
            }
            None => self.resolver.latest_activity_for(&owner.package_id).await?,
        };

        match &owner.resource_id {
            Some(resource_id) => {
                if !self
                    .resolver
                    .contains_resource(&activity_id, resource_id)
                    .await
                {
                    return Err(VersionError::not_found(
                        "Resource not found in the activity object.",
                    ));
                }
            }
            None => {
                let bound = self
                    .store
                    .find_by_activity(&owner.package_id, &activity_id)
                    .await?;
                if bound.iter().any(Version::is_dataset_level) {
                    return Err(VersionError::validation(
                        "Version already exists for this activity",
                    ));
                }
            }
        }

        let creator_user_id = self
            .creator_for(req.creator_user_id.as_deref(), acting.as_ref())
            .await?;

        let version = self
            .store
            .insert(NewVersion {
                package_id: owner.package_id.clone(),
                resource_id: owner.resource_id.clone(),
                activity_id,
                name,
                notes: req.notes,
                creator_user_id,
            })
            .await?;

        info!(
            version_id = %version.id,
            scope = %version.scope(),
            name = %version.name,
            activity_id = %version.activity_id,
            "Created version"
        );
        Ok(version)
    }

    /// All versions of an owner, newest first.
    pub async fn list(&self, ctx: &ActionContext, owner: &OwnerRef) -> VersionResult<Vec<Version>> {
        let _timing = TimingGuard::action("version_list");
        let owner = self.resolve_owner(owner).await?;
        self.authorize(ctx, HostAction::PackageShow, &owner.package_id)
            .await?;
        Ok(self.store.list(&owner.scope()).await?)
    }

    /// The newest version of an owner.
    pub async fn latest(&self, ctx: &ActionContext, owner: &OwnerRef) -> VersionResult<Version> {
        self.list(ctx, owner).await?.into_iter().next().ok_or_else(|| {
            VersionError::not_found(format!("Versions not found for this {}", owner.label()))
        })
    }

    /// Whether an owner has any versions.
    pub async fn has_versions(&self, ctx: &ActionContext, owner: &OwnerRef) -> VersionResult<bool> {
        Ok(!self.list(ctx, owner).await?.is_empty())
    }

    /// Fetch a version by id, or by name within `owner`'s scope.
    pub async fn show(
        &self,
        ctx: &ActionContext,
        version_ref: &str,
        owner: Option<&OwnerRef>,
    ) -> VersionResult<Version> {
        let _timing = TimingGuard::action("version_show");
        let owner = match owner {
            Some(owner) => Some(self.resolve_owner(owner).await?),
            None => None,
        };

        let version = self
            .lookup(version_ref, owner.as_ref())
            .await?
            .filter(|v| owner.as_ref().map_or(true, |o| o.owns(v)))
            .ok_or_else(|| VersionError::not_found("Version not found"))?;

        self.authorize(ctx, HostAction::PackageShow, &version.package_id)
            .await?;
        Ok(version)
    }

    /// Replace every mutable field.
    pub async fn update(
        &self,
        ctx: &ActionContext,
        version_id: &str,
        name: &str,
        notes: Option<String>,
    ) -> VersionResult<Version> {
        let _timing = TimingGuard::action("version_update");
        let current = self.get(version_id).await?;
        self.authorize(ctx, HostAction::PackageUpdate, &current.package_id)
            .await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(VersionError::validation("Missing value: name"));
        }

        self.commit_changes(
            &current,
            VersionChanges {
                name: name.to_string(),
                notes,
            },
        )
        .await
    }

    /// Overwrite only the supplied fields.
    pub async fn patch(
        &self,
        ctx: &ActionContext,
        version_id: &str,
        patch: VersionPatch,
    ) -> VersionResult<Version> {
        let _timing = TimingGuard::action("version_patch");
        let current = self.get(version_id).await?;
        self.authorize(ctx, HostAction::PackageUpdate, &current.package_id)
            .await?;

        let name = match patch.name {
            Some(name) if name.trim().is_empty() => {
                return Err(VersionError::validation("Missing value: name"))
            }
            Some(name) => name.trim().to_string(),
            None => current.name.clone(),
        };

        self.commit_changes(
            &current,
            VersionChanges {
                name,
                notes: patch.notes.or_else(|| current.notes.clone()),
            },
        )
        .await
    }

    /// Delete one version record. The bound activity is untouched.
    pub async fn delete(&self, ctx: &ActionContext, version_id: &str) -> VersionResult<Version> {
        let _timing = TimingGuard::action("version_delete");
        let current = self.get(version_id).await?;
        self.authorize(ctx, HostAction::PackageUpdate, &current.package_id)
            .await?;

        let deleted = self.store.delete(&current.id).await?;
        info!(version_id = %deleted.id, scope = %deleted.scope(), "Deleted version");
        Ok(deleted)
    }

    /// Delete every version of a resource.
    pub async fn clear(&self, ctx: &ActionContext, resource_id: &str) -> VersionResult<usize> {
        let _timing = TimingGuard::action("version_clear");
        let owner = self
            .resolve_owner(&OwnerRef::resource(resource_id))
            .await?;
        self.authorize(ctx, HostAction::PackageUpdate, &owner.package_id)
            .await?;

        let removed = self.store.clear(&owner.scope()).await?;
        if removed == 0 {
            return Err(VersionError::not_found(
                "No versions found for this resource",
            ));
        }
        info!(scope = %owner.scope(), removed, "Cleared versions");
        Ok(removed)
    }

    /// The activity a version is bound to.
    pub async fn activity_id_for_version(
        &self,
        ctx: &ActionContext,
        owner: &OwnerRef,
        version_ref: &str,
    ) -> VersionResult<String> {
        Ok(self.show(ctx, version_ref, Some(owner)).await?.activity_id)
    }

    /// Look up a dataset or resource on the host.
    pub async fn resolve_owner(&self, owner: &OwnerRef) -> VersionResult<Owner> {
        match owner {
            OwnerRef::Dataset(id_or_name) => {
                let package = self
                    .host
                    .registry
                    .package_show(id_or_name)
                    .await?
                    .ok_or_else(|| VersionError::not_found("Dataset not found"))?;
                let package_id = string_field(&package, "id")
                    .ok_or_else(|| VersionError::not_found("Dataset not found"))?;
                Ok(Owner {
                    package_id,
                    package,
                    resource_id: None,
                    resource: None,
                })
            }
            OwnerRef::Resource(resource_id) => {
                let resource = self
                    .host
                    .registry
                    .resource_show(resource_id)
                    .await?
                    .ok_or_else(|| VersionError::not_found("Resource not found"))?;
                let package_id = string_field(&resource, "package_id")
                    .ok_or_else(|| VersionError::not_found("Dataset not found"))?;
                let package = self
                    .host
                    .registry
                    .package_show(&package_id)
                    .await?
                    .ok_or_else(|| VersionError::not_found("Dataset not found"))?;
                Ok(Owner {
                    package_id,
                    package,
                    resource_id: string_field(&resource, "id"),
                    resource: Some(resource),
                })
            }
        }
    }

    /// Find a version by id, then by name in the owner's scope.
    ///
    /// A resource owner falls back to dataset-level names of its dataset, so
    /// names resolve to the same versions [`Owner::owns`] accepts by id.
    /// Ownership is not checked; callers decide how a foreign version fails.
    pub(crate) async fn lookup(
        &self,
        version_ref: &str,
        owner: Option<&Owner>,
    ) -> VersionResult<Option<Version>> {
        if let Some(version) = self.store.get(version_ref).await? {
            return Ok(Some(version));
        }
        let Some(owner) = owner else {
            return Ok(None);
        };

        debug!(version_ref, scope = %owner.scope(), "Looking up version by name");
        if let Some(version) = self.store.find_by_name(&owner.scope(), version_ref).await? {
            return Ok(Some(version));
        }
        if owner.resource_id.is_none() {
            return Ok(None);
        }
        let dataset_scope = VersionScope::dataset(owner.package_id.clone());
        Ok(self.store.find_by_name(&dataset_scope, version_ref).await?)
    }

    /// Check the host's authorization oracle, returning the acting user.
    pub(crate) async fn authorize(
        &self,
        ctx: &ActionContext,
        action: HostAction,
        package_id: &str,
    ) -> VersionResult<Option<User>> {
        let user = self.acting_user(ctx).await?;
        if ctx.ignore_auth {
            return Ok(user);
        }

        let allowed = self
            .host
            .authorizer
            .is_authorized(user.as_ref(), action, package_id)
            .await?;
        if !allowed {
            let who = user.as_ref().map_or("anonymous", |u| u.name.as_str());
            debug!(user = who, action = action.as_str(), package_id, "Not authorized");
            return Err(VersionError::not_authorized(format!(
                "User {} not authorized to {} dataset {}",
                who,
                match action {
                    HostAction::PackageShow => "read",
                    HostAction::PackageUpdate => "edit",
                },
                package_id
            )));
        }
        Ok(user)
    }

    async fn acting_user(&self, ctx: &ActionContext) -> VersionResult<Option<User>> {
        match &ctx.user {
            Some(name) => {
                let user = self.host.registry.user_show(name).await?;
                if user.is_none() && !ctx.ignore_auth {
                    return Err(VersionError::not_authorized(format!(
                        "User {name} not found"
                    )));
                }
                Ok(user)
            }
            None => Ok(None),
        }
    }

    /// Explicit creator, then acting user, then the system user.
    async fn creator_for(
        &self,
        explicit: Option<&str>,
        acting: Option<&User>,
    ) -> VersionResult<String> {
        if let Some(explicit) = explicit {
            let user = self
                .host
                .registry
                .user_show(explicit)
                .await?
                .ok_or_else(|| VersionError::not_found("User not found"))?;
            return Ok(user.id);
        }
        if let Some(user) = acting {
            return Ok(user.id.clone());
        }
        let system = &self.config.system_user;
        Ok(self
            .host
            .registry
            .user_show(system)
            .await?
            .map_or_else(|| system.clone(), |u| u.id))
    }

    async fn get(&self, version_id: &str) -> VersionResult<Version> {
        self.store
            .get(version_id)
            .await?
            .ok_or_else(|| VersionError::not_found("Version not found"))
    }

    async fn commit_changes(
        &self,
        current: &Version,
        changes: VersionChanges,
    ) -> VersionResult<Version> {
        let updated = self.store.update(&current.id, changes).await?;
        info!(version_id = %updated.id, name = %updated.name, "Updated version");
        Ok(updated)
    }
}

fn string_field(dict: &Dict, key: &str) -> Option<String> {
    dict.get(key).and_then(Value::as_str).map(str::to_string)
}
