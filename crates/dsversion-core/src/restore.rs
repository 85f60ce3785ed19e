//! Restoring a dataset to an earlier version.

use crate::context::ActionContext;
use crate::error::{VersionError, VersionResult};
use crate::host::{Dict, HostAction};
use crate::snapshot::{SnapshotService, VERSION_METADATA};
use crate::versions::{CreateVersion, OwnerRef};
use dsversion_storage::VersionScope;
use dsversion_util::TimingGuard;
use tracing::info;

/// Replays historical snapshots as the current dataset state.
#[derive(Clone)]
pub struct RestoreEngine {
    snapshots: SnapshotService,
}

impl RestoreEngine {
    pub fn new(snapshots: SnapshotService) -> Self {
        Self { snapshots }
    }

    /// Overwrite the dataset with the snapshot bound to `version_ref`, then
    /// record the result as a new version named after the restored one.
    ///
    /// The host update and the new version are two separate writes; if the
    /// second fails the dataset stays restored without a version pointing
    /// at it.
    pub async fn restore(
        &self,
        ctx: &ActionContext,
        dataset_ref: &str,
        version_ref: &str,
    ) -> VersionResult<Dict> {
        let _timing = TimingGuard::action("version_restore");
        let versions = self.snapshots.versions();

        let owner = versions
            .resolve_owner(&OwnerRef::dataset(dataset_ref))
            .await?;
        let acting = versions
            .authorize(ctx, HostAction::PackageUpdate, &owner.package_id)
            .await?;

        let version = versions
            .lookup(version_ref, Some(&owner))
            .await?
            .filter(|v| v.package_id == owner.package_id)
            .ok_or_else(|| VersionError::not_found("Version not found"))?;

        let mut historical = self
            .snapshots
            .activity_package_show(&version.activity_id, &owner.package_id)
            .await?;
        historical.remove(VERSION_METADATA);

        let restored = versions
            .host()
            .registry
            .package_update(
                &owner.package_id,
                historical,
                acting.as_ref().map(|u| u.id.as_str()),
            )
            .await?;

        let name = self.restore_name(&owner.scope(), &version.name).await?;
        let recorded = versions
            .create(
                ctx,
                CreateVersion::new(OwnerRef::dataset(owner.package_id.clone()), name)
                    .with_notes(format!("Restored from version {}", version.name)),
            )
            .await?;

        info!(
            package_id = %owner.package_id,
            restored_from = %version.id,
            new_version = %recorded.id,
            "Restored dataset"
        );
        Ok(restored)
    }

    /// `restored_<name>`, suffixed `_2`, `_3`, ... until unused in `scope`.
    async fn restore_name(&self, scope: &VersionScope, name: &str) -> VersionResult<String> {
        let store = self.snapshots.versions().store();
        let base = format!("{}{}", self.snapshots.versions().config().restore_prefix, name);

        if store.find_by_name(scope, &base).await?.is_none() {
            return Ok(base);
        }
        let mut counter = 2;
        loop {
            let candidate = format!("{base}_{counter}");
            if store.find_by_name(scope, &candidate).await?.is_none() {
                return Ok(candidate);
            }
            counter += 1;
        }
    }
}
