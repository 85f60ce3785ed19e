//! Administrative bootstrap: schema creation and the initial backfill.

use crate::context::ActionContext;
use crate::error::{VersionError, VersionResult};
use crate::versions::{CreateVersion, OwnerRef, VersionService};
use dsversion_storage::{StorageResult, VersionStore};
use serde_json::Value;
use tracing::{info, warn};

/// Outcome of [`init_db`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

/// Create the version table if it does not exist yet.
pub async fn init_db(store: &dyn VersionStore) -> StorageResult<InitOutcome> {
    if store.tables_exist().await? {
        info!("Version table already exists");
        return Ok(InitOutcome::AlreadyExists);
    }
    store.create_tables().await?;
    info!("Version table created");
    Ok(InitOutcome::Created)
}

/// Counts from [`backfill`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Resources that received an initial version.
    pub created: usize,
    /// Resources that already had versions.
    pub existing: usize,
    /// Resources that could not be versioned (no activity, or absent from it).
    pub skipped: usize,
}

/// Name of the initial version created by [`backfill`].
pub const INITIAL_VERSION: &str = "1";

/// Give every resource without versions an initial version, credited to
/// its dataset's creator, or to the system user when the creator is gone.
pub async fn backfill(versions: &VersionService) -> VersionResult<BackfillReport> {
    let ctx = ActionContext::system();
    let registry = &versions.host().registry;
    let mut report = BackfillReport::default();

    for package_id in registry.package_list().await? {
        let Some(package) = registry.package_show(&package_id).await? else {
            continue;
        };
        let creator = match package.get("creator_user_id").and_then(Value::as_str) {
            Some(id) => match registry.user_show(id).await? {
                Some(user) => Some(user.id),
                None => {
                    warn!(
                        package_id = %package_id,
                        creator_user_id = id,
                        "Dataset creator no longer exists; crediting the system user"
                    );
                    None
                }
            },
            None => None,
        };
        let resource_ids: Vec<String> = package
            .get("resources")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        for resource_id in resource_ids {
            let owner = OwnerRef::resource(resource_id.clone());
            if versions.has_versions(&ctx, &owner).await? {
                report.existing += 1;
                continue;
            }

            let mut req = CreateVersion::new(owner, INITIAL_VERSION);
            if let Some(creator) = &creator {
                req = req.with_creator(creator.clone());
            }

            match versions.create(&ctx, req).await {
                Ok(version) => {
                    info!(
                        package_id = %package_id,
                        resource_id = %resource_id,
                        version_id = %version.id,
                        "Created initial version"
                    );
                    report.created += 1;
                }
                Err(VersionError::NotFound(reason)) => {
                    warn!(
                        package_id = %package_id,
                        resource_id = %resource_id,
                        reason = %reason,
                        "Skipping resource"
                    );
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    info!(
        created = report.created,
        existing = report.existing,
        skipped = report.skipped,
        "Backfill finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsversion_storage::MemoryVersionStore;

    #[tokio::test]
    async fn test_init_db_is_idempotent() {
        let store = MemoryVersionStore::uninitialized();
        assert_eq!(init_db(&store).await.unwrap(), InitOutcome::Created);
        assert_eq!(init_db(&store).await.unwrap(), InitOutcome::AlreadyExists);
        assert!(store.tables_exist().await.unwrap());
    }
}
