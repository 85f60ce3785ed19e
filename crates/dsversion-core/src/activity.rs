//! Activity resolution.
//!
//! Maps "which point in history" requests onto entries of the host's
//! activity log.

use crate::error::{VersionError, VersionResult};
use crate::host::{Activity, ActivityLog};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves activity ids and their snapshot payloads.
#[derive(Clone)]
pub struct ActivityResolver {
    log: Arc<dyn ActivityLog>,
}

impl ActivityResolver {
    pub fn new(log: Arc<dyn ActivityLog>) -> Self {
        Self { log }
    }

    /// Id of the most recent activity recorded against a dataset.
    pub async fn latest_activity_for(&self, owner_id: &str) -> VersionResult<String> {
        Ok(self.latest_activity(owner_id).await?.id)
    }

    /// The most recent activity recorded against a dataset.
    ///
    /// Ordered by the log's timestamp; of two activities with the same
    /// timestamp the one the log lists later wins.
    pub async fn latest_activity(&self, owner_id: &str) -> VersionResult<Activity> {
        let activities = self.log.activities_for(owner_id).await?;
        newest(activities, |_| true).ok_or_else(|| {
            debug!(owner_id, "No activity recorded");
            VersionError::not_found("Activity not found")
        })
    }

    /// The newest activity recorded at or before `at`.
    pub async fn activity_at(&self, owner_id: &str, at: DateTime<Utc>) -> VersionResult<Activity> {
        let activities = self.log.activities_for(owner_id).await?;
        newest(activities, |a| a.timestamp <= at)
            .ok_or_else(|| VersionError::not_found("Activity not found"))
    }

    /// Fetch an activity and its payload.
    pub async fn resolve(&self, activity_id: &str) -> VersionResult<Activity> {
        self.log
            .activity_show(activity_id)
            .await?
            .ok_or_else(|| VersionError::not_found("Activity not found"))
    }

    /// Fetch an activity, requiring that it was recorded against `package_id`.
    pub async fn resolve_for_package(
        &self,
        activity_id: &str,
        package_id: &str,
    ) -> VersionResult<Activity> {
        let activity = self.resolve(activity_id).await?;
        if activity.object_id != package_id {
            debug!(
                activity_id,
                package_id,
                object_id = %activity.object_id,
                "Activity belongs to another object"
            );
            return Err(VersionError::not_found("Activity not found"));
        }
        Ok(activity)
    }

    /// Whether the activity's dataset snapshot contains the resource.
    ///
    /// Never fails: lookup errors are logged and reported as `false`.
    pub async fn contains_resource(&self, activity_id: &str, resource_id: &str) -> bool {
        match self.resolve(activity_id).await {
            Ok(activity) => activity.resource(resource_id).is_some(),
            Err(e) => {
                warn!(activity_id, resource_id, error = %e, "Could not check activity for resource");
                false
            }
        }
    }
}

fn newest(activities: Vec<Activity>, keep: impl Fn(&Activity) -> bool) -> Option<Activity> {
    activities
        .into_iter()
        .filter(|a| keep(a))
        .reduce(|best, candidate| {
            if candidate.timestamp >= best.timestamp {
                candidate
            } else {
                best
            }
        })
}
