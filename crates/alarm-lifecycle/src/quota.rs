//! Alarm Quotas

use std::sync::Arc;
use storage::{AlarmFilter, AlarmRepository, StorageError};
use tracing::debug;

/// Caps the number of alarms a user or project may own
pub struct QuotaEnforcer {
    repository: Arc<dyn AlarmRepository>,
    user_quota: Option<u32>,
    project_quota: Option<u32>,
}

impl QuotaEnforcer {
    pub fn new(
        repository: Arc<dyn AlarmRepository>,
        user_quota: Option<u32>,
        project_quota: Option<u32>,
    ) -> Self {
        Self {
            repository,
            user_quota,
            project_quota,
        }
    }

    /// Whether one more alarm for this owner would exceed a quota
    ///
    /// The user quota is checked first; the project quota only when the
    /// user is still under its own.
    pub async fn is_over_quota(&self, project_id: &str, user_id: &str) -> Result<bool, StorageError> {
        if let Some(quota) = self.user_quota {
            let owned = self
                .repository
                .list_alarms(&AlarmFilter::new().user(user_id))
                .await?
                .len();
            if owned >= quota as usize {
                debug!(user_id, owned, quota, "User alarm quota reached");
                return Ok(true);
            }
        }

        if let Some(quota) = self.project_quota {
            let owned = self
                .repository
                .list_alarms(&AlarmFilter::new().project(project_id))
                .await?
                .len();
            if owned >= quota as usize {
                debug!(project_id, owned, quota, "Project alarm quota reached");
                return Ok(true);
            }
        }

        Ok(false)
    }
}
