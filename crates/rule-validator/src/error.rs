//! Validation Error Types

use storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while validating an alarm candidate
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Rule body missing, duplicated or structurally invalid
    #[error("{0}")]
    InvalidRule(String),

    /// Malformed field value (cron, timezone, action URL, query value)
    #[error("{0}")]
    InvalidInput(String),

    /// Two time constraints of one alarm share a name
    #[error("{0}")]
    DuplicateName(String),

    /// Query predicate reaches outside the owner's project
    #[error("Not authorized to access project {0}")]
    NotAuthorized(String),

    /// Referenced alarm does not exist in the caller's scope
    #[error(
        "Alarm {alarm_id} not found{}",
        project.as_ref().map(|p| format!(" in project {}", p)).unwrap_or_default()
    )]
    AlarmNotFound {
        alarm_id: Uuid,
        project: Option<String>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
