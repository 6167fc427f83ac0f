//! Lifecycle Error Types

use rule_validator::ValidationError;
use storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error(
        "Alarm {alarm_id} not found{}",
        project.as_ref().map(|p| format!(" in project {}", p)).unwrap_or_default()
    )]
    AlarmNotFound {
        alarm_id: Uuid,
        project: Option<String>,
    },

    #[error("{0}")]
    NotAuthorized(String),

    #[error("Alarm quota exceeded for user {user_id} on project {project_id}")]
    QuotaExceeded { user_id: String, project_id: String },

    #[error("{0}")]
    DuplicateName(String),

    #[error("{0}")]
    InvalidRule(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl AlarmError {
    /// Short label used for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            AlarmError::AlarmNotFound { .. } => "not_found",
            AlarmError::NotAuthorized(_) => "not_authorized",
            AlarmError::QuotaExceeded { .. } => "quota_exceeded",
            AlarmError::DuplicateName(_) => "duplicate_name",
            AlarmError::InvalidRule(_) => "invalid_rule",
            AlarmError::InvalidInput(_) => "invalid_input",
            AlarmError::Storage(_) => "storage_error",
        }
    }
}

impl From<StorageError> for AlarmError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => AlarmError::DuplicateName(message),
            other => AlarmError::Storage(other),
        }
    }
}

impl From<ValidationError> for AlarmError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidRule(message) => AlarmError::InvalidRule(message),
            ValidationError::InvalidInput(message) => AlarmError::InvalidInput(message),
            ValidationError::DuplicateName(message) => AlarmError::DuplicateName(message),
            err @ ValidationError::NotAuthorized(_) => AlarmError::NotAuthorized(err.to_string()),
            ValidationError::AlarmNotFound { alarm_id, project } => {
                AlarmError::AlarmNotFound { alarm_id, project }
            }
            ValidationError::Storage(err) => err.into(),
        }
    }
}
