//! API Error Responses

use alarm_lifecycle::AlarmError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::policy::PolicyError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Identity headers missing or empty
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Alarm(err) => match err {
                AlarmError::AlarmNotFound { .. } => StatusCode::NOT_FOUND,
                AlarmError::NotAuthorized(_) | AlarmError::QuotaExceeded { .. } => {
                    StatusCode::FORBIDDEN
                }
                AlarmError::DuplicateName(_) => StatusCode::CONFLICT,
                AlarmError::InvalidRule(_) | AlarmError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                AlarmError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Policy(PolicyError::NotAuthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::Policy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::StorageError;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::from(AlarmError::AlarmNotFound {
            alarm_id: Uuid::nil(),
            project: None,
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let quota = ApiError::from(AlarmError::QuotaExceeded {
            user_id: "u1".into(),
            project_id: "p1".into(),
        });
        assert_eq!(quota.status(), StatusCode::FORBIDDEN);

        let duplicate = ApiError::from(AlarmError::DuplicateName("dup".into()));
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let storage = ApiError::from(AlarmError::Storage(StorageError::NotFound));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let denied = ApiError::from(PolicyError::NotAuthorized("telemetry:get_alarm".into()));
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        assert_eq!(
            ApiError::Unauthenticated("missing".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
