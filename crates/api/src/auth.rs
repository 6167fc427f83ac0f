//! Caller Identity Extraction

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::policy::Credentials;

pub const USER_HEADER: &str = "x-user-id";
pub const PROJECT_HEADER: &str = "x-project-id";
pub const ROLES_HEADER: &str = "x-roles";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("Missing X-User-Id header".to_string()))?;
        let project_id = header(parts, PROJECT_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("Missing X-Project-Id header".to_string()))?;
        let roles = header(parts, ROLES_HEADER)
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Credentials {
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            roles,
        })
    }
}
