//! Alarm Ownership

use alarm_model::Alarm;
use tracing::warn;

use crate::error::AlarmError;

/// Identity of the caller performing an operation
///
/// A restricted caller may only act within its own user and project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub project_id: String,
    pub restricted: bool,
}

impl CallerIdentity {
    pub fn restricted(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            restricted: true,
        }
    }

    pub fn unrestricted(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            restricted: false,
            ..Self::restricted(user_id, project_id)
        }
    }

    pub fn user_limit(&self) -> Option<&str> {
        self.restricted.then_some(self.user_id.as_str())
    }

    pub fn project_limit(&self) -> Option<&str> {
        self.restricted.then_some(self.project_id.as_str())
    }
}

/// Effective owner of an alarm after reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub user_id: String,
    pub project_id: String,
}

/// Reconciles requested owner fields with the caller identity
pub struct OwnershipResolver;

impl OwnershipResolver {
    /// Owner for a new alarm; unset fields default to the caller
    pub fn resolve_create(
        caller: &CallerIdentity,
        user_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<Owner, AlarmError> {
        Ok(Owner {
            user_id: resolve_field("user", caller.user_limit(), user_id, &caller.user_id)?,
            project_id: resolve_field(
                "project",
                caller.project_limit(),
                project_id,
                &caller.project_id,
            )?,
        })
    }

    /// Owner for an updated alarm; unset fields keep the stored owner
    pub fn resolve_update(
        caller: &CallerIdentity,
        user_id: Option<&str>,
        project_id: Option<&str>,
        stored: &Alarm,
    ) -> Result<Owner, AlarmError> {
        Ok(Owner {
            user_id: resolve_field("user", caller.user_limit(), user_id, &stored.user_id)?,
            project_id: resolve_field(
                "project",
                caller.project_limit(),
                project_id,
                &stored.project_id,
            )?,
        })
    }
}

fn resolve_field(
    aspect: &str,
    limit: Option<&str>,
    requested: Option<&str>,
    fallback: &str,
) -> Result<String, AlarmError> {
    let requested = requested.filter(|value| !value.is_empty());

    if let (Some(limit), Some(requested)) = (limit, requested) {
        if limit != requested {
            warn!(aspect, requested, "Rejected attempt to act as another owner");
            return Err(AlarmError::NotAuthorized(format!(
                "Not authorized to access {} {}",
                aspect, requested
            )));
        }
    }

    Ok(limit.or(requested).unwrap_or(fallback).to_string())
}
