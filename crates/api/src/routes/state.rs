//! Alarm State Routes

use alarm_lifecycle::AlarmStateMachine;
use alarm_model::AlarmState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::policy_target;
use crate::error::ApiError;
use crate::policy::Credentials;
use crate::AppState;

pub async fn get_state(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(alarm_id): Path<Uuid>,
) -> Result<Json<AlarmState>, ApiError> {
    state.authorize(
        "telemetry:get_alarm_state",
        &policy_target(&credentials, Some(alarm_id)),
        &credentials,
    )?;
    let caller = state.caller(&credentials)?;

    Ok(Json(state.service.get_state(alarm_id, &caller).await?))
}

/// Set the state; the body is a bare JSON string such as `"alarm"`
pub async fn put_state(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(alarm_id): Path<Uuid>,
    Json(requested): Json<String>,
) -> Result<Json<AlarmState>, ApiError> {
    state.authorize(
        "telemetry:change_alarm_state",
        &policy_target(&credentials, Some(alarm_id)),
        &credentials,
    )?;
    let caller = state.caller(&credentials)?;
    let requested = AlarmStateMachine::parse(&requested)?;

    Ok(Json(state.service.set_state(alarm_id, requested, &caller).await?))
}
