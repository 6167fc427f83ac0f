//! Alarm Routes

use alarm_model::{Alarm, AlarmRequest};
use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{parse_query, policy_target};
use crate::error::ApiError;
use crate::policy::Credentials;
use crate::AppState;

/// List alarms visible to the caller
pub async fn list_alarms(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    state.authorize("telemetry:get_alarms", &policy_target(&credentials, None), &credentials)?;
    let caller = state.caller(&credentials)?;
    let query = parse_query(raw.as_deref())?;

    let alarms = state.service.list(&query, &caller).await?;
    let views: Vec<_> = alarms.iter().map(Alarm::view).collect();
    Ok(Json(views).into_response())
}

/// Create an alarm
pub async fn create_alarm(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Json(request): Json<AlarmRequest>,
) -> Result<Response, ApiError> {
    state.authorize("telemetry:create_alarm", &policy_target(&credentials, None), &credentials)?;
    let caller = state.caller(&credentials)?;

    let alarm = state.service.create(request, &caller).await?;
    Ok((StatusCode::CREATED, Json(alarm.view())).into_response())
}

/// Get one alarm
pub async fn get_alarm(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(alarm_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.authorize(
        "telemetry:get_alarm",
        &policy_target(&credentials, Some(alarm_id)),
        &credentials,
    )?;
    let caller = state.caller(&credentials)?;

    let alarm = state.service.get(alarm_id, &caller).await?;
    Ok(Json(alarm.view()).into_response())
}

/// Replace an alarm definition
pub async fn update_alarm(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(alarm_id): Path<Uuid>,
    Json(request): Json<AlarmRequest>,
) -> Result<Response, ApiError> {
    state.authorize(
        "telemetry:change_alarm",
        &policy_target(&credentials, Some(alarm_id)),
        &credentials,
    )?;
    let caller = state.caller(&credentials)?;

    let alarm = state.service.update(alarm_id, request, &caller).await?;
    Ok(Json(alarm.view()).into_response())
}

/// Delete an alarm
pub async fn delete_alarm(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(alarm_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.authorize(
        "telemetry:delete_alarm",
        &policy_target(&credentials, Some(alarm_id)),
        &credentials,
    )?;
    let caller = state.caller(&credentials)?;

    state.service.delete(alarm_id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}
