//! Alarm History Routes

use alarm_model::AlarmChange;
use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{parse_query, policy_target};
use crate::error::ApiError;
use crate::policy::Credentials;
use crate::AppState;

/// Change history of an alarm, newest first
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(alarm_id): Path<Uuid>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Vec<AlarmChange>>, ApiError> {
    state.authorize(
        "telemetry:alarm_history",
        &policy_target(&credentials, Some(alarm_id)),
        &credentials,
    )?;
    let caller = state.caller(&credentials)?;
    let query = parse_query(raw.as_deref())?;

    Ok(Json(state.service.history(alarm_id, &query, &caller).await?))
}
