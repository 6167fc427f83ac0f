//! Alarm Lifecycle Service

use alarm_model::{
    Alarm, AlarmChange, AlarmRequest, AlarmRule, AlarmState, ChangeKind, QueryOp, QueryPredicate,
    RuleKind,
};
use chrono::{DateTime, Utc};
use notifier::Notifier;
use rule_validator::{
    check_value_type, parse_datetime, ActionValidator, RuleValidator, TimeConstraintValidator,
    OWNERSHIP_FIELD, TIMESTAMP_FIELDS,
};
use serde_json::{json, Value};
use std::sync::Arc;
use storage::{AlarmFilter, AlarmRepository, ChangeFilter, TimeBound};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::error::AlarmError;
use crate::history::{diff_snapshots, ChangeHistoryRecorder};
use crate::ownership::{CallerIdentity, OwnershipResolver};
use crate::quota::QuotaEnforcer;
use crate::state::AlarmStateMachine;

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Orchestrates validation, ownership, quotas, persistence and history for
/// every alarm operation
pub struct AlarmLifecycleService {
    repository: Arc<dyn AlarmRepository>,
    rules: RuleValidator,
    actions: ActionValidator,
    constraints: TimeConstraintValidator,
    quota: QuotaEnforcer,
    history: ChangeHistoryRecorder,
    clock: Clock,
}

impl AlarmLifecycleService {
    pub fn new(
        config: LifecycleConfig,
        repository: Arc<dyn AlarmRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        info!("Creating alarm lifecycle service with config: {:?}", config);
        Self {
            rules: RuleValidator::new(repository.clone()),
            actions: ActionValidator::new(config.action_schemes),
            constraints: TimeConstraintValidator::new(),
            quota: QuotaEnforcer::new(
                repository.clone(),
                config.user_alarm_quota,
                config.project_alarm_quota,
            ),
            history: ChangeHistoryRecorder::new(repository.clone(), notifier, config.record_history),
            repository,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Create an alarm owned by the caller or, for unrestricted callers, by
    /// the requested owner
    pub async fn create(
        &self,
        request: AlarmRequest,
        caller: &CallerIdentity,
    ) -> Result<Alarm, AlarmError> {
        let result = self.create_inner(request, caller).await;
        observe("create", &result);
        result
    }

    async fn create_inner(
        &self,
        request: AlarmRequest,
        caller: &CallerIdentity,
    ) -> Result<Alarm, AlarmError> {
        let owner = OwnershipResolver::resolve_create(
            caller,
            request.user_id.as_deref(),
            request.project_id.as_deref(),
        )?;

        if self
            .quota
            .is_over_quota(&owner.project_id, &owner.user_id)
            .await?
        {
            return Err(AlarmError::QuotaExceeded {
                user_id: owner.user_id,
                project_id: owner.project_id,
            });
        }

        let now = self.now();
        self.ensure_unique_name(&owner.project_id, &request.name, None)
            .await?;
        let rule = self
            .validate(&request, &owner.project_id, caller.project_limit())
            .await?;

        let alarm = Alarm {
            alarm_id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            enabled: request.enabled,
            ok_actions: request.ok_actions,
            alarm_actions: request.alarm_actions,
            insufficient_data_actions: request.insufficient_data_actions,
            repeat_actions: request.repeat_actions,
            rule,
            time_constraints: request.time_constraints,
            user_id: owner.user_id,
            project_id: owner.project_id,
            state: request.state.unwrap_or_default(),
            state_timestamp: now,
            timestamp: now,
        };

        let alarm = self.repository.create_alarm(alarm).await?;
        info!(
            alarm_id = %alarm.alarm_id,
            name = %alarm.name,
            project_id = %alarm.project_id,
            "Alarm created"
        );

        self.history
            .record(
                ChangeKind::Creation,
                Value::Object(alarm.snapshot()),
                alarm.alarm_id,
                caller,
                &alarm.project_id,
                now,
            )
            .await?;
        Ok(alarm)
    }

    /// Load one alarm visible to the caller
    pub async fn get(&self, alarm_id: Uuid, caller: &CallerIdentity) -> Result<Alarm, AlarmError> {
        let filter = AlarmFilter::new()
            .alarm_id(alarm_id)
            .scoped_to(caller.project_limit());

        self.repository
            .list_alarms(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AlarmError::AlarmNotFound {
                alarm_id,
                project: caller.project_limit().map(str::to_string),
            })
    }

    /// List alarms matching equality predicates
    pub async fn list(
        &self,
        query: &[QueryPredicate],
        caller: &CallerIdentity,
    ) -> Result<Vec<Alarm>, AlarmError> {
        let result: Result<Vec<Alarm>, AlarmError> = async {
            let filter = alarm_filter(query, caller)?;
            Ok(self.repository.list_alarms(&filter).await?)
        }
        .await;
        observe("list", &result);
        result
    }

    /// Replace an alarm definition
    pub async fn update(
        &self,
        alarm_id: Uuid,
        request: AlarmRequest,
        caller: &CallerIdentity,
    ) -> Result<Alarm, AlarmError> {
        let result = self.update_inner(alarm_id, request, caller).await;
        observe("update", &result);
        result
    }

    async fn update_inner(
        &self,
        alarm_id: Uuid,
        request: AlarmRequest,
        caller: &CallerIdentity,
    ) -> Result<Alarm, AlarmError> {
        let stored = self.get(alarm_id, caller).await?;
        let owner = OwnershipResolver::resolve_update(
            caller,
            request.user_id.as_deref(),
            request.project_id.as_deref(),
            &stored,
        )?;
        let now = self.now();

        if request.name != stored.name || owner.project_id != stored.project_id {
            self.ensure_unique_name(&owner.project_id, &request.name, Some(alarm_id))
                .await?;
        }

        if request.kind == RuleKind::Combination {
            if let Some(combination) = &request.combination_rule {
                if combination.alarm_ids.contains(&alarm_id) {
                    return Err(AlarmError::InvalidRule(format!(
                        "Cannot specify alarm {} itself in combination rule",
                        alarm_id
                    )));
                }
            }
        }

        let rule = self
            .validate(&request, &owner.project_id, caller.project_limit())
            .await?;

        let mut updated = Alarm {
            alarm_id,
            name: request.name,
            description: request.description,
            enabled: request.enabled,
            ok_actions: request.ok_actions,
            alarm_actions: request.alarm_actions,
            insufficient_data_actions: request.insufficient_data_actions,
            repeat_actions: request.repeat_actions,
            rule,
            time_constraints: request.time_constraints,
            user_id: owner.user_id,
            project_id: owner.project_id,
            state: stored.state,
            state_timestamp: stored.state_timestamp,
            timestamp: stored.timestamp,
        };
        AlarmStateMachine::apply(&mut updated, request.state, now);

        let updated = self.repository.update_alarm(updated).await?;
        let changes = diff_snapshots(&stored.snapshot(), &updated.snapshot());
        debug!(%alarm_id, fields = ?changes.keys().collect::<Vec<_>>(), "Alarm updated");

        self.history
            .record(
                ChangeKind::RuleChange,
                Value::Object(changes),
                alarm_id,
                caller,
                &updated.project_id,
                now,
            )
            .await?;
        Ok(updated)
    }

    /// Delete an alarm; its history is kept
    pub async fn delete(&self, alarm_id: Uuid, caller: &CallerIdentity) -> Result<(), AlarmError> {
        let result: Result<(), AlarmError> = async {
            let stored = self.get(alarm_id, caller).await?;
            self.repository.delete_alarm(alarm_id).await?;
            info!(%alarm_id, project_id = %stored.project_id, "Alarm deleted");

            self.history
                .record(
                    ChangeKind::Deletion,
                    Value::Object(stored.snapshot()),
                    alarm_id,
                    caller,
                    &stored.project_id,
                    self.now(),
                )
                .await?;
            Ok(())
        }
        .await;
        observe("delete", &result);
        result
    }

    pub async fn get_state(
        &self,
        alarm_id: Uuid,
        caller: &CallerIdentity,
    ) -> Result<AlarmState, AlarmError> {
        Ok(self.get(alarm_id, caller).await?.state)
    }

    /// Set the alarm state, recording a state transition
    pub async fn set_state(
        &self,
        alarm_id: Uuid,
        state: AlarmState,
        caller: &CallerIdentity,
    ) -> Result<AlarmState, AlarmError> {
        let result: Result<AlarmState, AlarmError> = async {
            let mut alarm = self.get(alarm_id, caller).await?;
            let now = self.now();
            if AlarmStateMachine::apply(&mut alarm, Some(state), now) {
                info!(%alarm_id, state = %state, "Alarm state changed");
            }

            let alarm = self.repository.update_alarm(alarm).await?;
            self.history
                .record(
                    ChangeKind::StateTransition,
                    json!({ "state": alarm.state }),
                    alarm_id,
                    caller,
                    &alarm.project_id,
                    now,
                )
                .await?;
            Ok(alarm.state)
        }
        .await;
        observe("set_state", &result);
        result
    }

    /// Change history of an alarm, newest first
    ///
    /// History outlives the alarm, so the alarm itself is not loaded.
    pub async fn history(
        &self,
        alarm_id: Uuid,
        query: &[QueryPredicate],
        caller: &CallerIdentity,
    ) -> Result<Vec<AlarmChange>, AlarmError> {
        let filter = change_filter(query)?;
        Ok(self
            .repository
            .list_changes(alarm_id, caller.project_limit(), &filter)
            .await?)
    }

    async fn ensure_unique_name(
        &self,
        project_id: &str,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<(), AlarmError> {
        if name.trim().is_empty() {
            return Err(AlarmError::InvalidInput(
                "Alarm name must not be empty".to_string(),
            ));
        }

        let filter = AlarmFilter::new().name(name).project(project_id);
        let taken = self
            .repository
            .list_alarms(&filter)
            .await?
            .iter()
            .any(|alarm| Some(alarm.alarm_id) != except);

        if taken {
            return Err(AlarmError::DuplicateName(format!(
                "Alarm with name='{}' exists",
                name
            )));
        }
        Ok(())
    }

    async fn validate(
        &self,
        request: &AlarmRequest,
        owner_project: &str,
        scope: Option<&str>,
    ) -> Result<AlarmRule, AlarmError> {
        let rule = self.rules.validate(request, owner_project, scope).await?;
        self.actions.validate(request)?;
        self.constraints.validate(&request.time_constraints)?;
        Ok(rule)
    }
}

fn observe<T>(operation: &'static str, result: &Result<T, AlarmError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.outcome(),
    };
    metrics::counter!(
        "alarm_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

fn unsupported_operator(predicate: &QueryPredicate) -> AlarmError {
    AlarmError::InvalidInput(format!(
        "Operator {} is not supported for field {}",
        predicate.op, predicate.field
    ))
}

fn parse_value<T: std::str::FromStr>(predicate: &QueryPredicate) -> Result<T, AlarmError> {
    predicate.value.parse().map_err(|_| {
        AlarmError::InvalidInput(format!(
            "Invalid input for field/attribute {}. Value: '{}'.",
            predicate.field, predicate.value
        ))
    })
}

fn parse_bool(predicate: &QueryPredicate) -> Result<bool, AlarmError> {
    match predicate.value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => parse_value::<bool>(predicate),
    }
}

/// Translate list predicates into a repository filter
fn alarm_filter(query: &[QueryPredicate], caller: &CallerIdentity) -> Result<AlarmFilter, AlarmError> {
    let mut filter = AlarmFilter::new();

    for predicate in query {
        if TIMESTAMP_FIELDS.contains(&predicate.field.as_str()) {
            return Err(AlarmError::InvalidInput(format!(
                "Unknown argument: \"{}\": not valid for this resource",
                predicate.field
            )));
        }
        if predicate.op != QueryOp::Eq {
            return Err(unsupported_operator(predicate));
        }
        check_value_type(predicate)?;

        let value = predicate.value.clone();
        match predicate.field.as_str() {
            "alarm_id" => filter.alarm_id = Some(parse_value(predicate)?),
            "name" => filter.name = Some(value),
            "user_id" => filter.user_id = Some(value),
            OWNERSHIP_FIELD => {
                if let Some(limit) = caller.project_limit() {
                    if limit != value {
                        return Err(AlarmError::NotAuthorized(format!(
                            "Not authorized to access project {}",
                            value
                        )));
                    }
                }
                filter.project_id = Some(value);
            }
            "enabled" => filter.enabled = Some(parse_bool(predicate)?),
            "state" => filter.state = Some(parse_value(predicate)?),
            "type" => filter.kind = Some(parse_value(predicate)?),
            "meter" => filter.meter = Some(value),
            other => {
                return Err(AlarmError::InvalidInput(format!(
                    "Unknown argument: \"{}\": not valid for this resource",
                    other
                )))
            }
        }
    }

    Ok(filter.scoped_to(caller.project_limit()))
}

fn parse_timestamp(predicate: &QueryPredicate) -> Result<DateTime<Utc>, AlarmError> {
    parse_datetime(&predicate.value).ok_or_else(|| {
        AlarmError::InvalidInput(format!(
            "Invalid input for field/attribute timestamp. Value: '{}'.",
            predicate.value
        ))
    })
}

/// Translate history predicates into a change filter
fn change_filter(query: &[QueryPredicate]) -> Result<ChangeFilter, AlarmError> {
    let mut filter = ChangeFilter::default();

    for predicate in query {
        match (predicate.field.as_str(), predicate.op) {
            ("timestamp", QueryOp::Ne) => return Err(unsupported_operator(predicate)),
            ("timestamp", op) => {
                let at = parse_timestamp(predicate)?;
                let inclusive = matches!(op, QueryOp::Ge | QueryOp::Le | QueryOp::Eq);
                if matches!(op, QueryOp::Gt | QueryOp::Ge | QueryOp::Eq) {
                    filter.start = Some(TimeBound { at, inclusive });
                }
                if matches!(op, QueryOp::Lt | QueryOp::Le | QueryOp::Eq) {
                    filter.end = Some(TimeBound { at, inclusive });
                }
            }
            ("type", QueryOp::Eq) => filter.kind = Some(parse_value(predicate)?),
            ("user_id", QueryOp::Eq) => filter.user_id = Some(predicate.value.clone()),
            ("project_id", QueryOp::Eq) => filter.project_id = Some(predicate.value.clone()),
            ("type" | "user_id" | "project_id", _) => return Err(unsupported_operator(predicate)),
            (field, _) => {
                return Err(AlarmError::InvalidInput(format!(
                    "Unknown argument: \"{}\": not valid for this resource",
                    field
                )))
            }
        }
    }
    Ok(filter)
}
