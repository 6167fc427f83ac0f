//! Rule Validator

use alarm_model::{AlarmRequest, AlarmRule, CombinationRule, RuleKind, ThresholdRule};
use std::collections::HashSet;
use std::sync::Arc;
use storage::{AlarmFilter, AlarmRepository};
use tracing::debug;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::query::sanitize_threshold_query;

/// Remove repeated alarm ids, keeping the first occurrence of each
pub fn dedupe_alarm_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Validates the rule body of an alarm candidate
pub struct RuleValidator {
    repository: Arc<dyn AlarmRepository>,
}

impl RuleValidator {
    pub fn new(repository: Arc<dyn AlarmRepository>) -> Self {
        Self { repository }
    }

    /// Resolve and validate the rule matching the candidate's `type`
    ///
    /// `owner_project` is the project the alarm will belong to; `scope` is
    /// the project combination members must be visible in, if any.
    pub async fn validate(
        &self,
        request: &AlarmRequest,
        owner_project: &str,
        scope: Option<&str>,
    ) -> Result<AlarmRule, ValidationError> {
        match (
            request.kind,
            &request.threshold_rule,
            &request.combination_rule,
        ) {
            (_, Some(_), Some(_)) => Err(ValidationError::InvalidRule(
                "threshold_rule and combination_rule cannot be set at the same time".to_string(),
            )),
            (RuleKind::Threshold, Some(rule), None) => self
                .validate_threshold(rule, owner_project)
                .map(AlarmRule::from),
            (RuleKind::Combination, None, Some(rule)) => self
                .validate_combination(rule, scope)
                .await
                .map(AlarmRule::from),
            (kind, _, _) => Err(ValidationError::InvalidRule(format!(
                "{kind}_rule must be set for {kind} type alarm"
            ))),
        }
    }

    /// Check bounds and normalize the query of a threshold rule
    pub fn validate_threshold(
        &self,
        rule: &ThresholdRule,
        owner_project: &str,
    ) -> Result<ThresholdRule, ValidationError> {
        if rule.meter_name.trim().is_empty() {
            return Err(ValidationError::InvalidInput(
                "meter_name must not be empty".to_string(),
            ));
        }
        if rule.period < 1 {
            return Err(ValidationError::InvalidInput(format!(
                "period must be at least 1 second, got {}",
                rule.period
            )));
        }
        if rule.evaluation_periods < 1 {
            return Err(ValidationError::InvalidInput(format!(
                "evaluation_periods must be at least 1, got {}",
                rule.evaluation_periods
            )));
        }

        let mut rule = rule.clone();
        rule.query = sanitize_threshold_query(&rule.query, owner_project)?;
        Ok(rule)
    }

    /// De-duplicate member ids and check each member exists in scope
    pub async fn validate_combination(
        &self,
        rule: &CombinationRule,
        scope: Option<&str>,
    ) -> Result<CombinationRule, ValidationError> {
        let alarm_ids = dedupe_alarm_ids(&rule.alarm_ids);
        if alarm_ids.len() < 2 {
            return Err(ValidationError::InvalidRule(
                "Alarm combination rule should contain at least two different alarm ids."
                    .to_string(),
            ));
        }

        for alarm_id in &alarm_ids {
            let filter = AlarmFilter::new().alarm_id(*alarm_id).scoped_to(scope);
            if self.repository.list_alarms(&filter).await?.is_empty() {
                debug!(%alarm_id, ?scope, "Combination member not found");
                return Err(ValidationError::AlarmNotFound {
                    alarm_id: *alarm_id,
                    project: scope.map(str::to_string),
                });
            }
        }

        Ok(CombinationRule {
            operator: rule.operator,
            alarm_ids,
        })
    }
}
