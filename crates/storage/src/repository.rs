//! Repository Interface

use alarm_model::{Alarm, AlarmChange, AlarmState, ChangeKind, RuleKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::StorageError;

/// Alarm selection criteria; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmFilter {
    pub alarm_id: Option<Uuid>,
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub enabled: Option<bool>,
    pub state: Option<AlarmState>,
    pub kind: Option<RuleKind>,
    /// Meter of a threshold rule
    pub meter: Option<String>,
}

impl AlarmFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarm_id(mut self, alarm_id: Uuid) -> Self {
        self.alarm_id = Some(alarm_id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Restrict to a project when one is given
    pub fn scoped_to(mut self, project_id: Option<&str>) -> Self {
        if let Some(project_id) = project_id {
            self.project_id = Some(project_id.to_string());
        }
        self
    }

    pub fn matches(&self, alarm: &Alarm) -> bool {
        self.alarm_id.map_or(true, |id| alarm.alarm_id == id)
            && self.name.as_ref().map_or(true, |n| &alarm.name == n)
            && self.user_id.as_ref().map_or(true, |u| &alarm.user_id == u)
            && self.project_id.as_ref().map_or(true, |p| &alarm.project_id == p)
            && self.enabled.map_or(true, |e| alarm.enabled == e)
            && self.state.map_or(true, |s| alarm.state == s)
            && self.kind.map_or(true, |k| alarm.kind() == k)
            && self.meter.as_ref().map_or(true, |m| {
                alarm
                    .rule
                    .threshold()
                    .is_some_and(|rule| &rule.meter_name == m)
            })
    }
}

/// Bound on a change timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBound {
    pub at: DateTime<Utc>,
    pub inclusive: bool,
}

/// History selection criteria beyond alarm id and visibility scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeFilter {
    pub kind: Option<ChangeKind>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub start: Option<TimeBound>,
    pub end: Option<TimeBound>,
}

impl ChangeFilter {
    pub fn matches(&self, change: &AlarmChange) -> bool {
        self.kind.map_or(true, |k| change.kind == k)
            && self
                .user_id
                .as_ref()
                .map_or(true, |u| change.user_id.as_ref() == Some(u))
            && self
                .project_id
                .as_ref()
                .map_or(true, |p| change.project_id.as_ref() == Some(p))
            && self.start.map_or(true, |b| {
                if b.inclusive {
                    change.timestamp >= b.at
                } else {
                    change.timestamp > b.at
                }
            })
            && self.end.map_or(true, |b| {
                if b.inclusive {
                    change.timestamp <= b.at
                } else {
                    change.timestamp < b.at
                }
            })
    }
}

/// Narrow persistence interface consumed by the lifecycle service
///
/// Backends that cannot store history return
/// [`StorageError::NotImplemented`] from the change methods.
#[async_trait]
pub trait AlarmRepository: Send + Sync {
    async fn list_alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>, StorageError>;

    /// Insert a new alarm; a (project, name) collision is a `Conflict`
    async fn create_alarm(&self, alarm: Alarm) -> Result<Alarm, StorageError>;

    async fn update_alarm(&self, alarm: Alarm) -> Result<Alarm, StorageError>;

    async fn delete_alarm(&self, alarm_id: Uuid) -> Result<(), StorageError>;

    async fn record_change(&self, change: AlarmChange) -> Result<(), StorageError>;

    /// Changes for an alarm, newest first, optionally limited to those made
    /// on behalf of a project
    async fn list_changes(
        &self,
        alarm_id: Uuid,
        on_behalf_of: Option<&str>,
        filter: &ChangeFilter,
    ) -> Result<Vec<AlarmChange>, StorageError>;
}
