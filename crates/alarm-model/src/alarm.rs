//! Alarm Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constraint::TimeConstraint;
use crate::rule::{derive_description, AlarmRule, CombinationRule, RuleKind, ThresholdRule};
use crate::ModelError;

/// Tri-state alarm health signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlarmState {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "alarm")]
    Alarm,
    /// Not yet evaluated, or too few datapoints
    #[default]
    #[serde(rename = "insufficient data")]
    InsufficientData,
}

impl AlarmState {
    pub const ALL: [AlarmState; 3] = [
        AlarmState::Ok,
        AlarmState::Alarm,
        AlarmState::InsufficientData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Ok => "ok",
            AlarmState::Alarm => "alarm",
            AlarmState::InsufficientData => "insufficient data",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlarmState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ModelError::UnknownVariant {
                kind: "alarm state",
                value: s.to_string(),
            })
    }
}

/// Persisted alarm definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub alarm_id: Uuid,
    pub name: String,
    /// Explicit description only; read through [`Alarm::description`]
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub ok_actions: Vec<String>,
    #[serde(default)]
    pub alarm_actions: Vec<String>,
    #[serde(default)]
    pub insufficient_data_actions: Vec<String>,
    pub repeat_actions: bool,
    #[serde(flatten)]
    pub rule: AlarmRule,
    #[serde(default)]
    pub time_constraints: Vec<TimeConstraint>,
    pub user_id: String,
    pub project_id: String,
    pub state: AlarmState,
    pub state_timestamp: DateTime<Utc>,
    /// Last modification of the definition
    pub timestamp: DateTime<Utc>,
}

impl Alarm {
    /// Explicit description if present, otherwise derived from the rule
    pub fn description(&self) -> String {
        match &self.description {
            Some(description) if !description.is_empty() => description.clone(),
            _ => derive_description(&self.rule),
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.rule.kind()
    }

    /// Read-side representation with descriptions resolved
    pub fn view(&self) -> AlarmView<'_> {
        AlarmView {
            alarm_id: self.alarm_id,
            name: &self.name,
            description: self.description(),
            enabled: self.enabled,
            ok_actions: &self.ok_actions,
            alarm_actions: &self.alarm_actions,
            insufficient_data_actions: &self.insufficient_data_actions,
            repeat_actions: self.repeat_actions,
            rule: &self.rule,
            time_constraints: self
                .time_constraints
                .iter()
                .map(TimeConstraintView::from)
                .collect(),
            user_id: &self.user_id,
            project_id: &self.project_id,
            state: self.state,
            state_timestamp: self.state_timestamp,
            timestamp: self.timestamp,
        }
    }

    /// Field-name keyed snapshot used for change history
    pub fn snapshot(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self.view()) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Serialized form of an alarm as returned to callers
#[derive(Debug, Serialize)]
pub struct AlarmView<'a> {
    pub alarm_id: Uuid,
    pub name: &'a str,
    pub description: String,
    pub enabled: bool,
    pub ok_actions: &'a [String],
    pub alarm_actions: &'a [String],
    pub insufficient_data_actions: &'a [String],
    pub repeat_actions: bool,
    #[serde(flatten)]
    pub rule: &'a AlarmRule,
    pub time_constraints: Vec<TimeConstraintView<'a>>,
    pub user_id: &'a str,
    pub project_id: &'a str,
    pub state: AlarmState,
    pub state_timestamp: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TimeConstraintView<'a> {
    pub name: &'a str,
    pub description: String,
    pub start: &'a str,
    pub duration: i64,
    pub timezone: Option<&'a str>,
}

impl<'a> From<&'a TimeConstraint> for TimeConstraintView<'a> {
    fn from(tc: &'a TimeConstraint) -> Self {
        Self {
            name: &tc.name,
            description: tc.description(),
            start: &tc.start,
            duration: tc.duration,
            timezone: tc.timezone.as_deref(),
        }
    }
}

/// Candidate alarm as submitted for create or full update
///
/// Both rule bodies are optional here so that a mismatch with `type` can be
/// reported instead of silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub ok_actions: Vec<String>,
    #[serde(default)]
    pub alarm_actions: Vec<String>,
    #[serde(default)]
    pub insufficient_data_actions: Vec<String>,
    #[serde(default)]
    pub repeat_actions: bool,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default)]
    pub threshold_rule: Option<ThresholdRule>,
    #[serde(default)]
    pub combination_rule: Option<CombinationRule>,
    #[serde(default)]
    pub time_constraints: Vec<TimeConstraint>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub state: Option<AlarmState>,
}

fn default_enabled() -> bool {
    true
}

impl AlarmRequest {
    /// Threshold alarm request with defaults for everything else
    pub fn threshold(name: impl Into<String>, rule: ThresholdRule) -> Self {
        Self {
            threshold_rule: Some(rule),
            ..Self::empty(name, RuleKind::Threshold)
        }
    }

    /// Combination alarm request with defaults for everything else
    pub fn combination(name: impl Into<String>, rule: CombinationRule) -> Self {
        Self {
            combination_rule: Some(rule),
            ..Self::empty(name, RuleKind::Combination)
        }
    }

    fn empty(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            enabled: true,
            ok_actions: Vec::new(),
            alarm_actions: Vec::new(),
            insufficient_data_actions: Vec::new(),
            repeat_actions: false,
            kind,
            threshold_rule: None,
            combination_rule: None,
            time_constraints: Vec::new(),
            user_id: None,
            project_id: None,
            state: None,
        }
    }

    pub fn with_owner(mut self, user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_state(mut self, state: AlarmState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_time_constraint(mut self, constraint: TimeConstraint) -> Self {
        self.time_constraints.push(constraint);
        self
    }

    /// Action lists keyed by the state that triggers them
    pub fn actions(&self) -> [(AlarmState, &[String]); 3] {
        [
            (AlarmState::Ok, self.ok_actions.as_slice()),
            (AlarmState::Alarm, self.alarm_actions.as_slice()),
            (
                AlarmState::InsufficientData,
                self.insufficient_data_actions.as_slice(),
            ),
        ]
    }
}
