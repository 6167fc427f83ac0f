//! Alarm Change History Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ModelError;

/// Kind of lifecycle event recorded in alarm history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "creation")]
    Creation,
    #[serde(rename = "rule change")]
    RuleChange,
    #[serde(rename = "state transition")]
    StateTransition,
    #[serde(rename = "deletion")]
    Deletion,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Creation,
        ChangeKind::RuleChange,
        ChangeKind::StateTransition,
        ChangeKind::Deletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Creation => "creation",
            ChangeKind::RuleChange => "rule change",
            ChangeKind::StateTransition => "state transition",
            ChangeKind::Deletion => "deletion",
        }
    }

    /// Notification topic, e.g. `alarm.rule_change`
    pub fn topic(&self) -> String {
        format!("alarm.{}", self.as_str().replace(' ', "_"))
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ModelError::UnknownVariant {
                kind: "change type",
                value: s.to_string(),
            })
    }
}

/// Append-only history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmChange {
    pub event_id: Uuid,
    pub alarm_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// JSON document describing the change
    pub detail: String,
    /// Acting user
    pub user_id: Option<String>,
    /// Acting project
    pub project_id: Option<String>,
    /// Project the change is scoped to for visibility
    pub on_behalf_of: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Payload published for a change, with the detail left structured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub event_id: Uuid,
    pub alarm_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub detail: serde_json::Value,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub on_behalf_of: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChangeNotification {
    /// Storable record with the detail serialized to a string
    pub fn to_record(&self) -> Result<AlarmChange, serde_json::Error> {
        Ok(AlarmChange {
            event_id: self.event_id,
            alarm_id: self.alarm_id,
            kind: self.kind,
            detail: serde_json::to_string(&self.detail)?,
            user_id: self.user_id.clone(),
            project_id: self.project_id.clone(),
            on_behalf_of: self.on_behalf_of.clone(),
            timestamp: self.timestamp,
        })
    }
}
