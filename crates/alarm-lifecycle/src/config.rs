//! Lifecycle Configuration

use rule_validator::DEFAULT_ACTION_SCHEMES;
use serde::{Deserialize, Serialize};

/// Alarm lifecycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Persist change history (publishing happens regardless)
    pub record_history: bool,
    /// Maximum alarms per user, unlimited when unset
    pub user_alarm_quota: Option<u32>,
    /// Maximum alarms per project, unlimited when unset
    pub project_alarm_quota: Option<u32>,
    /// URL schemes accepted in alarm actions
    pub action_schemes: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            record_history: true,
            user_alarm_quota: None,
            project_alarm_quota: None,
            action_schemes: DEFAULT_ACTION_SCHEMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
