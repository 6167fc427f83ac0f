//! Time Constraints

use serde::{Deserialize, Serialize};

/// Cron-scheduled window during which an alarm is evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConstraint {
    pub name: String,
    /// Explicit description; see [`TimeConstraint::description`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Start of the window, in cron format
    pub start: String,
    /// Window length in seconds
    pub duration: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl TimeConstraint {
    pub fn new(name: impl Into<String>, start: impl Into<String>, duration: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            start: start.into(),
            duration,
            timezone: None,
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Explicit description if set, otherwise derived from start and duration
    pub fn description(&self) -> String {
        match &self.description {
            Some(description) if !description.is_empty() => description.clone(),
            _ => self.default_description(),
        }
    }

    pub fn default_description(&self) -> String {
        format!(
            "Time constraint starts at {} for {} seconds",
            self.start, self.duration
        )
    }
}
