//! Action URL Validator

use alarm_model::AlarmRequest;
use url::Url;

use crate::error::ValidationError;

/// Schemes understood by the alarm notifier
pub const DEFAULT_ACTION_SCHEMES: [&str; 6] =
    ["log", "test", "http", "https", "trust+http", "trust+https"];

/// Validates ok/alarm/insufficient-data action URLs
#[derive(Debug, Clone)]
pub struct ActionValidator {
    schemes: Vec<String>,
}

impl ActionValidator {
    pub fn new(schemes: Vec<String>) -> Self {
        Self { schemes }
    }

    pub fn validate(&self, request: &AlarmRequest) -> Result<(), ValidationError> {
        for (_, actions) in request.actions() {
            for action in actions {
                self.validate_action(action)?;
            }
        }
        Ok(())
    }

    pub fn validate_action(&self, action: &str) -> Result<(), ValidationError> {
        let url = Url::parse(action).map_err(|_| {
            ValidationError::InvalidInput(format!("Unable to parse action {}", action))
        })?;

        if !self.schemes.iter().any(|s| s == url.scheme()) {
            return Err(ValidationError::InvalidInput(format!(
                "Unsupported action {}",
                action
            )));
        }
        Ok(())
    }
}

impl Default for ActionValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ACTION_SCHEMES.iter().map(|s| s.to_string()).collect())
    }
}
