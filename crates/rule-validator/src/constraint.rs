//! Time Constraint Validator

use alarm_model::TimeConstraint;
use chrono_tz::Tz;
use cron::Schedule;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

use crate::error::ValidationError;

/// Validates the time constraints attached to an alarm
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeConstraintValidator;

impl TimeConstraintValidator {
    pub fn new() -> Self {
        Self
    }

    /// Parse a cron start expression
    ///
    /// Standard five-field expressions are accepted by pinning the seconds
    /// field to zero and translating crontab day-of-week numbers (0-7,
    /// Sunday as 0 or 7) to the scheduler's 1-7 numbering. Six and seven
    /// field expressions are parsed as given.
    pub fn parse_start(expression: &str) -> Result<Schedule, ValidationError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let normalized = match fields.as_slice() {
            [minute, hour, day, month, weekday] => {
                let weekday = crontab_weekday(weekday).unwrap_or_else(|| weekday.to_string());
                format!("0 {} {} {} {} {}", minute, hour, day, month, weekday)
            }
            _ => expression.trim().to_string(),
        };

        Schedule::from_str(&normalized).map_err(|e| {
            ValidationError::InvalidInput(format!(
                "Invalid input for field/attribute start. Value: '{}'. {}",
                expression, e
            ))
        })
    }

    /// Check a timezone against the IANA database
    pub fn check_timezone(timezone: &str) -> Result<(), ValidationError> {
        timezone
            .parse::<Tz>()
            .map(|_| ())
            .map_err(|_| ValidationError::InvalidInput(format!("Timezone {} is not valid", timezone)))
    }

    /// Validate each constraint, then require names to be unique
    pub fn validate(&self, constraints: &[TimeConstraint]) -> Result<(), ValidationError> {
        for constraint in constraints {
            Self::parse_start(&constraint.start)?;

            if constraint.duration < 0 {
                return Err(ValidationError::InvalidInput(format!(
                    "Invalid input for field/attribute duration. Value: '{}'. \
                     Value should be greater or equal to 0",
                    constraint.duration
                )));
            }

            if let Some(timezone) = constraint.timezone.as_deref().filter(|tz| !tz.is_empty()) {
                Self::check_timezone(timezone)?;
            }
        }

        let mut names = HashSet::with_capacity(constraints.len());
        if !constraints.iter().all(|c| names.insert(c.name.as_str())) {
            return Err(ValidationError::DuplicateName(
                "Time constraint names must be unique for a given alarm.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rewrite a numeric crontab day-of-week field as an explicit 1-7 list
///
/// Returns `None` for wildcards, day names and anything unparseable, which
/// are left for the scheduler to accept or reject.
fn crontab_weekday(field: &str) -> Option<String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut days = BTreeSet::new();
    for element in field.split(',') {
        let (range, step) = match element.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
            None => (element, 1),
        };
        let (start, end) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((start, end)) => (start.parse::<u8>().ok()?, end.parse::<u8>().ok()?),
                None => {
                    let start = range.parse::<u8>().ok()?;
                    (start, if element.contains('/') { start.max(6) } else { start })
                }
            },
        };
        if start > end || end > 7 {
            return None;
        }
        days.extend((start..=end).step_by(step).map(|day| day % 7 + 1));
    }

    Some(
        days.iter()
            .map(|day| day.to_string())
            .collect::<Vec<_>>()
            .join(","),
    )
}
