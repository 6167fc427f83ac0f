//! Alarm Rule Validation
//!
//! Validation and normalization of alarm candidates: rule bodies, threshold
//! queries, action URLs and time constraints.

mod action;
mod constraint;
mod error;
mod query;
mod rule;

pub use action::{ActionValidator, DEFAULT_ACTION_SCHEMES};
pub use constraint::TimeConstraintValidator;
pub use error::ValidationError;
pub use query::{
    check_value_type, parse_datetime, sanitize_threshold_query, OWNERSHIP_FIELD, TIMESTAMP_FIELDS,
};
pub use rule::{dedupe_alarm_ids, RuleValidator};
