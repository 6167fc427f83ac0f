//! Alarm Model
//!
//! Alarm definitions, threshold and combination rules, time constraints,
//! query predicates and change-history records shared across the service.

mod alarm;
mod change;
mod constraint;
mod query;
mod rule;

pub use alarm::{Alarm, AlarmRequest, AlarmState, AlarmView, TimeConstraintView};
pub use change::{AlarmChange, ChangeKind, ChangeNotification};
pub use constraint::TimeConstraint;
pub use query::{QueryOp, QueryPredicate, ValueType};
pub use rule::{
    derive_description, AlarmRule, CombinationRule, Combinator, ComparisonOperator, RuleKind,
    Statistic, ThresholdRule,
};

use thiserror::Error;

/// Errors parsing model values from text
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
