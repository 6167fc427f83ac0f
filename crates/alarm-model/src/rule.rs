//! Alarm Rules
//!
//! Threshold rules compare a statistic of a telemetry query against a
//! numeric threshold; combination rules derive state from other alarms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::query::QueryPredicate;
use crate::ModelError;

/// Statistic computed over each evaluation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Max,
    Min,
    #[default]
    Avg,
    Sum,
    Count,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::Avg => "avg",
            Statistic::Sum => "sum",
            Statistic::Count => "count",
        };
        f.write_str(name)
    }
}

/// Comparison between the statistic and the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Lt,
    Le,
    #[default]
    Eq,
    Ne,
    Ge,
    Gt,
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComparisonOperator::Lt => "lt",
            ComparisonOperator::Le => "le",
            ComparisonOperator::Eq => "eq",
            ComparisonOperator::Ne => "ne",
            ComparisonOperator::Ge => "ge",
            ComparisonOperator::Gt => "gt",
        };
        f.write_str(name)
    }
}

/// Threshold rule body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Name of the meter to query
    pub meter_name: String,
    /// Series selection; ownership is added during validation
    #[serde(default)]
    pub query: Vec<QueryPredicate>,
    /// Sliding window length in seconds
    #[serde(default = "default_period")]
    pub period: i64,
    #[serde(default)]
    pub comparison_operator: ComparisonOperator,
    pub threshold: f64,
    #[serde(default)]
    pub statistic: Statistic,
    /// Number of consecutive periods evaluated
    #[serde(default = "default_evaluation_periods")]
    pub evaluation_periods: i64,
    /// Exclude datapoints with anomalously low sample counts
    #[serde(default)]
    pub exclude_outliers: bool,
}

fn default_period() -> i64 {
    60
}

fn default_evaluation_periods() -> i64 {
    1
}

impl ThresholdRule {
    /// Create a rule with default period, statistic and operator
    pub fn new(meter_name: impl Into<String>, threshold: f64) -> Self {
        Self {
            meter_name: meter_name.into(),
            query: Vec::new(),
            period: default_period(),
            comparison_operator: ComparisonOperator::default(),
            threshold,
            statistic: Statistic::default(),
            evaluation_periods: default_evaluation_periods(),
            exclude_outliers: false,
        }
    }

    pub fn with_query(mut self, query: Vec<QueryPredicate>) -> Self {
        self.query = query;
        self
    }

    pub fn with_period(mut self, period: i64) -> Self {
        self.period = period;
        self
    }

    pub fn with_operator(mut self, operator: ComparisonOperator) -> Self {
        self.comparison_operator = operator;
        self
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn with_evaluation_periods(mut self, periods: i64) -> Self {
        self.evaluation_periods = periods;
        self
    }

    pub fn excluding_outliers(mut self) -> Self {
        self.exclude_outliers = true;
        self
    }

    /// Description used when the alarm carries no explicit one
    pub fn default_description(&self) -> String {
        format!(
            "Alarm when {} is {} a {} of {} over {} seconds",
            self.meter_name, self.comparison_operator, self.statistic, self.threshold, self.period
        )
    }
}

/// Boolean combinator over member alarm states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => f.write_str("and"),
            Combinator::Or => f.write_str("or"),
        }
    }
}

/// Combination rule body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationRule {
    #[serde(default)]
    pub operator: Combinator,
    pub alarm_ids: Vec<Uuid>,
}

impl CombinationRule {
    pub fn new(operator: Combinator, alarm_ids: Vec<Uuid>) -> Self {
        Self { operator, alarm_ids }
    }

    pub fn default_description(&self) -> String {
        let joiner = format!(" {} ", self.operator);
        let ids: Vec<String> = self.alarm_ids.iter().map(Uuid::to_string).collect();
        format!("Combined state of alarms {}", ids.join(&joiner))
    }
}

/// Rule type discriminator as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Threshold,
    Combination,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Threshold => "threshold",
            RuleKind::Combination => "combination",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(RuleKind::Threshold),
            "combination" => Ok(RuleKind::Combination),
            other => Err(ModelError::UnknownVariant {
                kind: "alarm type",
                value: other.to_string(),
            }),
        }
    }
}

/// Validated rule attached to an alarm
///
/// Serialized as the `type` discriminator next to a `threshold_rule` or
/// `combination_rule` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AlarmRule {
    Threshold { threshold_rule: ThresholdRule },
    Combination { combination_rule: CombinationRule },
}

impl AlarmRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            AlarmRule::Threshold { .. } => RuleKind::Threshold,
            AlarmRule::Combination { .. } => RuleKind::Combination,
        }
    }

    pub fn threshold(&self) -> Option<&ThresholdRule> {
        match self {
            AlarmRule::Threshold { threshold_rule } => Some(threshold_rule),
            AlarmRule::Combination { .. } => None,
        }
    }

    pub fn combination(&self) -> Option<&CombinationRule> {
        match self {
            AlarmRule::Combination { combination_rule } => Some(combination_rule),
            AlarmRule::Threshold { .. } => None,
        }
    }
}

impl From<ThresholdRule> for AlarmRule {
    fn from(threshold_rule: ThresholdRule) -> Self {
        AlarmRule::Threshold { threshold_rule }
    }
}

impl From<CombinationRule> for AlarmRule {
    fn from(combination_rule: CombinationRule) -> Self {
        AlarmRule::Combination { combination_rule }
    }
}

/// Description derived from a rule
pub fn derive_description(rule: &AlarmRule) -> String {
    match rule {
        AlarmRule::Threshold { threshold_rule } => threshold_rule.default_description(),
        AlarmRule::Combination { combination_rule } => combination_rule.default_description(),
    }
}
