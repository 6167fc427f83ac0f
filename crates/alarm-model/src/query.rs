//! Query Predicates
//!
//! `(field, op, value, type)` tuples used both for threshold rule series
//! selection and for filtering alarm and history listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// Comparison operator of a query predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOp {
    Lt,
    Le,
    #[default]
    Eq,
    Ne,
    Ge,
    Gt,
}

impl QueryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOp::Lt => "lt",
            QueryOp::Le => "le",
            QueryOp::Eq => "eq",
            QueryOp::Ne => "ne",
            QueryOp::Ge => "ge",
            QueryOp::Gt => "gt",
        }
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryOp {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" => Ok(QueryOp::Lt),
            "le" => Ok(QueryOp::Le),
            "eq" => Ok(QueryOp::Eq),
            "ne" => Ok(QueryOp::Ne),
            "ge" => Ok(QueryOp::Ge),
            "gt" => Ok(QueryOp::Gt),
            other => Err(ModelError::UnknownVariant {
                kind: "query operator",
                value: other.to_string(),
            }),
        }
    }
}

/// Declared type of a predicate value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    Float,
    String,
    Boolean,
    Datetime,
}

impl FromStr for ValueType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(ValueType::Integer),
            "float" => Ok(ValueType::Float),
            "string" => Ok(ValueType::String),
            "boolean" => Ok(ValueType::Boolean),
            "datetime" => Ok(ValueType::Datetime),
            other => Err(ModelError::UnknownVariant {
                kind: "value type",
                value: other.to_string(),
            }),
        }
    }
}

/// A single query predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPredicate {
    pub field: String,
    #[serde(default)]
    pub op: QueryOp,
    pub value: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
}

impl QueryPredicate {
    /// Equality predicate with no declared type
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: QueryOp::Eq,
            value: value.into(),
            value_type: None,
        }
    }

    /// Predicate with an explicit operator
    pub fn new(field: impl Into<String>, op: QueryOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            value_type: None,
        }
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }
}
