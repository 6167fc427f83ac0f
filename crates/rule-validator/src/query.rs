//! Threshold Query Normalization

use alarm_model::{QueryOp, QueryPredicate, ValueType};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::ValidationError;

/// Fields owned by the evaluator's sliding window
pub const TIMESTAMP_FIELDS: [&str; 4] = [
    "timestamp",
    "start_timestamp",
    "end_timestamp",
    "search_offset",
];

/// Field binding a query to the alarm's project
pub const OWNERSHIP_FIELD: &str = "project_id";

/// Parse an RFC 3339 timestamp, or a naive one taken as UTC
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|at| at.and_utc())
        })
        .ok()
}

/// Check that a predicate value parses as its declared type
pub fn check_value_type(predicate: &QueryPredicate) -> Result<(), ValidationError> {
    let Some(value_type) = predicate.value_type else {
        return Ok(());
    };
    let value = predicate.value.as_str();

    let valid = match value_type {
        ValueType::String => true,
        ValueType::Integer => value.parse::<i64>().is_ok(),
        ValueType::Float => value.parse::<f64>().is_ok(),
        ValueType::Boolean => {
            value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
        }
        ValueType::Datetime => parse_datetime(value).is_some(),
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidInput(format!(
            "Unable to convert the value {} from field {} to {:?}",
            value, predicate.field, value_type
        )))
    }
}

/// Normalize a threshold rule query for the owning project
///
/// Timestamp predicates are rejected, every value must match its declared
/// type, and the result carries exactly one `project_id eq <project>`
/// predicate.
pub fn sanitize_threshold_query(
    query: &[QueryPredicate],
    project_id: &str,
) -> Result<Vec<QueryPredicate>, ValidationError> {
    let mut sanitized = Vec::with_capacity(query.len() + 1);
    let mut has_owner = false;

    for predicate in query {
        if TIMESTAMP_FIELDS.contains(&predicate.field.as_str()) {
            return Err(ValidationError::InvalidInput(format!(
                "Unknown argument: \"{}\": timestamps are not allowed in alarm rule queries",
                predicate.field
            )));
        }
        check_value_type(predicate)?;

        if predicate.field == OWNERSHIP_FIELD {
            if predicate.op != QueryOp::Eq || predicate.value != project_id {
                return Err(ValidationError::NotAuthorized(predicate.value.clone()));
            }
            if has_owner {
                continue;
            }
            has_owner = true;
        }
        sanitized.push(predicate.clone());
    }

    if !has_owner {
        sanitized.push(QueryPredicate::eq(OWNERSHIP_FIELD, project_id));
    }
    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_count(query: &[QueryPredicate]) -> usize {
        query.iter().filter(|p| p.field == OWNERSHIP_FIELD).count()
    }

    #[test]
    fn test_injects_ownership() {
        let query = vec![QueryPredicate::eq("resource_id", "r1")];
        let sanitized = sanitize_threshold_query(&query, "p1").unwrap();
        assert_eq!(sanitized.len(), 2);
        assert_eq!(sanitized[1], QueryPredicate::eq("project_id", "p1"));
    }

    #[test]
    fn test_datetime_values() {
        let typed = |value: &str| {
            QueryPredicate::new("started", QueryOp::Ge, value).with_type(ValueType::Datetime)
        };
        assert!(check_value_type(&typed("2014-03-01T12:00:00")).is_ok());
        assert!(check_value_type(&typed("2014-03-01T12:00:00.5")).is_ok());
        assert!(check_value_type(&typed("2014-03-01T12:00:00+02:00")).is_ok());
        assert!(check_value_type(&typed("yesterday")).is_err());

        assert_eq!(
            parse_datetime("2014-03-01T12:00:00.5"),
            parse_datetime("2014-03-01T12:00:00.500Z")
        );
    }

    #[test]
    fn test_idempotent() {
        let once = sanitize_threshold_query(&[], "p1").unwrap();
        let twice = sanitize_threshold_query(&once, "p1").unwrap();
        assert_eq!(once, twice);
        assert_eq!(owner_count(&twice), 1);
    }

    #[test]
    fn test_collapses_duplicate_ownership() {
        let query = vec![
            QueryPredicate::eq("project_id", "p1"),
            QueryPredicate::eq("project_id", "p1"),
        ];
        let sanitized = sanitize_threshold_query(&query, "p1").unwrap();
        assert_eq!(owner_count(&sanitized), 1);
    }

    #[test]
    fn test_foreign_project_rejected() {
        let query = vec![QueryPredicate::eq("project_id", "p2")];
        assert!(matches!(
            sanitize_threshold_query(&query, "p1"),
            Err(ValidationError::NotAuthorized(_))
        ));
    }

    #[test]
    fn test_timestamp_rejected() {
        let query = vec![QueryPredicate::new(
            "timestamp",
            QueryOp::Gt,
            "2014-01-01T00:00:00",
        )];
        assert!(matches!(
            sanitize_threshold_query(&query, "p1"),
            Err(ValidationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_value_types() {
        let ok = QueryPredicate::eq("count", "42").with_type(ValueType::Integer);
        let bad = QueryPredicate::eq("count", "forty").with_type(ValueType::Integer);
        let flag = QueryPredicate::eq("metadata.flag", "True").with_type(ValueType::Boolean);
        let when = QueryPredicate::eq("metadata.when", "2014-03-01T12:00:00")
            .with_type(ValueType::Datetime);

        assert!(check_value_type(&ok).is_ok());
        assert!(check_value_type(&bad).is_err());
        assert!(check_value_type(&flag).is_ok());
        assert!(check_value_type(&when).is_ok());
    }
}
