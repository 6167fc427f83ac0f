//! Route Handlers

pub mod alarms;
pub mod history;
pub mod state;

use alarm_model::{QueryOp, QueryPredicate, ValueType};
use url::form_urlencoded;
use uuid::Uuid;

use crate::error::ApiError;
use crate::policy::{Credentials, Target};

/// Policy target for an action by the caller, optionally on one alarm
pub(crate) fn policy_target(credentials: &Credentials, alarm_id: Option<Uuid>) -> Target {
    let mut target = Target::from([
        ("user_id".to_string(), credentials.user_id.clone()),
        ("project_id".to_string(), credentials.project_id.clone()),
    ]);
    if let Some(alarm_id) = alarm_id {
        target.insert("alarm_id".to_string(), alarm_id.to_string());
    }
    target
}

/// Parse `q.field` / `q.op` / `q.value` / `q.type` parameters
///
/// Repeated parameters are grouped by position. `q.op` and `q.type` may be
/// omitted entirely; when given they must appear once per field.
pub fn parse_query(raw: Option<&str>) -> Result<Vec<QueryPredicate>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let mut fields = Vec::new();
    let mut ops = Vec::new();
    let mut values = Vec::new();
    let mut types = Vec::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            "q.field" => fields.push(value.into_owned()),
            "q.op" => ops.push(value.into_owned()),
            "q.value" => values.push(value.into_owned()),
            "q.type" => types.push(value.into_owned()),
            _ => {}
        }
    }

    let count = fields.len();
    if values.len() != count
        || !(ops.is_empty() || ops.len() == count)
        || !(types.is_empty() || types.len() == count)
    {
        return Err(ApiError::BadRequest(
            "Query fields, operators, values and types must pair up".to_string(),
        ));
    }

    fields
        .into_iter()
        .zip(values)
        .enumerate()
        .map(|(i, (field, value))| -> Result<QueryPredicate, ApiError> {
            let op = match ops.get(i).filter(|op| !op.is_empty()) {
                Some(op) => op
                    .parse::<QueryOp>()
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                None => QueryOp::Eq,
            };
            let mut predicate = QueryPredicate::new(field, op, value);
            if let Some(value_type) = types.get(i).filter(|t| !t.is_empty()) {
                predicate = predicate.with_type(
                    value_type
                        .parse::<ValueType>()
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            Ok(predicate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grouped_by_position() {
        let query = parse_query(Some(
            "q.field=state&q.field=name&q.op=eq&q.op=eq&q.value=alarm&q.value=cpu%20high",
        ))
        .unwrap();
        assert_eq!(
            query,
            vec![
                QueryPredicate::eq("state", "alarm"),
                QueryPredicate::eq("name", "cpu high"),
            ]
        );
    }

    #[test]
    fn test_parse_defaults_and_types() {
        let query = parse_query(Some(
            "q.field=timestamp&q.op=ge&q.value=2024-01-01T00:00:00&q.type=datetime",
        ))
        .unwrap();
        assert_eq!(
            query,
            vec![QueryPredicate::new("timestamp", QueryOp::Ge, "2024-01-01T00:00:00")
                .with_type(ValueType::Datetime)]
        );

        assert!(parse_query(None).unwrap().is_empty());
        assert_eq!(parse_query(Some("q.field=name&q.value=x")).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejects_mismatch() {
        assert!(parse_query(Some("q.field=name")).is_err());
        assert!(parse_query(Some("q.field=a&q.field=b&q.value=1&q.value=2&q.op=eq")).is_err());
        assert!(parse_query(Some("q.field=a&q.value=1&q.op=like")).is_err());
    }
}
