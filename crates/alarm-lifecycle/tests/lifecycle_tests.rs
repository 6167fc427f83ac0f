//! Lifecycle service tests against the in-memory backends

use alarm_lifecycle::{AlarmError, AlarmLifecycleService, CallerIdentity, LifecycleConfig};
use alarm_model::{
    AlarmRequest, AlarmState, ChangeKind, CombinationRule, Combinator, ComparisonOperator,
    QueryPredicate, ThresholdRule, TimeConstraint,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use notifier::MemoryNotifier;
use serde_json::json;
use std::sync::{Arc, Mutex};
use storage::{AlarmRepository, MemoryRepository, StorageError};
use uuid::Uuid;

struct Harness {
    service: AlarmLifecycleService,
    repo: Arc<MemoryRepository>,
    notifier: Arc<MemoryNotifier>,
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Harness {
    fn new(config: LifecycleConfig) -> Self {
        Self::with_repo(config, MemoryRepository::new())
    }

    fn with_repo(config: LifecycleConfig, repo: MemoryRepository) -> Self {
        let repo = Arc::new(repo);
        let notifier = Arc::new(MemoryNotifier::new());
        let now = Arc::new(Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let clock = now.clone();
        let service = AlarmLifecycleService::new(config, repo.clone(), notifier.clone())
            .with_clock(Arc::new(move || *clock.lock().unwrap()));
        Self {
            service,
            repo,
            notifier,
            now,
        }
    }

    fn advance(&self, seconds: i64) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(seconds);
        *now
    }
}

fn user() -> CallerIdentity {
    CallerIdentity::restricted("u1", "p1")
}

fn admin() -> CallerIdentity {
    CallerIdentity::unrestricted("admin", "admin-project")
}

fn cpu_high() -> AlarmRequest {
    AlarmRequest::threshold(
        "cpu-high",
        ThresholdRule::new("cpu_util", 80.0).with_operator(ComparisonOperator::Gt),
    )
}

fn threshold(name: &str) -> AlarmRequest {
    AlarmRequest::threshold(name, ThresholdRule::new("cpu_util", 50.0))
}

#[tokio::test]
async fn test_cpu_high_scenario() {
    let h = Harness::new(LifecycleConfig::default());
    let created_at = *h.now.lock().unwrap();

    let alarm = h.service.create(cpu_high(), &user()).await.unwrap();
    assert_eq!(alarm.state, AlarmState::InsufficientData);
    assert_eq!(alarm.user_id, "u1");
    assert_eq!(alarm.project_id, "p1");
    assert_eq!(alarm.state_timestamp, created_at);
    assert_eq!(
        alarm.description(),
        "Alarm when cpu_util is gt a avg of 80 over 60 seconds"
    );
    let query = &alarm.rule.threshold().unwrap().query;
    assert_eq!(query, &vec![QueryPredicate::eq("project_id", "p1")]);

    let changed_at = h.advance(60);
    let state = h
        .service
        .set_state(alarm.alarm_id, AlarmState::Alarm, &user())
        .await
        .unwrap();
    assert_eq!(state, AlarmState::Alarm);

    let stored = h.service.get(alarm.alarm_id, &user()).await.unwrap();
    assert_eq!(stored.state_timestamp, changed_at);
    assert_eq!(stored.timestamp, changed_at);

    let history = h.service.history(alarm.alarm_id, &[], &user()).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::StateTransition, ChangeKind::Creation]);
    assert_eq!(history[0].detail, r#"{"state":"alarm"}"#);
    assert_eq!(history[0].on_behalf_of.as_deref(), Some("p1"));

    assert_eq!(
        h.notifier.topics(),
        vec!["alarm.creation".to_string(), "alarm.state_transition".to_string()]
    );
}

#[tokio::test]
async fn test_ownership_predicate_stays_single_across_updates() {
    let h = Harness::new(LifecycleConfig::default());
    let alarm = h.service.create(cpu_high(), &user()).await.unwrap();

    let mut current = alarm;
    for round in 0..3 {
        let mut request = cpu_high();
        request.threshold_rule = current.rule.threshold().cloned();
        request.description = Some(format!("round {}", round));
        current = h
            .service
            .update(current.alarm_id, request, &user())
            .await
            .unwrap();

        let owners = current
            .rule
            .threshold()
            .unwrap()
            .query
            .iter()
            .filter(|p| p.field == "project_id")
            .count();
        assert_eq!(owners, 1);
    }
}

#[tokio::test]
async fn test_foreign_project_predicate_rejected() {
    let h = Harness::new(LifecycleConfig::default());
    let mut request = cpu_high();
    request.threshold_rule = Some(
        ThresholdRule::new("cpu_util", 80.0).with_query(vec![QueryPredicate::eq("project_id", "p2")]),
    );

    let err = h.service.create(request, &user()).await.unwrap_err();
    assert!(matches!(err, AlarmError::NotAuthorized(_)));
    assert_eq!(h.repo.alarm_count(), 0);
}

#[tokio::test]
async fn test_combination_ids_deduplicated() {
    let h = Harness::new(LifecycleConfig::default());
    let a = h.service.create(threshold("a"), &user()).await.unwrap();
    let b = h.service.create(threshold("b"), &user()).await.unwrap();

    let rule = CombinationRule::new(Combinator::Or, vec![a.alarm_id, b.alarm_id, a.alarm_id]);
    let combo = h
        .service
        .create(AlarmRequest::combination("both", rule), &user())
        .await
        .unwrap();
    let ids = &combo.rule.combination().unwrap().alarm_ids;
    assert_eq!(ids, &vec![a.alarm_id, b.alarm_id]);

    let single = CombinationRule::new(Combinator::And, vec![a.alarm_id, a.alarm_id]);
    let err = h
        .service
        .create(AlarmRequest::combination("single", single), &user())
        .await
        .unwrap_err();
    assert!(matches!(err, AlarmError::InvalidRule(_)));
}

#[tokio::test]
async fn test_combination_member_must_be_visible() {
    let h = Harness::new(LifecycleConfig::default());
    let mine = h.service.create(threshold("mine"), &user()).await.unwrap();
    let theirs = h
        .service
        .create(threshold("theirs"), &CallerIdentity::restricted("u2", "p2"))
        .await
        .unwrap();

    let rule = CombinationRule::new(Combinator::And, vec![mine.alarm_id, theirs.alarm_id]);
    let err = h
        .service
        .create(AlarmRequest::combination("mixed", rule.clone()), &user())
        .await
        .unwrap_err();
    assert!(matches!(err, AlarmError::AlarmNotFound { alarm_id, .. } if alarm_id == theirs.alarm_id));

    // Unrestricted callers see every project
    assert!(h
        .service
        .create(AlarmRequest::combination("mixed", rule), &admin())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_combination_self_reference_rejected() {
    let h = Harness::new(LifecycleConfig::default());
    let a = h.service.create(threshold("a"), &user()).await.unwrap();
    let b = h.service.create(threshold("b"), &user()).await.unwrap();
    let combo = h
        .service
        .create(
            AlarmRequest::combination(
                "combo",
                CombinationRule::new(Combinator::And, vec![a.alarm_id, b.alarm_id]),
            ),
            &user(),
        )
        .await
        .unwrap();

    let looped = AlarmRequest::combination(
        "combo",
        CombinationRule::new(Combinator::And, vec![a.alarm_id, combo.alarm_id]),
    );
    let err = h
        .service
        .update(combo.alarm_id, looped, &user())
        .await
        .unwrap_err();
    assert!(matches!(err, AlarmError::InvalidRule(_)));
}

#[tokio::test]
async fn test_user_quota_boundary() {
    let config = LifecycleConfig {
        user_alarm_quota: Some(2),
        ..Default::default()
    };
    let h = Harness::new(config);

    h.service.create(threshold("one"), &user()).await.unwrap();
    h.service.create(threshold("two"), &user()).await.unwrap();
    let err = h.service.create(threshold("three"), &user()).await.unwrap_err();
    assert!(matches!(err, AlarmError::QuotaExceeded { .. }));
    assert_eq!(h.repo.alarm_count(), 2);
}

#[tokio::test]
async fn test_project_quota_boundary() {
    let config = LifecycleConfig {
        project_alarm_quota: Some(1),
        ..Default::default()
    };
    let h = Harness::new(config);

    h.service.create(threshold("one"), &user()).await.unwrap();
    let other_user = CallerIdentity::restricted("u2", "p1");
    let err = h.service.create(threshold("two"), &other_user).await.unwrap_err();
    assert!(matches!(err, AlarmError::QuotaExceeded { .. }));

    let other_project = CallerIdentity::restricted("u3", "p3");
    assert!(h.service.create(threshold("two"), &other_project).await.is_ok());
}

#[tokio::test]
async fn test_duplicate_name_per_project() {
    let h = Harness::new(LifecycleConfig::default());
    h.service.create(threshold("dup"), &user()).await.unwrap();

    let err = h.service.create(threshold("dup"), &user()).await.unwrap_err();
    assert!(matches!(err, AlarmError::DuplicateName(_)));

    let elsewhere = CallerIdentity::restricted("u2", "p2");
    assert!(h.service.create(threshold("dup"), &elsewhere).await.is_ok());

    // Renaming onto an existing name in the same project collides too
    let other = h.service.create(threshold("other"), &user()).await.unwrap();
    let err = h
        .service
        .update(other.alarm_id, threshold("dup"), &user())
        .await
        .unwrap_err();
    assert!(matches!(err, AlarmError::DuplicateName(_)));
}

#[tokio::test]
async fn test_update_state_timestamps() {
    let h = Harness::new(LifecycleConfig::default());
    let alarm = h
        .service
        .create(threshold("a").with_state(AlarmState::Ok), &user())
        .await
        .unwrap();
    let created_at = alarm.timestamp;

    // Same state: only the modification stamp moves
    let t1 = h.advance(10);
    let updated = h
        .service
        .update(alarm.alarm_id, threshold("a").with_state(AlarmState::Ok), &user())
        .await
        .unwrap();
    assert_eq!(updated.timestamp, t1);
    assert_eq!(updated.state_timestamp, created_at);

    // Omitted state keeps the stored one
    h.advance(10);
    let updated = h
        .service
        .update(alarm.alarm_id, threshold("a"), &user())
        .await
        .unwrap();
    assert_eq!(updated.state, AlarmState::Ok);
    assert_eq!(updated.state_timestamp, created_at);

    let t3 = h.advance(10);
    let updated = h
        .service
        .update(alarm.alarm_id, threshold("a").with_state(AlarmState::Alarm), &user())
        .await
        .unwrap();
    assert_eq!(updated.state_timestamp, t3);
}

#[tokio::test]
async fn test_rule_change_detail_holds_only_differences() {
    let h = Harness::new(LifecycleConfig::default());
    let alarm = h.service.create(threshold("before"), &user()).await.unwrap();
    h.advance(5);
    h.service
        .update(alarm.alarm_id, threshold("after"), &user())
        .await
        .unwrap();

    let history = h.service.history(alarm.alarm_id, &[], &user()).await.unwrap();
    assert_eq!(history[0].kind, ChangeKind::RuleChange);
    let detail: serde_json::Value = serde_json::from_str(&history[0].detail).unwrap();
    assert_eq!(detail, json!({"name": "after"}));
}

#[tokio::test]
async fn test_history_disabled_still_publishes() {
    let config = LifecycleConfig {
        record_history: false,
        ..Default::default()
    };
    let h = Harness::new(config);

    let alarm = h.service.create(threshold("a"), &user()).await.unwrap();
    h.service
        .update(alarm.alarm_id, threshold("renamed"), &user())
        .await
        .unwrap();
    h.service
        .set_state(alarm.alarm_id, AlarmState::Alarm, &user())
        .await
        .unwrap();
    h.service.delete(alarm.alarm_id, &user()).await.unwrap();

    assert_eq!(h.repo.change_count(), 0);
    let kinds: Vec<_> = h.notifier.published().iter().map(|(_, n)| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ChangeKind::Creation,
            ChangeKind::RuleChange,
            ChangeKind::StateTransition,
            ChangeKind::Deletion,
        ]
    );
}

#[tokio::test]
async fn test_history_write_failure_still_publishes() {
    let h = Harness::with_repo(
        LifecycleConfig::default(),
        MemoryRepository::with_failing_history(),
    );

    let err = h.service.create(threshold("a"), &user()).await.unwrap_err();
    assert!(matches!(
        err,
        AlarmError::Storage(StorageError::DatabaseError(_))
    ));

    // The alarm write stands and the change was still announced
    assert_eq!(h.repo.alarm_count(), 1);
    assert_eq!(h.notifier.topics(), vec!["alarm.creation".to_string()]);
    assert_eq!(h.repo.change_count(), 0);
}

#[tokio::test]
async fn test_backend_without_history() {
    let h = Harness::with_repo(LifecycleConfig::default(), MemoryRepository::without_history());
    let alarm = h.service.create(threshold("a"), &user()).await.unwrap();
    assert_eq!(h.notifier.published().len(), 1);
    assert_eq!(alarm.name, "a");
}

#[tokio::test]
async fn test_delete_keeps_history() {
    let h = Harness::new(LifecycleConfig::default());
    let alarm = h.service.create(threshold("a"), &user()).await.unwrap();
    h.service.delete(alarm.alarm_id, &user()).await.unwrap();

    let err = h.service.get(alarm.alarm_id, &user()).await.unwrap_err();
    assert!(matches!(err, AlarmError::AlarmNotFound { .. }));

    let history = h.service.history(alarm.alarm_id, &[], &user()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, ChangeKind::Deletion);

    let err = h.service.delete(alarm.alarm_id, &user()).await.unwrap_err();
    assert!(matches!(err, AlarmError::AlarmNotFound { .. }));
}

#[tokio::test]
async fn test_restricted_caller_scoping() {
    let h = Harness::new(LifecycleConfig::default());
    let alarm = h.service.create(threshold("a"), &user()).await.unwrap();
    let stranger = CallerIdentity::restricted("u2", "p2");

    assert!(matches!(
        h.service.get(alarm.alarm_id, &stranger).await,
        Err(AlarmError::AlarmNotFound { .. })
    ));
    assert!(h.service.list(&[], &stranger).await.unwrap().is_empty());
    assert!(h
        .service
        .history(alarm.alarm_id, &[], &stranger)
        .await
        .unwrap()
        .is_empty());

    assert_eq!(h.service.list(&[], &admin()).await.unwrap().len(), 1);
    assert!(h.service.get(alarm.alarm_id, &admin()).await.is_ok());
}

#[tokio::test]
async fn test_admin_creates_on_behalf_of_project() {
    let h = Harness::new(LifecycleConfig::default());
    let request = threshold("delegated").with_owner("u7", "p7");

    let alarm = h.service.create(request.clone(), &admin()).await.unwrap();
    assert_eq!(alarm.user_id, "u7");
    assert_eq!(alarm.project_id, "p7");

    let history = h
        .repo
        .list_changes(alarm.alarm_id, Some("p7"), &Default::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_id.as_deref(), Some("admin"));

    let err = h.service.create(request, &user()).await.unwrap_err();
    assert!(matches!(err, AlarmError::NotAuthorized(_)));
}

#[tokio::test]
async fn test_time_constraint_validation() {
    let h = Harness::new(LifecycleConfig::default());

    let request = threshold("tc").with_time_constraint(
        TimeConstraint::new("tz", "0 23 * * *", 60).with_timezone("Mars/Olympus_Mons"),
    );
    assert!(matches!(
        h.service.create(request, &user()).await,
        Err(AlarmError::InvalidInput(_))
    ));

    let request = threshold("tc")
        .with_time_constraint(TimeConstraint::new("w", "0 23 * * *", 60))
        .with_time_constraint(TimeConstraint::new("w", "0 11 * * *", 60));
    assert!(matches!(
        h.service.create(request, &user()).await,
        Err(AlarmError::DuplicateName(_))
    ));
    assert_eq!(h.repo.alarm_count(), 0);
}

#[tokio::test]
async fn test_list_filters() {
    let h = Harness::new(LifecycleConfig::default());
    let a = h.service.create(threshold("a"), &user()).await.unwrap();
    h.service.create(threshold("b"), &user()).await.unwrap();
    h.service
        .set_state(a.alarm_id, AlarmState::Alarm, &user())
        .await
        .unwrap();

    let alarming = h
        .service
        .list(&[QueryPredicate::eq("state", "alarm")], &user())
        .await
        .unwrap();
    assert_eq!(alarming.len(), 1);
    assert_eq!(alarming[0].alarm_id, a.alarm_id);

    let by_name = h
        .service
        .list(&[QueryPredicate::eq("name", "b")], &user())
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
}

#[tokio::test]
async fn test_unknown_alarm_update() {
    let h = Harness::new(LifecycleConfig::default());
    let err = h
        .service
        .update(Uuid::new_v4(), threshold("ghost"), &user())
        .await
        .unwrap_err();
    assert!(matches!(err, AlarmError::AlarmNotFound { .. }));
}
