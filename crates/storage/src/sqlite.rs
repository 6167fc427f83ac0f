//! SQLite Repository
//!
//! Alarms are stored as JSON documents alongside the columns used for
//! filtering; the `(project_id, name)` pair carries a unique index so name
//! collisions are rejected by the database as well as by the service.

use alarm_model::{Alarm, AlarmChange, ChangeKind};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::repository::{AlarmFilter, AlarmRepository, ChangeFilter};
use crate::StorageError;

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS alarms (
        alarm_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        project_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        state TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        meter_name TEXT,
        body TEXT NOT NULL,
        UNIQUE (project_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS alarm_history (
        event_id TEXT PRIMARY KEY,
        alarm_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        detail TEXT NOT NULL,
        user_id TEXT,
        project_id TEXT,
        on_behalf_of TEXT,
        timestamp TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_alarms_user ON alarms (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_history_alarm ON alarm_history (alarm_id, timestamp)",
];

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("bad timestamp {}: {}", text, e)))
}

/// Repository backed by a SQLite database
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `url` and apply the schema
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to an in-memory database sees its own database
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repository = Self { pool };
        repository.migrate().await?;
        info!("Opened SQLite alarm repository at {}", url);
        Ok(repository)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn decode_alarm(row: &SqliteRow) -> Result<Alarm, StorageError> {
        let body: String = row.try_get("body")?;
        Ok(serde_json::from_str(&body)?)
    }

    fn decode_change(row: &SqliteRow) -> Result<AlarmChange, StorageError> {
        let event_id: String = row.try_get("event_id")?;
        let alarm_id: String = row.try_get("alarm_id")?;
        let kind: String = row.try_get("kind")?;
        let timestamp: String = row.try_get("timestamp")?;

        Ok(AlarmChange {
            event_id: parse_uuid(&event_id)?,
            alarm_id: parse_uuid(&alarm_id)?,
            kind: ChangeKind::from_str(&kind)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?,
            detail: row.try_get("detail")?,
            user_id: row.try_get("user_id")?,
            project_id: row.try_get("project_id")?,
            on_behalf_of: row.try_get("on_behalf_of")?,
            timestamp: parse_timestamp(&timestamp)?,
        })
    }
}

fn parse_uuid(text: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(text).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn meter_of(alarm: &Alarm) -> Option<String> {
    alarm.rule.threshold().map(|rule| rule.meter_name.clone())
}

#[async_trait]
impl AlarmRepository for SqliteRepository {
    async fn list_alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>, StorageError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT body FROM alarms WHERE 1 = 1");

        if let Some(alarm_id) = filter.alarm_id {
            query.push(" AND alarm_id = ").push_bind(alarm_id.to_string());
        }
        if let Some(name) = &filter.name {
            query.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(project_id) = &filter.project_id {
            query.push(" AND project_id = ").push_bind(project_id.clone());
        }
        if let Some(enabled) = filter.enabled {
            query.push(" AND enabled = ").push_bind(enabled);
        }
        if let Some(state) = filter.state {
            query.push(" AND state = ").push_bind(state.as_str());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(meter) = &filter.meter {
            query.push(" AND meter_name = ").push_bind(meter.clone());
        }
        query.push(" ORDER BY name");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_alarm).collect()
    }

    async fn create_alarm(&self, alarm: Alarm) -> Result<Alarm, StorageError> {
        let body = serde_json::to_string(&alarm)?;

        sqlx::query(
            "INSERT INTO alarms
                (alarm_id, name, project_id, user_id, kind, state, enabled, meter_name, body)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(alarm.alarm_id.to_string())
        .bind(&alarm.name)
        .bind(&alarm.project_id)
        .bind(&alarm.user_id)
        .bind(alarm.kind().as_str())
        .bind(alarm.state.as_str())
        .bind(alarm.enabled)
        .bind(meter_of(&alarm))
        .bind(body)
        .execute(&self.pool)
        .await?;

        debug!(alarm_id = %alarm.alarm_id, "Inserted alarm");
        Ok(alarm)
    }

    async fn update_alarm(&self, alarm: Alarm) -> Result<Alarm, StorageError> {
        let body = serde_json::to_string(&alarm)?;

        let result = sqlx::query(
            "UPDATE alarms
                SET name = ?, project_id = ?, user_id = ?, kind = ?, state = ?,
                    enabled = ?, meter_name = ?, body = ?
              WHERE alarm_id = ?",
        )
        .bind(&alarm.name)
        .bind(&alarm.project_id)
        .bind(&alarm.user_id)
        .bind(alarm.kind().as_str())
        .bind(alarm.state.as_str())
        .bind(alarm.enabled)
        .bind(meter_of(&alarm))
        .bind(body)
        .bind(alarm.alarm_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        debug!(alarm_id = %alarm.alarm_id, "Updated alarm");
        Ok(alarm)
    }

    async fn delete_alarm(&self, alarm_id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM alarms WHERE alarm_id = ?")
            .bind(alarm_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn record_change(&self, change: AlarmChange) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO alarm_history
                (event_id, alarm_id, kind, detail, user_id, project_id, on_behalf_of, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(change.event_id.to_string())
        .bind(change.alarm_id.to_string())
        .bind(change.kind.as_str())
        .bind(&change.detail)
        .bind(&change.user_id)
        .bind(&change.project_id)
        .bind(&change.on_behalf_of)
        .bind(format_timestamp(&change.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_changes(
        &self,
        alarm_id: Uuid,
        on_behalf_of: Option<&str>,
        filter: &ChangeFilter,
    ) -> Result<Vec<AlarmChange>, StorageError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT event_id, alarm_id, kind, detail, user_id, project_id, on_behalf_of, timestamp
               FROM alarm_history WHERE alarm_id = ",
        );
        query.push_bind(alarm_id.to_string());

        if let Some(project) = on_behalf_of {
            query.push(" AND on_behalf_of = ").push_bind(project.to_string());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(project_id) = &filter.project_id {
            query.push(" AND project_id = ").push_bind(project_id.clone());
        }
        if let Some(bound) = filter.start {
            query.push(if bound.inclusive { " AND timestamp >= " } else { " AND timestamp > " });
            query.push_bind(format_timestamp(&bound.at));
        }
        if let Some(bound) = filter.end {
            query.push(if bound.inclusive { " AND timestamp <= " } else { " AND timestamp < " });
            query.push_bind(format_timestamp(&bound.at));
        }
        query.push(" ORDER BY timestamp DESC, rowid DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_change).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::TimeBound;
    use alarm_model::{AlarmState, ThresholdRule};
    use chrono::Duration;

    async fn repository() -> SqliteRepository {
        SqliteRepository::connect("sqlite::memory:").await.unwrap()
    }

    fn alarm(name: &str, project: &str, meter: &str) -> Alarm {
        let now = Utc::now();
        Alarm {
            alarm_id: Uuid::new_v4(),
            name: name.to_string(),
            description: Some("stored".to_string()),
            enabled: true,
            ok_actions: Vec::new(),
            alarm_actions: vec!["log://".to_string()],
            insufficient_data_actions: Vec::new(),
            repeat_actions: false,
            rule: ThresholdRule::new(meter, 80.0).into(),
            time_constraints: Vec::new(),
            user_id: "u1".to_string(),
            project_id: project.to_string(),
            state: AlarmState::Ok,
            state_timestamp: now,
            timestamp: now,
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_filters() {
        let repo = repository().await;
        let stored = repo.create_alarm(alarm("cpu-high", "p1", "cpu_util")).await.unwrap();
        repo.create_alarm(alarm("disk-full", "p1", "disk.usage")).await.unwrap();

        let by_id = repo
            .list_alarms(&AlarmFilter::new().alarm_id(stored.alarm_id))
            .await
            .unwrap();
        assert_eq!(by_id, vec![stored]);

        let by_meter = repo
            .list_alarms(&AlarmFilter {
                meter: Some("disk.usage".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_meter.len(), 1);
        assert_eq!(by_meter[0].name, "disk-full");
    }

    #[tokio::test]
    async fn test_unique_index_is_conflict() {
        let repo = repository().await;
        repo.create_alarm(alarm("cpu-high", "p1", "cpu_util")).await.unwrap();

        let err = repo
            .create_alarm(alarm("cpu-high", "p1", "cpu_util"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        repo.create_alarm(alarm("cpu-high", "p2", "cpu_util")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_delete() {
        let repo = repository().await;
        let mut stored = repo.create_alarm(alarm("cpu-high", "p1", "cpu_util")).await.unwrap();

        stored.state = AlarmState::Alarm;
        repo.update_alarm(stored.clone()).await.unwrap();
        let alarms = repo
            .list_alarms(&AlarmFilter {
                state: Some(AlarmState::Alarm),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(alarms.len(), 1);

        repo.delete_alarm(stored.alarm_id).await.unwrap();
        assert!(matches!(
            repo.delete_alarm(stored.alarm_id).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_history_outlives_alarm() {
        let repo = repository().await;
        let stored = repo.create_alarm(alarm("cpu-high", "p1", "cpu_util")).await.unwrap();
        let now = Utc::now();

        for (kind, age) in [(ChangeKind::Creation, 20), (ChangeKind::Deletion, 0)] {
            repo.record_change(AlarmChange {
                event_id: Uuid::new_v4(),
                alarm_id: stored.alarm_id,
                kind,
                detail: "{}".to_string(),
                user_id: Some("u1".to_string()),
                project_id: Some("p1".to_string()),
                on_behalf_of: Some("p1".to_string()),
                timestamp: now - Duration::seconds(age),
            })
            .await
            .unwrap();
        }
        repo.delete_alarm(stored.alarm_id).await.unwrap();

        let changes = repo
            .list_changes(stored.alarm_id, Some("p1"), &ChangeFilter::default())
            .await
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Deletion);

        let recent = ChangeFilter {
            start: Some(TimeBound {
                at: now - Duration::seconds(10),
                inclusive: true,
            }),
            ..Default::default()
        };
        let changes = repo
            .list_changes(stored.alarm_id, Some("p1"), &recent)
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);

        let hidden = repo
            .list_changes(stored.alarm_id, Some("p2"), &ChangeFilter::default())
            .await
            .unwrap();
        assert!(hidden.is_empty());
    }
}
