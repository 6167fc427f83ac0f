//! Change History Recording

use alarm_model::{AlarmChange, ChangeKind, ChangeNotification};
use chrono::{DateTime, Utc};
use notifier::Notifier;
use serde_json::{Map, Value};
use std::sync::Arc;
use storage::{AlarmRepository, StorageError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ownership::CallerIdentity;

/// Fields never reported in a rule change
const VOLATILE_FIELDS: [&str; 2] = ["timestamp", "state_timestamp"];

/// Fields of `after` that differ from `before`, ignoring mutation stamps
pub fn diff_snapshots(before: &Map<String, Value>, after: &Map<String, Value>) -> Map<String, Value> {
    after
        .iter()
        .filter(|(key, _)| !VOLATILE_FIELDS.contains(&key.as_str()))
        .filter(|(key, value)| before.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Persists and publishes alarm change events
pub struct ChangeHistoryRecorder {
    repository: Arc<dyn AlarmRepository>,
    notifier: Arc<dyn Notifier>,
    record_history: bool,
}

impl ChangeHistoryRecorder {
    pub fn new(
        repository: Arc<dyn AlarmRepository>,
        notifier: Arc<dyn Notifier>,
        record_history: bool,
    ) -> Self {
        Self {
            repository,
            notifier,
            record_history,
        }
    }

    /// Record one change
    ///
    /// The notification is published even when persisting fails; the
    /// persistence error, if any, is returned afterwards. Backends without
    /// history support are skipped silently.
    pub async fn record(
        &self,
        kind: ChangeKind,
        detail: Value,
        alarm_id: Uuid,
        caller: &CallerIdentity,
        on_behalf_of: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AlarmChange, StorageError> {
        let notification = ChangeNotification {
            event_id: Uuid::new_v4(),
            alarm_id,
            kind,
            detail,
            user_id: Some(caller.user_id.clone()),
            project_id: Some(caller.project_id.clone()),
            on_behalf_of: Some(on_behalf_of.to_string()),
            timestamp,
        };
        let record = notification.to_record()?;

        let persisted = if self.record_history {
            match self.repository.record_change(record.clone()).await {
                Err(StorageError::NotImplemented(what)) => {
                    debug!(what, "History not supported by storage backend");
                    Ok(())
                }
                other => other,
            }
        } else {
            Ok(())
        };

        if let Err(e) = self.notifier.publish(&kind.topic(), &notification).await {
            warn!(%alarm_id, kind = %kind, "Failed to publish alarm change: {}", e);
        }

        if let Err(e) = &persisted {
            warn!(%alarm_id, kind = %kind, "Failed to persist alarm change: {}", e);
        }
        persisted.map(|_| record)
    }
}
