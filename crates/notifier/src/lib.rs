//! Alarm Change Notifier
//!
//! Publishes alarm change events. The MQTT notifier is used in deployments;
//! the log and memory notifiers serve local runs and tests.

mod mqtt;

use alarm_model::ChangeNotification;
use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

pub use mqtt::{MqttConfig, MqttNotifier};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Publish error: {0}")]
    Publish(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Sink for alarm change events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, payload: &ChangeNotification) -> Result<(), NotifyError>;
}

/// Writes every change event to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, topic: &str, payload: &ChangeNotification) -> Result<(), NotifyError> {
        let detail = serde_json::to_string(&payload.detail)
            .map_err(|e| NotifyError::Serialization(e.to_string()))?;
        info!(
            topic,
            alarm_id = %payload.alarm_id,
            event_id = %payload.event_id,
            %detail,
            "Alarm change"
        );
        Ok(())
    }
}

/// Keeps published events in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<(String, ChangeNotification)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, oldest first
    pub fn published(&self) -> Vec<(String, ChangeNotification)> {
        self.published
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|(topic, _)| topic).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.published.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, topic: &str, payload: &ChangeNotification) -> Result<(), NotifyError> {
        let mut events = self
            .published
            .lock()
            .map_err(|e| NotifyError::Publish(e.to_string()))?;
        events.push((topic.to_string(), payload.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_model::ChangeKind;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn notification(kind: ChangeKind) -> ChangeNotification {
        ChangeNotification {
            event_id: Uuid::new_v4(),
            alarm_id: Uuid::new_v4(),
            kind,
            detail: json!({"state": "alarm"}),
            user_id: Some("u1".to_string()),
            project_id: Some("p1".to_string()),
            on_behalf_of: Some("p1".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_notifier_records_in_order() {
        let notifier = MemoryNotifier::new();
        let first = notification(ChangeKind::Creation);
        let second = notification(ChangeKind::StateTransition);

        notifier.publish(&first.kind.topic(), &first).await.unwrap();
        notifier.publish(&second.kind.topic(), &second).await.unwrap();

        assert_eq!(
            notifier.topics(),
            vec!["alarm.creation".to_string(), "alarm.state_transition".to_string()]
        );
        assert_eq!(notifier.published()[1].1.event_id, second.event_id);

        notifier.clear();
        assert!(notifier.published().is_empty());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_events() {
        let notifier = LogNotifier;
        let event = notification(ChangeKind::Deletion);
        assert!(notifier.publish(&event.kind.topic(), &event).await.is_ok());
    }
}
