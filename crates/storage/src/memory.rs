//! In-Memory Repository

use alarm_model::{Alarm, AlarmChange};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::repository::{AlarmFilter, AlarmRepository, ChangeFilter};
use crate::StorageError;

/// Repository kept entirely in process memory
pub struct MemoryRepository {
    /// Live alarm definitions
    alarms: Mutex<Vec<Alarm>>,
    /// Change history, in insertion order
    changes: Mutex<Vec<AlarmChange>>,
    history: HistoryMode,
}

/// How the repository treats change history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryMode {
    Stored,
    NotImplemented,
    /// Writes fail with a database error; reads still work
    FailingWrites,
}

impl MemoryRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory alarm repository");
        Self {
            alarms: Mutex::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
            history: HistoryMode::Stored,
        }
    }

    /// Repository that reports history operations as not implemented
    pub fn without_history() -> Self {
        Self {
            history: HistoryMode::NotImplemented,
            ..Self::new()
        }
    }

    /// Repository whose history writes fail with a database error
    pub fn with_failing_history() -> Self {
        Self {
            history: HistoryMode::FailingWrites,
            ..Self::new()
        }
    }

    /// Get total alarm count
    pub fn alarm_count(&self) -> usize {
        self.alarms.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Get total change count
    pub fn change_count(&self) -> usize {
        self.changes.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        if let Ok(mut alarms) = self.alarms.lock() {
            alarms.clear();
        }
        if let Ok(mut changes) = self.changes.lock() {
            changes.clear();
        }
    }

    fn alarms(&self) -> Result<MutexGuard<'_, Vec<Alarm>>, StorageError> {
        self.alarms
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    fn changes(&self) -> Result<MutexGuard<'_, Vec<AlarmChange>>, StorageError> {
        self.changes
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn name_taken(alarms: &[Alarm], candidate: &Alarm) -> bool {
    alarms.iter().any(|a| {
        a.alarm_id != candidate.alarm_id
            && a.project_id == candidate.project_id
            && a.name == candidate.name
    })
}

#[async_trait]
impl AlarmRepository for MemoryRepository {
    async fn list_alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>, StorageError> {
        let alarms = self.alarms()?;
        Ok(alarms.iter().filter(|a| filter.matches(a)).cloned().collect())
    }

    async fn create_alarm(&self, alarm: Alarm) -> Result<Alarm, StorageError> {
        let mut alarms = self.alarms()?;

        if alarms.iter().any(|a| a.alarm_id == alarm.alarm_id) {
            return Err(StorageError::Conflict(format!(
                "alarm {} already exists",
                alarm.alarm_id
            )));
        }
        if name_taken(&alarms, &alarm) {
            return Err(StorageError::Conflict(format!(
                "alarm name {} already used in project {}",
                alarm.name, alarm.project_id
            )));
        }

        debug!(alarm_id = %alarm.alarm_id, "Inserted alarm");
        alarms.push(alarm.clone());
        Ok(alarm)
    }

    async fn update_alarm(&self, alarm: Alarm) -> Result<Alarm, StorageError> {
        let mut alarms = self.alarms()?;

        if name_taken(&alarms, &alarm) {
            return Err(StorageError::Conflict(format!(
                "alarm name {} already used in project {}",
                alarm.name, alarm.project_id
            )));
        }

        let slot = alarms
            .iter_mut()
            .find(|a| a.alarm_id == alarm.alarm_id)
            .ok_or(StorageError::NotFound)?;
        *slot = alarm.clone();

        debug!(alarm_id = %alarm.alarm_id, "Updated alarm");
        Ok(alarm)
    }

    async fn delete_alarm(&self, alarm_id: Uuid) -> Result<(), StorageError> {
        let mut alarms = self.alarms()?;
        let before = alarms.len();
        alarms.retain(|a| a.alarm_id != alarm_id);

        if alarms.len() == before {
            return Err(StorageError::NotFound);
        }
        debug!(%alarm_id, "Deleted alarm");
        Ok(())
    }

    async fn record_change(&self, change: AlarmChange) -> Result<(), StorageError> {
        match self.history {
            HistoryMode::Stored => {}
            HistoryMode::NotImplemented => {
                return Err(StorageError::NotImplemented("alarm history"))
            }
            HistoryMode::FailingWrites => {
                return Err(StorageError::DatabaseError(
                    "alarm history is unavailable".to_string(),
                ))
            }
        }
        self.changes()?.push(change);
        Ok(())
    }

    async fn list_changes(
        &self,
        alarm_id: Uuid,
        on_behalf_of: Option<&str>,
        filter: &ChangeFilter,
    ) -> Result<Vec<AlarmChange>, StorageError> {
        if self.history == HistoryMode::NotImplemented {
            return Err(StorageError::NotImplemented("alarm history"));
        }

        let changes = self.changes()?;
        let mut selected: Vec<AlarmChange> = changes
            .iter()
            .filter(|c| c.alarm_id == alarm_id)
            .filter(|c| on_behalf_of.map_or(true, |p| c.on_behalf_of.as_deref() == Some(p)))
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();

        // Newest first; insertion order breaks ties
        selected.reverse();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(selected)
    }
}
