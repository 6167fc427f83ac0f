//! Alarm State Transitions

use alarm_model::{Alarm, AlarmState};
use chrono::{DateTime, Utc};

use crate::error::AlarmError;

/// Governs the alarm state field and its timestamps
pub struct AlarmStateMachine;

impl AlarmStateMachine {
    /// Parse a state name as sent by callers
    pub fn parse(state: &str) -> Result<AlarmState, AlarmError> {
        state.parse().map_err(|_| {
            AlarmError::InvalidInput(format!(
                "state invalid: '{}', expected one of ok, alarm, insufficient data",
                state
            ))
        })
    }

    /// Stamp a mutation and apply an incoming state, if any
    ///
    /// `timestamp` always moves to `now`; `state_timestamp` only when the
    /// state actually changes. Returns whether it changed.
    pub fn apply(alarm: &mut Alarm, incoming: Option<AlarmState>, now: DateTime<Utc>) -> bool {
        alarm.timestamp = now;
        match incoming {
            Some(state) if state != alarm.state => {
                alarm.state = state;
                alarm.state_timestamp = now;
                true
            }
            _ => false,
        }
    }
}
