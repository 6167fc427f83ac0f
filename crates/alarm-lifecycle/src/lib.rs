//! Alarm Lifecycle
//!
//! Create, update, delete and state operations over alarm definitions, with
//! ownership checks, quotas and change history.

mod config;
mod error;
mod history;
mod ownership;
mod quota;
mod service;
mod state;

pub use config::LifecycleConfig;
pub use error::AlarmError;
pub use history::{diff_snapshots, ChangeHistoryRecorder};
pub use ownership::{CallerIdentity, Owner, OwnershipResolver};
pub use quota::QuotaEnforcer;
pub use service::{AlarmLifecycleService, Clock};
pub use state::AlarmStateMachine;
