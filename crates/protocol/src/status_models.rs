//! Service lifecycle states and status reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::instance_models::InstanceId;

/// Lifecycle state of a service as observed by one invocation.
///
/// `Unknown` resolves to `Running` or `NotRunning` once the recorded pid has
/// been checked against the OS process table:
///
/// ```text
/// Unknown -> Running | NotRunning
/// NotRunning -> Starting -> Running
/// Running -> Stopping -> Stopped
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    /// The process table has not been consulted yet.
    Unknown,

    /// No live process for the current instance.
    NotRunning,

    /// Spawn in progress.
    Starting,

    /// The recorded pid maps to a live process.
    Running,

    /// Termination signals sent, waiting for the tree to exit.
    Stopping,

    /// Stop confirmed and recorded.
    Stopped,
}

impl ServiceState {
    pub fn is_running(self) -> bool {
        matches!(self, ServiceState::Running)
    }
}

/// Point-in-time view of a service for display.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StatusReport {
    /// Tag, absent for ad-hoc instances.
    pub tag: Option<String>,

    /// Current instance, if the service was ever started.
    pub instance: Option<InstanceId>,

    pub state: ServiceState,

    pub pid: Option<u32>,

    pub started: Option<DateTime<Utc>>,

    pub stopped: Option<DateTime<Utc>>,

    /// Exit status written by the instance's shell wrapper.
    pub exit: Option<i32>,

    /// Whether the running instance matches the current definition.
    /// Only computed while running.
    pub up_to_date: Option<bool>,
}
