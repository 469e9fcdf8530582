//! Instance identity and persisted instance state.
//!
//! An instance is one spawn attempt of a service. Its state lives in
//! `<instance_root>/<instance_id>/` and is shared between invocations only
//! through those files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use ts_rs::TS;

/// Length of a generated instance id.
pub const INSTANCE_ID_LEN: usize = 8;

/// Identifier of one instance: 8 lowercase alphanumeric characters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[serde(try_from = "String", into = "String")]
#[ts(type = "string")]
pub struct InstanceId(String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a string is not a valid instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInstanceId(pub String);

impl fmt::Display for InvalidInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid instance id {:?}: expected {INSTANCE_ID_LEN} lowercase alphanumeric characters",
            self.0
        )
    }
}

impl std::error::Error for InvalidInstanceId {}

impl FromStr for InstanceId {
    type Err = InvalidInstanceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == INSTANCE_ID_LEN
            && s.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase());
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidInstanceId(s.to_string()))
        }
    }
}

impl TryFrom<String> for InstanceId {
    type Error = InvalidInstanceId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstanceId> for String {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

/// Immutable launch record persisted as `proc.json`.
///
/// Written exactly once before the instance counts as started. Drift
/// detection compares this snapshot against the current definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct InstanceMeta {
    /// Owning tag, absent for ad-hoc instances.
    pub tag: Option<String>,

    /// Absolute working directory the command was started in.
    pub cwd: PathBuf,

    /// Full shell command, including the exit-code capture suffix.
    pub cmd: String,

    /// The configured entry at launch time.
    pub entry: String,

    /// Launch time.
    pub started: DateTime<Utc>,
}

/// Everything known on disk about one instance.
///
/// Every field is optional: a directory that is mid-creation or orphaned
/// yields an empty snapshot rather than an error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct InstanceSnapshot {
    pub id: InstanceId,
    pub meta: Option<InstanceMeta>,
    pub pid: Option<u32>,
    pub stopped: Option<DateTime<Utc>>,
    pub exit: Option<i32>,
}

impl InstanceSnapshot {
    pub fn empty(id: InstanceId) -> Self {
        Self {
            id,
            meta: None,
            pid: None,
            stopped: None,
            exit: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_none() && self.pid.is_none() && self.stopped.is_none() && self.exit.is_none()
    }
}
