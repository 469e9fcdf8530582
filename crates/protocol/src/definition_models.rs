//! Service definition models for `config.yaml`.
//!
//! The definitions file maps a tag to a [`Definition`]. It is read fresh on
//! every invocation and never written by the supervisor.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How a tagged service is located and started.
///
/// # Example
///
/// ```yaml
/// # config.yaml
/// api:
///   entry: ./bin/api --port 8080
///   git: true
///   revision: 4f2a9c1
/// worker:
///   entry: python3 worker.py
///   dir: $HOME/src/worker
///   exit: ./scripts/drain-and-stop.sh
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(deny_unknown_fields)]
pub struct Definition {
    /// Shell command line to run. Absent means there is nothing to run.
    #[serde(default)]
    pub entry: Option<String>,

    /// Literal working directory. Environment references are expanded at
    /// resolution time. Takes precedence over the git checkout scheme.
    #[serde(default)]
    pub dir: Option<String>,

    /// Run from a checked-out revision under the tag's `repo/` area.
    #[serde(default)]
    pub git: bool,

    /// Pinned revision. When absent the `repo/latest` pointer is used.
    #[serde(default)]
    pub revision: Option<String>,

    /// Command run in place of signalling when stopping the service.
    #[serde(default)]
    pub exit: Option<String>,
}

impl Definition {
    /// Build an untagged definition for a one-off command.
    pub fn adhoc(entry: impl Into<String>, dir: Option<String>) -> Self {
        Self {
            entry: Some(entry.into()),
            dir,
            ..Self::default()
        }
    }

    /// The entry command, treating blank strings as absent.
    pub fn entry(&self) -> Option<&str> {
        self.entry
            .as_deref()
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
    }
}
