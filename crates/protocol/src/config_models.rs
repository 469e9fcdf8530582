//! Global settings models for `settings.toml`.
//!
//! Every field has a default so a missing or partial file is valid.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Represents global settings from `<base>/settings.toml`.
///
/// # Example
///
/// ```toml
/// # settings.toml
/// run_root = "$HOME/.cakestack/run"
/// stop_timeout_secs = 60
/// log_max_files = 20
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one run directory per tag. Defaults to `<base>/run`.
    pub run_root: Option<String>,

    /// Directory holding one directory per instance. Defaults to
    /// `<base>/instances`.
    pub instance_root: Option<String>,

    /// How long `stop` waits for a signalled process tree to exit.
    pub stop_timeout_secs: u64,

    /// How long `stop` waits for log collectors to flush their segments.
    pub drain_timeout_ms: u64,

    /// Size bound of one rotated log segment.
    pub log_max_bytes: u64,

    /// Number of rotated log segments kept per stream.
    pub log_max_files: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_root: None,
            instance_root: None,
            stop_timeout_secs: 180,
            drain_timeout_ms: 2000,
            log_max_bytes: 1_000_000,
            log_max_files: 10,
        }
    }
}
