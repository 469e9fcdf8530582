//! Test fixtures: temporary base directories and fake log collectors.

use cake_core::context::Context;
use cake_core::logsink::LogSinkPipeline;
use cake_core::process::{ProcessTable, SystemProcessTable};
use cake_core::config::ConfigStore;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Stand-in for `ts`: passes lines through unchanged.
const FAKE_TS: &str = "exec cat";

/// Stand-in for `multilog t sN nN <dir>`: keeps `current` at 0744 while
/// writing and drops it to 0644 on EOF, like the real collector.
const FAKE_MULTILOG: &str = r#"d="$4"
mkdir -p "$d"
touch "$d/current"
chmod 744 "$d/current"
cat >> "$d/current"
chmod 644 "$d/current""#;

/// Settings that keep failing stops short.
const TEST_SETTINGS: &str = "stop_timeout_secs = 5\ndrain_timeout_ms = 2000\n";

/// A throwaway base directory plus a private `bin/` holding fake collectors.
pub struct TestBase {
    dir: TempDir,
}

#[allow(dead_code)]
impl TestBase {
    /// Base with a fake `ts` only.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let base = Self { dir };
        fs::create_dir_all(base.bin()).expect("Failed to create bin dir");
        base.write_script("ts", FAKE_TS);
        base.write_settings(TEST_SETTINGS);
        base
    }

    /// Base with a fake `multilog`, which takes precedence over `ts`.
    pub fn with_multilog() -> Self {
        let base = Self::new();
        base.write_script("multilog", FAKE_MULTILOG);
        base
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn bin(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    /// A directory under the base for services to run in.
    pub fn scratch(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path).expect("Failed to create scratch dir");
        path
    }

    pub fn write_config(&self, yaml: &str) {
        fs::write(self.base().join("config.yaml"), yaml).expect("Failed to write config.yaml");
    }

    pub fn write_settings(&self, toml: &str) {
        fs::write(self.base().join("settings.toml"), toml).expect("Failed to write settings.toml");
    }

    fn write_script(&self, name: &str, body: &str) {
        let path = self.bin().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to make script executable");
    }

    /// Fresh per-invocation context bound to the real process table.
    pub fn context(&self) -> Context {
        self.context_with(Arc::new(SystemProcessTable::new()))
    }

    /// The base spelled relative to the test's current directory.
    pub fn relative_base(&self) -> PathBuf {
        let cwd = std::env::current_dir().expect("Failed to read current dir");
        let ups = cwd.components().count().saturating_sub(1);
        let mut relative: PathBuf = std::iter::repeat("..").take(ups).collect();
        relative.push(self.base().strip_prefix("/").expect("Temp dir should be absolute"));
        relative
    }

    /// Fresh per-invocation context loaded from `base`, which must name
    /// this fixture's directory.
    pub fn context_from(&self, base: &Path) -> Context {
        let config = ConfigStore::load(base).expect("Failed to load configuration");
        let sinks = LogSinkPipeline::with_search_path(self.bin(), config.settings());
        Context::new(config, sinks, Arc::new(SystemProcessTable::new()))
    }

    /// Fresh per-invocation context bound to `processes`.
    pub fn context_with(&self, processes: Arc<dyn ProcessTable>) -> Context {
        let config = ConfigStore::load(self.base()).expect("Failed to load configuration");
        let sinks = LogSinkPipeline::with_search_path(self.bin(), config.settings());
        Context::new(config, sinks, processes)
    }

    /// Names of all instance directories.
    pub fn instance_dirs(&self) -> Vec<String> {
        let root = self.base().join("instances");
        let Ok(entries) = fs::read_dir(root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Poll `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
