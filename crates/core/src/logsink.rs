//! External log collectors for managed processes.
//!
//! Output of a managed process is never buffered by the supervisor or left
//! on inherited descriptors. Each stream is piped into a collector process
//! chosen by what the host provides:
//!
//! 1. `multilog`: rotates size- and count-bounded segments under
//!    `<path>.d/`, each line stamped with TAI64N.
//! 2. `ts`: appends UTC-timestamped lines to `<path>`.
//!
//! With neither installed, starting a service fails.

use cake_protocol::Settings;
use std::ffi::{OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::io::Write;
use std::process::{ChildStdin, Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const MULTILOG: &str = "multilog";
const TS: &str = "ts";

/// Timestamp format passed to `ts`, matching the instance metadata format.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%.SZ";

/// Name of the active segment inside a multilog directory.
pub const ACTIVE_SEGMENT: &str = "current";

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// multilog rejects sizes outside this range.
const MIN_SEGMENT_BYTES: u64 = 4096;
const MAX_SEGMENT_BYTES: u64 = 16_777_215;

#[derive(Error, Debug)]
pub enum LogSinkError {
    #[error("No log sink available: install daemontools (multilog) or moreutils (ts)")]
    NoLogSinkAvailable,

    #[error("Failed to spawn log sink {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write to log sink: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to open log destination {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Type alias for Result with LogSinkError.
pub type LogSinkResult<T> = Result<T, LogSinkError>;

/// Which collector a pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkKind {
    Multilog(PathBuf),
    Timestamped(PathBuf),
}

/// Collector processes attached to one managed process.
#[derive(Debug)]
pub struct Sinks {
    pub stdout: ChildStdin,
    pub stderr: ChildStdin,
    /// Pids of the collector processes, stdout first.
    pub pids: Vec<u32>,
}

impl Sinks {
    /// Write `line` to both streams ahead of anything the managed process
    /// prints.
    pub fn announce(&mut self, line: &str) -> LogSinkResult<()> {
        for pipe in [&mut self.stdout, &mut self.stderr] {
            writeln!(pipe, "{line}").map_err(LogSinkError::Write)?;
        }
        Ok(())
    }
}

/// Selects and spawns log collectors.
#[derive(Debug, Clone)]
pub struct LogSinkPipeline {
    kind: Option<SinkKind>,
    max_bytes: u64,
    max_files: u32,
}

impl LogSinkPipeline {
    /// Probe `PATH` for collectors.
    pub fn detect(settings: &Settings) -> Self {
        let kind = which::which(MULTILOG)
            .map(SinkKind::Multilog)
            .or_else(|_| which::which(TS).map(SinkKind::Timestamped))
            .ok();
        Self::with_kind(kind, settings)
    }

    /// Probe an explicit search path (a `PATH`-style list) for collectors.
    pub fn with_search_path(paths: impl AsRef<OsStr>, settings: &Settings) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let paths: OsString = paths.as_ref().to_os_string();
        let kind = which::which_in(MULTILOG, Some(&paths), &cwd)
            .map(SinkKind::Multilog)
            .or_else(|_| which::which_in(TS, Some(&paths), &cwd).map(SinkKind::Timestamped))
            .ok();
        Self::with_kind(kind, settings)
    }

    pub fn with_kind(kind: Option<SinkKind>, settings: &Settings) -> Self {
        Self {
            kind,
            max_bytes: settings
                .log_max_bytes
                .clamp(MIN_SEGMENT_BYTES, MAX_SEGMENT_BYTES),
            max_files: settings.log_max_files.max(2),
        }
    }

    pub fn kind(&self) -> Option<&SinkKind> {
        self.kind.as_ref()
    }

    /// Spawn one collector per stream and return the pipe ends for the
    /// managed process.
    pub fn open_sinks(&self, out_path: &Path, err_path: &Path) -> LogSinkResult<Sinks> {
        let kind = self.kind.as_ref().ok_or(LogSinkError::NoLogSinkAvailable)?;
        let (stdout, out_pid) = self.spawn_collector(kind, out_path)?;
        let (stderr, err_pid) = self.spawn_collector(kind, err_path)?;
        Ok(Sinks {
            stdout,
            stderr,
            pids: vec![out_pid, err_pid],
        })
    }

    fn spawn_collector(&self, kind: &SinkKind, path: &Path) -> LogSinkResult<(ChildStdin, u32)> {
        let mut command = match kind {
            SinkKind::Multilog(program) => {
                let dir = segment_dir(path);
                fs::create_dir_all(&dir).map_err(|source| LogSinkError::Io {
                    path: dir.clone(),
                    source,
                })?;
                let mut command = Command::new(program);
                command
                    .arg("t")
                    .arg(format!("s{}", self.max_bytes))
                    .arg(format!("n{}", self.max_files))
                    .arg(&dir)
                    .stdout(Stdio::null());
                command
            }
            SinkKind::Timestamped(program) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| LogSinkError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                let mut command = Command::new(program);
                command.arg(TS_FORMAT).env("TZ", "UTC").stdout(file);
                command
            }
        };

        let program = match kind {
            SinkKind::Multilog(program) | SinkKind::Timestamped(program) => program,
        };

        // Own process group: signals aimed at the service or the invoking
        // terminal do not reach the collector, which exits on EOF instead.
        let mut child = command
            .stdin(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| LogSinkError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| LogSinkError::Spawn {
            program: program.clone(),
            source: std::io::Error::other("collector stdin not piped"),
        })?;
        debug!(program = %program.display(), path = %path.display(), pid = child.id(), "log sink started");
        Ok((stdin, child.id()))
    }

    /// Wait until the rotating collectors behind `paths` have closed their
    /// active segments.
    ///
    /// Paths without a segment directory have nothing to drain. Returns
    /// `false` if `timeout` expired first; that is logged, not fatal.
    pub async fn wait_drained(paths: &[PathBuf], timeout: Duration) -> bool {
        let pending: Vec<PathBuf> = paths
            .iter()
            .map(|path| segment_dir(path))
            .filter(|dir| dir.is_dir())
            .map(|dir| dir.join(ACTIVE_SEGMENT))
            .collect();
        if pending.is_empty() {
            return true;
        }

        let start = Instant::now();
        loop {
            if pending.iter().all(|segment| is_segment_closed(segment)) {
                return true;
            }
            if start.elapsed() >= timeout {
                warn!(
                    "log sinks did not finish within {}ms: {:?}",
                    timeout.as_millis(),
                    pending
                );
                return false;
            }
            sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

/// `<path>.d`, the multilog directory for a log path.
pub fn segment_dir(path: &Path) -> PathBuf {
    let mut dir = path.as_os_str().to_os_string();
    dir.push(".d");
    PathBuf::from(dir)
}

/// multilog keeps the owner execute bit on `current` while writing and
/// clears it (mode 0644) once the segment is flushed and closed.
fn is_segment_closed(segment: &Path) -> bool {
    match fs::metadata(segment) {
        Ok(meta) => meta.permissions().mode() & 0o100 == 0,
        // Never created: the collector wrote nothing before exiting.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_prefers_multilog_over_ts() {
        let bin = tempdir().unwrap();
        write_script(bin.path(), "ts", "exec cat");
        write_script(bin.path(), "multilog", "exec cat");

        let pipeline = LogSinkPipeline::with_search_path(bin.path(), &Settings::default());
        assert_eq!(
            pipeline.kind(),
            Some(&SinkKind::Multilog(bin.path().join("multilog")))
        );
    }

    #[test]
    fn test_falls_back_to_ts() {
        let bin = tempdir().unwrap();
        write_script(bin.path(), "ts", "exec cat");

        let pipeline = LogSinkPipeline::with_search_path(bin.path(), &Settings::default());
        assert_eq!(
            pipeline.kind(),
            Some(&SinkKind::Timestamped(bin.path().join("ts")))
        );
    }

    #[test]
    fn test_no_sink_refuses_to_open() {
        let bin = tempdir().unwrap();
        let pipeline = LogSinkPipeline::with_search_path(bin.path(), &Settings::default());
        let logs = tempdir().unwrap();

        let result = pipeline.open_sinks(&logs.path().join("out.log"), &logs.path().join("err.log"));
        assert!(matches!(result, Err(LogSinkError::NoLogSinkAvailable)));
        assert!(!logs.path().join("out.log").exists());
    }

    #[test]
    fn test_segment_bounds_are_clamped() {
        let settings = Settings {
            log_max_bytes: 10,
            log_max_files: 0,
            ..Settings::default()
        };
        let pipeline = LogSinkPipeline::with_kind(None, &settings);
        assert_eq!(pipeline.max_bytes, MIN_SEGMENT_BYTES);
        assert_eq!(pipeline.max_files, 2);
    }

    #[test]
    fn test_timestamped_sink_appends_to_file() {
        let bin = tempdir().unwrap();
        write_script(bin.path(), "ts", "exec cat");
        let logs = tempdir().unwrap();
        let out = logs.path().join("out.log");
        let err = logs.path().join("err.log");
        fs::write(&out, "earlier\n").unwrap();

        let pipeline = LogSinkPipeline::with_search_path(bin.path(), &Settings::default());
        let mut sinks = pipeline.open_sinks(&out, &err).expect("Failed to open sinks");
        assert_eq!(sinks.pids.len(), 2);
        sinks.announce("starting").expect("Failed to write banner");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("echo hello; echo oops >&2")
            .stdout(sinks.stdout)
            .stderr(sinks.stderr)
            .spawn()
            .unwrap();
        child.wait().unwrap();

        // The collectors exit on EOF; give them a moment to flush.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            let ready = fs::read_to_string(&out).unwrap_or_default().contains("hello")
                && fs::read_to_string(&err).unwrap_or_default().contains("oops");
            if ready {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(fs::read_to_string(&out).unwrap(), "earlier\nstarting\nhello\n");
        assert_eq!(fs::read_to_string(&err).unwrap(), "starting\noops\n");
    }

    #[tokio::test]
    async fn test_wait_drained_detects_closed_segment() {
        let logs = tempdir().unwrap();
        let out = logs.path().join("out.log");
        let dir = segment_dir(&out);
        fs::create_dir_all(&dir).unwrap();
        let current = dir.join(ACTIVE_SEGMENT);
        fs::File::create(&current)
            .unwrap()
            .write_all(b"line\n")
            .unwrap();

        fs::set_permissions(&current, fs::Permissions::from_mode(0o744)).unwrap();
        assert!(!LogSinkPipeline::wait_drained(&[out.clone()], Duration::from_millis(150)).await);

        fs::set_permissions(&current, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(LogSinkPipeline::wait_drained(&[out], Duration::from_millis(150)).await);
    }

    #[tokio::test]
    async fn test_wait_drained_without_segment_dirs() {
        let logs = tempdir().unwrap();
        let paths = vec![logs.path().join("out.log"), logs.path().join("err.log")];
        assert!(LogSinkPipeline::wait_drained(&paths, Duration::ZERO).await);
    }
}
