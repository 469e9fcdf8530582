//! Filesystem-backed instance records.
//!
//! Each instance owns `<instance_root>/<instance_id>/`. Files are replaced
//! whole (write to a temp file, then rename) or appended, never edited in
//! place. Readers treat a missing, empty or unparseable file as absent.

use crate::config::models::Paths;
use crate::state::error::{StateError, StateResult};
use cake_protocol::{InstanceId, InstanceMeta, InstanceSnapshot, INSTANCE_ID_LEN};
use chrono::{DateTime, SecondsFormat, Utc};
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

const PID_FILE: &str = "pid";
const META_FILE: &str = "proc.json";
const EXIT_FILE: &str = "exit";
const STOPPED_FILE: &str = "stopped";
const OUT_LOG: &str = "out.log";
const ERR_LOG: &str = "err.log";
const WORK_DIR: &str = "work";
const INSTANCE_LIST: &str = "instances";
const LOCK_FILE: &str = ".lock";

/// Parse an `instances` list: one id per line, blank and invalid lines skipped.
pub(crate) fn parse_instance_list(content: &str) -> Vec<InstanceId> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                debug!("ignoring instance list entry: {e}");
                None
            }
        })
        .collect()
}

/// Reads and writes the on-disk state of instances and tag run directories.
#[derive(Debug, Clone)]
pub struct InstanceStore {
    paths: Paths,
}

impl InstanceStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Location of a tag's `instances` list.
    pub fn instance_list_path(paths: &Paths, tag: &str) -> PathBuf {
        paths.tag_run_dir(tag).join(INSTANCE_LIST)
    }

    /// Generate a fresh instance id that has no directory yet.
    pub fn generate_id(&self) -> InstanceId {
        loop {
            let token = Uuid::new_v4().simple().to_string();
            let Ok(id) = token[..INSTANCE_ID_LEN].parse::<InstanceId>() else {
                continue;
            };
            if !self.instance_dir(&id).exists() {
                return id;
            }
        }
    }

    pub fn instance_dir(&self, id: &InstanceId) -> PathBuf {
        self.paths.instance_dir(id)
    }

    /// Fresh working directory for instances without `dir` or `git`.
    pub fn work_dir(&self, id: &InstanceId) -> PathBuf {
        self.instance_dir(id).join(WORK_DIR)
    }

    pub fn out_log(&self, id: &InstanceId) -> PathBuf {
        self.instance_dir(id).join(OUT_LOG)
    }

    pub fn err_log(&self, id: &InstanceId) -> PathBuf {
        self.instance_dir(id).join(ERR_LOG)
    }

    /// File the spawned shell writes its exit status into.
    pub fn exit_file(&self, id: &InstanceId) -> PathBuf {
        self.instance_dir(id).join(EXIT_FILE)
    }

    /// Create the instance directory. Idempotent.
    pub fn create(&self, id: &InstanceId) -> StateResult<PathBuf> {
        let dir = self.instance_dir(id);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// Create the instance's own working directory. Idempotent.
    pub fn create_work_dir(&self, id: &InstanceId) -> StateResult<PathBuf> {
        let dir = self.work_dir(id);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// Create a tag's run directory. Idempotent.
    pub fn create_run_dir(&self, tag: &str) -> StateResult<PathBuf> {
        let dir = self.paths.tag_run_dir(tag);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// Take the advisory start lock of a tag, blocking until it is free.
    ///
    /// The lock is released when the returned guard is dropped.
    pub fn lock_tag(&self, tag: &str) -> StateResult<Flock<File>> {
        let path = self.create_run_dir(tag)?.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StateError::FileWrite {
                path: path.clone(),
                source,
            })?;
        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, source)| StateError::Lock { path, source })
    }

    /// Persist `proc.json`. Refuses to replace an existing file.
    pub fn write_metadata(&self, id: &InstanceId, meta: &InstanceMeta) -> StateResult<()> {
        let path = self.instance_dir(id).join(META_FILE);
        let mut content = serde_json::to_string(meta)?;
        content.push('\n');

        let tmp = write_temp(&path, &content)?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                StateError::MetadataExists(path.clone())
            } else {
                StateError::FileWrite {
                    path: path.clone(),
                    source: e.error,
                }
            }
        })?;
        Ok(())
    }

    pub fn read_metadata(&self, id: &InstanceId) -> Option<InstanceMeta> {
        let path = self.instance_dir(id).join(META_FILE);
        let content = read_trimmed(&path)?;
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!(path = %path.display(), "ignoring unreadable metadata: {e}");
                None
            }
        }
    }

    pub fn write_pid(&self, id: &InstanceId, pid: u32) -> StateResult<()> {
        replace(&self.instance_dir(id).join(PID_FILE), &format!("{pid}\n"))
    }

    pub fn read_pid(&self, id: &InstanceId) -> Option<u32> {
        read_trimmed(&self.instance_dir(id).join(PID_FILE))?.parse().ok()
    }

    /// Exit status written by the instance's shell wrapper.
    pub fn read_exit(&self, id: &InstanceId) -> Option<i32> {
        read_trimmed(&self.exit_file(id))?.parse().ok()
    }

    pub fn read_stopped(&self, id: &InstanceId) -> Option<DateTime<Utc>> {
        let raw = read_trimmed(&self.instance_dir(id).join(STOPPED_FILE))?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Record a confirmed stop. Returns `false` if one was already recorded.
    pub fn mark_stopped(&self, id: &InstanceId, at: DateTime<Utc>) -> StateResult<bool> {
        if self.read_stopped(id).is_some() {
            return Ok(false);
        }
        let stamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        replace(
            &self.instance_dir(id).join(STOPPED_FILE),
            &format!("{stamp}\n"),
        )?;
        Ok(true)
    }

    pub fn append_to_tag_instance_list(&self, tag: &str, id: &InstanceId) -> StateResult<()> {
        self.create_run_dir(tag)?;
        let path = Self::instance_list_path(&self.paths, tag);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StateError::FileWrite {
                path: path.clone(),
                source,
            })?;
        // One write call per line keeps concurrent appends line-atomic.
        file.write_all(format!("{id}\n").as_bytes())
            .map_err(|source| StateError::FileWrite { path, source })
    }

    /// Instance ids recorded for `tag`, oldest first.
    pub fn tag_instances(&self, tag: &str) -> Vec<InstanceId> {
        read_trimmed(&Self::instance_list_path(&self.paths, tag))
            .map(|content| parse_instance_list(&content))
            .unwrap_or_default()
    }

    /// Everything on disk for one instance.
    pub fn snapshot(&self, id: &InstanceId) -> InstanceSnapshot {
        InstanceSnapshot {
            id: id.clone(),
            meta: self.read_metadata(id),
            pid: self.read_pid(id),
            stopped: self.read_stopped(id),
            exit: self.read_exit(id),
        }
    }
}

fn ensure_dir(dir: &Path) -> StateResult<()> {
    if dir.is_file() {
        return Err(StateError::DirConflict(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        debug!(path = %dir.display(), "creating directory");
    }
    fs::create_dir_all(dir).map_err(|source| StateError::DirectoryCreate {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_temp(path: &Path, content: &str) -> StateResult<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let write_err = |source| StateError::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    Ok(tmp)
}

fn replace(path: &Path, content: &str) -> StateResult<()> {
    write_temp(path, content)?
        .persist(path)
        .map_err(|e| StateError::FileWrite {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

fn read_trimmed(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
