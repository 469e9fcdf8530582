//! Service controller: the lifecycle state machine.
//!
//! The controller drives one service (a tag, an ad-hoc definition or an
//! existing instance) through start, stop and status checks. It keeps no
//! state worth trusting across invocations: whether a service runs is
//! decided each time from the recorded pid and the OS process table.

use crate::context::Context;
use crate::logsink::{LogSinkError, LogSinkPipeline};
use crate::process::{ProcessError, ProcessHandle, Signal};
use crate::state::error::{StateError, StateResult};
use cake_protocol::{Definition, InstanceId, InstanceMeta, ServiceState, StatusReport};
use chrono::{SecondsFormat, Utc};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of [`ServiceController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new instance was spawned.
    Started { id: InstanceId, pid: u32 },

    /// The current instance is alive; nothing was spawned.
    AlreadyRunning { id: InstanceId, pid: u32 },

    /// The definition has no entry; nothing to do.
    NoEntryPoint,
}

/// Result of [`ServiceController::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process tree exited and the stop was recorded.
    ///
    /// `already_gone` lists pids that exited before their signal arrived.
    Stopped {
        id: InstanceId,
        already_gone: Vec<u32>,
    },

    /// Signals were sent but some processes outlived the stop budget.
    TimedOut {
        id: InstanceId,
        still_running: Vec<u32>,
    },

    /// The definition's exit command ran in place of signalling.
    ExitCommand { status: i32, still_running: Vec<u32> },

    /// No live process for the current instance.
    NotRunning,
}

/// Drives the lifecycle of a single service.
pub struct ServiceController<'a> {
    ctx: &'a Context,
    tag: Option<String>,
    definition: Definition,
    current: Option<InstanceId>,
    state: ServiceState,
}

impl<'a> ServiceController<'a> {
    /// Controller for a configured tag.
    pub fn for_tag(ctx: &'a Context, tag: &str) -> StateResult<Self> {
        let service = ctx
            .config
            .service(tag)
            .ok_or_else(|| StateError::UnknownTag(tag.to_string()))?;

        Ok(Self {
            ctx,
            tag: Some(tag.to_string()),
            definition: service.definition.clone(),
            current: service.current_instance().cloned(),
            state: ServiceState::Unknown,
        })
    }

    /// Controller for an untagged, one-off definition.
    pub fn adhoc(ctx: &'a Context, definition: Definition) -> Self {
        Self {
            ctx,
            tag: None,
            definition,
            current: None,
            state: ServiceState::Unknown,
        }
    }

    /// Controller attached to an existing instance.
    ///
    /// The current instance of a configured tag is driven by that tag's
    /// definition. Any other instance is treated as ad-hoc, rebuilt from its
    /// persisted metadata.
    pub fn for_instance(ctx: &'a Context, id: &InstanceId) -> StateResult<Self> {
        let meta = ctx
            .store
            .read_metadata(id)
            .ok_or_else(|| StateError::UnknownInstance(id.clone()))?;

        if let Some(tag) = meta.tag.as_deref() {
            if ctx.config.current_instance(tag) == Some(id) {
                return Self::for_tag(ctx, tag);
            }
        }

        let definition = Definition::adhoc(meta.entry, Some(meta.cwd.display().to_string()));
        Ok(Self {
            ctx,
            tag: None,
            definition,
            current: Some(id.clone()),
            state: ServiceState::Unknown,
        })
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn current_instance(&self) -> Option<&InstanceId> {
        self.current.as_ref()
    }

    /// Last state observed by this controller.
    pub fn state(&self) -> ServiceState {
        self.state
    }

    fn label(&self) -> String {
        match (&self.tag, &self.current) {
            (Some(tag), _) => tag.clone(),
            (None, Some(id)) => format!("instance {id}"),
            (None, None) => "ad-hoc service".to_string(),
        }
    }

    /// Root process of the current instance, if it is alive.
    fn live_root(&self) -> Option<ProcessHandle> {
        let id = self.current.as_ref()?;
        let pid = self.ctx.store.read_pid(id)?;
        let root = ProcessHandle::new(pid, self.ctx.processes.clone());
        if root.is_alive() {
            Some(root)
        } else {
            debug!("no live process for {} (pid {pid})", self.label());
            None
        }
    }

    /// Whether the current instance's recorded pid maps to a live process.
    pub fn is_running(&self) -> bool {
        self.live_root().is_some()
    }

    /// Resolve `Unknown` against the process table.
    pub fn refresh(&mut self) -> ServiceState {
        self.state = if self.is_running() {
            ServiceState::Running
        } else if self
            .current
            .as_ref()
            .and_then(|id| self.ctx.store.read_stopped(id))
            .is_some()
        {
            ServiceState::Stopped
        } else {
            ServiceState::NotRunning
        };
        self.state
    }

    fn resolve_cwd(&self, work_dir: &Path) -> StateResult<PathBuf> {
        let run_dir = self
            .tag
            .as_deref()
            .map(|tag| self.ctx.config.paths().tag_run_dir(tag));
        Ok(self
            .ctx
            .resolver
            .resolve(&self.definition, run_dir.as_deref(), work_dir)?)
    }

    fn uses_work_dir(&self) -> bool {
        self.definition.dir.is_none() && !self.definition.git
    }

    /// Spawn a new instance unless the current one is alive.
    ///
    /// For tagged services the check and the spawn happen under the tag's
    /// advisory lock, so concurrent starts cannot both spawn.
    pub async fn start(&mut self) -> StateResult<StartOutcome> {
        let Some(entry) = self.definition.entry().map(str::to_string) else {
            info!("no entry point defined for {}, doing nothing", self.label());
            return Ok(StartOutcome::NoEntryPoint);
        };

        let ctx = self.ctx;
        let store = &ctx.store;
        let _guard = self
            .tag
            .as_deref()
            .map(|tag| store.lock_tag(tag))
            .transpose()?;

        // Another invocation may have started an instance since load.
        if let Some(tag) = self.tag.as_deref() {
            if let Some(latest) = store.tag_instances(tag).pop() {
                self.current = Some(latest);
            }
        }

        if let (Some(id), Some(root)) = (self.current.clone(), self.live_root()) {
            self.state = ServiceState::Running;
            debug!("{} already running as {id} (pid {})", self.label(), root.pid());
            return Ok(StartOutcome::AlreadyRunning {
                id,
                pid: root.pid(),
            });
        }

        if ctx.sinks.kind().is_none() {
            return Err(LogSinkError::NoLogSinkAvailable.into());
        }

        self.state = ServiceState::Starting;
        let id = store.generate_id();
        let run_dir = self
            .tag
            .as_deref()
            .map(|tag| store.create_run_dir(tag))
            .transpose()?;
        let cwd = ctx
            .resolver
            .resolve(&self.definition, run_dir.as_deref(), &store.work_dir(&id))?;

        store.create(&id)?;
        if self.uses_work_dir() {
            store.create_work_dir(&id)?;
        }

        let mut sinks = ctx
            .sinks
            .open_sinks(&store.out_log(&id), &store.err_log(&id))?;
        debug!("log sinks for {id}: {:?}", sinks.pids);

        let cmd = format!(
            "{entry}; echo $? > {}",
            shell_quote(&store.exit_file(&id).display().to_string())
        );
        let started = Utc::now();
        sinks.announce(&format!(
            "starting at {}",
            started.to_rfc3339_opts(SecondsFormat::Micros, true)
        ))?;
        info!("starting {} as instance {id} in {}", self.label(), cwd.display());

        // Not waited on: the service outlives this invocation. Its own
        // process group keeps terminal signals aimed at us away from it.
        let child = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(sinks.stdout)
            .stderr(sinks.stderr)
            .process_group(0)
            .spawn()
            .map_err(|source| StateError::Spawn {
                command: cmd.clone(),
                source,
            })?;
        let pid = child.id();

        store.write_metadata(
            &id,
            &InstanceMeta {
                tag: self.tag.clone(),
                cwd,
                cmd,
                entry,
                started,
            },
        )?;
        store.write_pid(&id, pid)?;
        if let Some(tag) = self.tag.as_deref() {
            store.append_to_tag_instance_list(tag, &id)?;
        }

        self.current = Some(id.clone());
        self.state = ServiceState::Running;
        info!("started {} (instance {id}, pid {pid})", self.label());
        Ok(StartOutcome::Started { id, pid })
    }

    /// Stop the current instance.
    ///
    /// With an `exit` command defined, that command runs instead of any
    /// signalling. Otherwise the live process tree receives SIGTERM, root
    /// first and then by ascending pid, and is awaited up to the configured
    /// budget before the log sinks are given a chance to drain.
    pub async fn stop(&mut self) -> StateResult<StopOutcome> {
        let settings = self.ctx.config.settings();
        let stop_timeout = Duration::from_secs(settings.stop_timeout_secs);
        let drain_timeout = Duration::from_millis(settings.drain_timeout_ms);

        if let Some(exit_cmd) = self.definition.exit.clone() {
            return self
                .run_exit_command(&exit_cmd, stop_timeout, drain_timeout)
                .await;
        }

        let (Some(id), Some(root)) = (self.current.clone(), self.live_root()) else {
            info!("{} is not running", self.label());
            self.state = ServiceState::NotRunning;
            return Ok(StopOutcome::NotRunning);
        };

        self.state = ServiceState::Stopping;
        let tree = root.descendants();
        info!(
            "stopping {} (instance {id}, {} process(es))",
            self.label(),
            tree.len()
        );

        let mut already_gone = Vec::new();
        for handle in &tree {
            match handle.signal(Signal::SIGTERM) {
                Ok(()) => debug!(pid = handle.pid(), "sent SIGTERM"),
                Err(ProcessError::AlreadyTerminated(pid)) => {
                    warn!(pid, "process exited before it could be signalled");
                    already_gone.push(pid);
                }
                Err(e) => warn!("{e}"),
            }
        }

        let (_, running) = ProcessHandle::wait_all(&tree, stop_timeout).await;
        if !running.is_empty() {
            let still_running: Vec<u32> = running.iter().map(ProcessHandle::pid).collect();
            warn!(
                "{} still has running processes after {}s: {still_running:?}",
                self.label(),
                stop_timeout.as_secs()
            );
            self.state = ServiceState::Running;
            return Ok(StopOutcome::TimedOut { id, still_running });
        }

        self.finish_stop(&id, drain_timeout).await?;
        Ok(StopOutcome::Stopped { id, already_gone })
    }

    async fn run_exit_command(
        &mut self,
        exit_cmd: &str,
        stop_timeout: Duration,
        drain_timeout: Duration,
    ) -> StateResult<StopOutcome> {
        let tree = self
            .live_root()
            .map(|root| root.descendants())
            .unwrap_or_default();

        let fallback = match (&self.current, self.tag.as_deref()) {
            (Some(id), _) => self.ctx.store.work_dir(id),
            (None, Some(tag)) => self.ctx.store.create_run_dir(tag)?,
            (None, None) => self.ctx.config.paths().base.clone(),
        };
        let cwd = self.resolve_cwd(&fallback)?;

        info!("running exit command for {} in {}", self.label(), cwd.display());
        self.state = ServiceState::Stopping;
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(exit_cmd)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| StateError::Spawn {
                command: exit_cmd.to_string(),
                source,
            })?;
        let status = status.code().unwrap_or(-1);

        let mut still_running = Vec::new();
        if status == 0 && !tree.is_empty() {
            let (_, running) = ProcessHandle::wait_all(&tree, stop_timeout).await;
            still_running = running.iter().map(ProcessHandle::pid).collect();
            if still_running.is_empty() {
                if let Some(id) = self.current.clone() {
                    self.finish_stop(&id, drain_timeout).await?;
                }
            }
        }

        if status != 0 {
            warn!("exit command for {} returned {status}", self.label());
        }
        self.refresh();
        Ok(StopOutcome::ExitCommand {
            status,
            still_running,
        })
    }

    async fn finish_stop(&mut self, id: &InstanceId, drain_timeout: Duration) -> StateResult<()> {
        let logs = [self.ctx.store.out_log(id), self.ctx.store.err_log(id)];
        LogSinkPipeline::wait_drained(&logs, drain_timeout).await;
        self.ctx.store.mark_stopped(id, Utc::now())?;
        self.state = ServiceState::Stopped;
        info!("stopped {} (instance {id})", self.label());
        Ok(())
    }

    /// Stop, then start. Refuses to start while the old tree survives.
    pub async fn restart(&mut self) -> StateResult<(StopOutcome, StartOutcome)> {
        let stopped = self.stop().await?;
        let survivors = match &stopped {
            StopOutcome::TimedOut { still_running, .. }
            | StopOutcome::ExitCommand { still_running, .. } => still_running.clone(),
            _ => Vec::new(),
        };
        if !survivors.is_empty() {
            return Err(StateError::StillRunning {
                id: self
                    .current
                    .clone()
                    .ok_or_else(|| StateError::UnknownTag(self.label()))?,
                pids: survivors,
            });
        }

        let started = self.start().await?;
        Ok((stopped, started))
    }

    /// Whether the current instance was launched from the current
    /// definition: same entry, same resolved working directory.
    ///
    /// Only reads; the persisted metadata is never touched.
    pub fn is_up_to_date(&self) -> StateResult<bool> {
        let Some(id) = &self.current else {
            return Ok(false);
        };
        let Some(meta) = self.ctx.store.read_metadata(id) else {
            return Ok(false);
        };
        if self.definition.entry() != Some(meta.entry.as_str()) {
            return Ok(false);
        }
        Ok(self.resolve_cwd(&self.ctx.store.work_dir(id))? == meta.cwd)
    }

    /// Point-in-time report of the service.
    pub fn status(&mut self) -> StatusReport {
        let state = self.refresh();
        let snapshot = self.current.as_ref().map(|id| self.ctx.store.snapshot(id));
        let up_to_date = state.is_running().then(|| {
            self.is_up_to_date().unwrap_or_else(|e| {
                warn!("cannot compare {} with its definition: {e}", self.label());
                false
            })
        });

        StatusReport {
            tag: self.tag.clone(),
            instance: self.current.clone(),
            state,
            pid: snapshot.as_ref().and_then(|s| s.pid),
            started: snapshot
                .as_ref()
                .and_then(|s| s.meta.as_ref())
                .map(|m| m.started),
            stopped: snapshot.as_ref().and_then(|s| s.stopped),
            exit: snapshot.as_ref().and_then(|s| s.exit),
            up_to_date,
        }
    }
}

/// Quote a single word for `sh`.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
