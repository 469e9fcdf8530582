//! [`ProcessTable`] backed by the host OS.

use super::{ProcessError, ProcessResult, ProcessTable, Signal};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid as NixPid;
use std::collections::HashMap;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use tracing::trace;

/// Reads the process table through `sysinfo` and signals through `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }
}

fn is_live_status(status: ProcessStatus) -> bool {
    !matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        let mut sys = System::new();
        let sysinfo_pid = Pid::from_u32(pid);
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sysinfo_pid]),
            true,
            ProcessRefreshKind::nothing(),
        );

        match sys.process(sysinfo_pid) {
            Some(process) => is_live_status(process.status()),
            None => {
                trace!("no process found for pid {pid}");
                false
            }
        }
    }

    fn parents(&self) -> HashMap<u32, u32> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());

        sys.processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter(|(_, process)| is_live_status(process.status()))
            .filter_map(|(pid, process)| Some((pid.as_u32(), process.parent()?.as_u32())))
            .collect()
    }

    fn signal(&self, pid: u32, signal: Signal) -> ProcessResult<()> {
        let raw = i32::try_from(pid).map_err(|_| ProcessError::Signal {
            pid,
            source: Errno::EINVAL,
        })?;

        match kill(NixPid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(ProcessError::AlreadyTerminated(pid)),
            Err(source) => Err(ProcessError::Signal { pid, source }),
        }
    }
}
