//! OS process abstraction.
//!
//! [`ProcessTable`] is the only place the core touches the OS process
//! table. [`ProcessHandle`] layers the per-process operations the
//! controller needs on top of it: liveness, descendant enumeration, signal
//! delivery and bounded waiting.
//!
//! A pid without a live process is reported as not running. Processes
//! exiting between invocations is the normal case, not a failure.

pub mod system;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

pub use nix::sys::signal::Signal;
pub use system::SystemProcessTable;

/// Interval between liveness polls in [`ProcessTable::wait_all`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The target exited before the signal could be delivered.
    #[error("Process {0} has already terminated")]
    AlreadyTerminated(u32),

    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        source: nix::errno::Errno,
    },
}

/// Type alias for Result with ProcessError.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Read and signal access to the OS process table.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Whether `pid` maps to a live, non-zombie process.
    fn is_alive(&self, pid: u32) -> bool;

    /// Parent pid of every live process, keyed by pid.
    fn parents(&self) -> HashMap<u32, u32>;

    /// Deliver `signal` to `pid`.
    fn signal(&self, pid: u32, signal: Signal) -> ProcessResult<()>;

    /// Poll until every pid has exited or `timeout` elapses.
    ///
    /// Returns `(terminated, still_running)`.
    async fn wait_all(&self, pids: &[u32], timeout: Duration) -> (Vec<u32>, Vec<u32>) {
        let start = Instant::now();
        loop {
            let (running, terminated): (Vec<u32>, Vec<u32>) =
                pids.iter().partition(|pid| self.is_alive(**pid));
            if running.is_empty() || start.elapsed() >= timeout {
                return (terminated, running);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

/// One OS process, identified by pid.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: u32,
    table: Arc<dyn ProcessTable>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .finish()
    }
}

impl ProcessHandle {
    pub fn new(pid: u32, table: Arc<dyn ProcessTable>) -> Self {
        Self { pid, table }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.table.is_alive(self.pid)
    }

    /// This process followed by all of its recursive children.
    ///
    /// Children are sorted by ascending pid. That approximates parents
    /// before children but pid allocation does not guarantee it.
    pub fn descendants(&self) -> Vec<ProcessHandle> {
        let parents = self.table.parents();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (&pid, &ppid) in &parents {
            children.entry(ppid).or_default().push(pid);
        }

        let mut seen = HashSet::from([self.pid]);
        let mut queue = VecDeque::from([self.pid]);
        let mut found = Vec::new();
        while let Some(pid) = queue.pop_front() {
            for &child in children.get(&pid).into_iter().flatten() {
                if seen.insert(child) {
                    found.push(child);
                    queue.push_back(child);
                }
            }
        }
        found.sort_unstable();

        std::iter::once(self.pid)
            .chain(found)
            .map(|pid| ProcessHandle::new(pid, Arc::clone(&self.table)))
            .collect()
    }

    pub fn signal(&self, signal: Signal) -> ProcessResult<()> {
        self.table.signal(self.pid, signal)
    }

    /// Wait for all `handles` to exit, bounded by `timeout`.
    ///
    /// Returns `(terminated, still_running)`.
    pub async fn wait_all(
        handles: &[ProcessHandle],
        timeout: Duration,
    ) -> (Vec<ProcessHandle>, Vec<ProcessHandle>) {
        let Some(first) = handles.first() else {
            return (Vec::new(), Vec::new());
        };
        let pids: Vec<u32> = handles.iter().map(ProcessHandle::pid).collect();
        let (_, running) = first.table.wait_all(&pids, timeout).await;

        handles
            .iter()
            .cloned()
            .partition(|handle| !running.contains(&handle.pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory table: signalling a pid kills it.
    struct StaticTable {
        parents: HashMap<u32, u32>,
        alive: Mutex<HashSet<u32>>,
    }

    impl StaticTable {
        fn new(edges: &[(u32, u32)]) -> Arc<Self> {
            let parents: HashMap<u32, u32> = edges.iter().copied().collect();
            let mut alive: HashSet<u32> = parents.keys().copied().collect();
            alive.extend(parents.values().copied());
            Arc::new(Self {
                parents,
                alive: Mutex::new(alive),
            })
        }
    }

    #[async_trait]
    impl ProcessTable for StaticTable {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn parents(&self) -> HashMap<u32, u32> {
            self.parents.clone()
        }

        fn signal(&self, pid: u32, _signal: Signal) -> ProcessResult<()> {
            if self.alive.lock().unwrap().remove(&pid) {
                Ok(())
            } else {
                Err(ProcessError::AlreadyTerminated(pid))
            }
        }
    }

    #[test]
    fn test_descendants_root_first_then_ascending() {
        // 100 -> 205 -> 150, 100 -> 120, unrelated 1 -> 50
        let table = StaticTable::new(&[(205, 100), (150, 205), (120, 100), (50, 1), (100, 1)]);
        let root = ProcessHandle::new(100, table);

        let pids: Vec<u32> = root.descendants().iter().map(ProcessHandle::pid).collect();
        assert_eq!(pids, vec![100, 120, 150, 205]);
    }

    #[test]
    fn test_descendants_of_leaf() {
        let table = StaticTable::new(&[(101, 100)]);
        let leaf = ProcessHandle::new(101, table);
        let pids: Vec<u32> = leaf.descendants().iter().map(ProcessHandle::pid).collect();
        assert_eq!(pids, vec![101]);
    }

    #[test]
    fn test_signal_dead_process() {
        let table = StaticTable::new(&[(101, 100)]);
        let handle = ProcessHandle::new(101, table);

        assert!(handle.signal(Signal::SIGTERM).is_ok());
        assert!(!handle.is_alive());
        assert_eq!(
            handle.signal(Signal::SIGTERM),
            Err(ProcessError::AlreadyTerminated(101))
        );
    }

    #[tokio::test]
    async fn test_wait_all_times_out_with_survivors() {
        let table = StaticTable::new(&[(101, 100), (102, 100)]);
        let handles = ProcessHandle::new(100, table).descendants();
        handles[1].signal(Signal::SIGTERM).unwrap();

        let (gone, running) = ProcessHandle::wait_all(&handles, Duration::from_millis(120)).await;
        let gone: Vec<u32> = gone.iter().map(ProcessHandle::pid).collect();
        let running: Vec<u32> = running.iter().map(ProcessHandle::pid).collect();
        assert_eq!(gone, vec![101]);
        assert_eq!(running, vec![100, 102]);
    }

    #[tokio::test]
    async fn test_wait_all_empty() {
        let (gone, running) = ProcessHandle::wait_all(&[], Duration::from_secs(1)).await;
        assert!(gone.is_empty());
        assert!(running.is_empty());
    }
}
