//! In-memory [`ProcessTable`] for signalling scenarios.

use async_trait::async_trait;
use cake_core::process::{ProcessError, ProcessResult, ProcessTable, Signal};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Process table where every signal kills its target, except pids marked
/// stubborn. Pids marked vanished are listed as children but exit right
/// before their signal lands.
#[derive(Default)]
pub struct FakeProcessTable {
    parents: HashMap<u32, u32>,
    alive: Mutex<HashSet<u32>>,
    vanished: HashSet<u32>,
    stubborn: HashSet<u32>,
    signalled: Mutex<Vec<u32>>,
}

#[allow(dead_code)]
impl FakeProcessTable {
    /// `root` with direct `children`.
    pub fn tree(root: u32, children: &[u32]) -> Self {
        let parents: HashMap<u32, u32> = children.iter().map(|&pid| (pid, root)).collect();
        let mut alive: HashSet<u32> = children.iter().copied().collect();
        alive.insert(root);
        Self {
            parents,
            alive: Mutex::new(alive),
            ..Self::default()
        }
    }

    pub fn vanishing(mut self, pid: u32) -> Self {
        self.vanished.insert(pid);
        self
    }

    pub fn stubborn(mut self, pid: u32) -> Self {
        self.stubborn.insert(pid);
        self
    }

    /// Pids in the order they were signalled.
    pub fn signalled(&self) -> Vec<u32> {
        self.signalled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessTable for FakeProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn parents(&self) -> HashMap<u32, u32> {
        let alive = self.alive.lock().unwrap();
        self.parents
            .iter()
            .filter(|(pid, _)| alive.contains(pid))
            .map(|(&pid, &ppid)| (pid, ppid))
            .collect()
    }

    fn signal(&self, pid: u32, _signal: Signal) -> ProcessResult<()> {
        self.signalled.lock().unwrap().push(pid);
        let mut alive = self.alive.lock().unwrap();
        if self.vanished.contains(&pid) || !alive.contains(&pid) {
            alive.remove(&pid);
            return Err(ProcessError::AlreadyTerminated(pid));
        }
        if !self.stubborn.contains(&pid) {
            alive.remove(&pid);
        }
        Ok(())
    }
}
