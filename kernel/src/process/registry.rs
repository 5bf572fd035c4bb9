//! Process Registry
//!
//! The global directory of live processes.  One explicitly constructed
//! value with a single short-held lock: the embedding kernel creates one
//! registry at boot and hands the handle to whoever needs lookup.  The
//! lock is taken with preemption suppressed and is never held across a
//! call that can block; iteration therefore hands visitors a snapshot,
//! not the live map.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

use alloc::collections::BTreeMap;

use crate::process::thread::ThreadId;
use crate::process::{GroupId, Process, ProcessId};

/// Visitor verdict for registry iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationDecision {
    Continue,
    Break,
}

/// Directory of all live processes.
pub struct ProcessRegistry {
    processes: Mutex<BTreeMap<ProcessId, Arc<Process>>>,
    /// Monotonic id counter shared by pids and tids.
    next_id: AtomicU32,
}

impl ProcessRegistry {
    pub const fn new() -> Self {
        ProcessRegistry {
            processes: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Allocate a fresh pid: strictly increasing, skipping 0 and any
    /// value still registered after the counter wraps.
    pub fn allocate_pid(&self) -> ProcessId {
        loop {
            let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
            if raw == 0 {
                continue;
            }
            let candidate = ProcessId(raw);
            if !self.processes.lock().contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Tids come out of the same id space as pids.
    pub fn allocate_tid(&self) -> ThreadId {
        ThreadId(self.allocate_pid().0)
    }

    pub fn register(&self, process: Arc<Process>) {
        let pid = process.pid();
        let previous = self.processes.lock().insert(pid, process);
        debug_assert!(previous.is_none(), "pid {} registered twice", pid);
    }

    pub fn unregister(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.lock().remove(&pid)
    }

    pub fn find_by_pid(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.lock().get(&pid).cloned()
    }

    pub fn count(&self) -> usize {
        self.processes.lock().len()
    }

    /// Clone the current handle list.
    ///
    /// This is the snapshot the iteration helpers walk: the next entry is
    /// fixed before any visitor runs, so a visitor unregistering the
    /// entry it is visiting (or any other) cannot derail the remaining
    /// iteration, and the handles keep every visited process alive.
    pub fn snapshot(&self) -> Vec<Arc<Process>> {
        self.processes.lock().values().cloned().collect()
    }

    /// Visit every process. The visitor may stop early and may freely
    /// call back into the registry.
    pub fn for_each(&self, mut visitor: impl FnMut(&Arc<Process>) -> IterationDecision) {
        for process in self.snapshot() {
            if visitor(&process) == IterationDecision::Break {
                break;
            }
        }
    }

    /// Visit every live member of a process group.
    pub fn for_each_in_group(
        &self,
        pgid: GroupId,
        mut visitor: impl FnMut(&Arc<Process>) -> IterationDecision,
    ) {
        for process in self.snapshot() {
            if process.is_dead() || process.pgid() != pgid {
                continue;
            }
            if visitor(&process) == IterationDecision::Break {
                break;
            }
        }
    }

    /// Visit every child of `parent`: processes whose ppid is `parent`
    /// and processes whose tracer attachment currently points at
    /// `parent`. Both relationships count.
    pub fn for_each_child(
        &self,
        parent: ProcessId,
        mut visitor: impl FnMut(&Arc<Process>) -> IterationDecision,
    ) {
        for process in self.snapshot() {
            if process.ppid() != parent && process.tracer() != Some(parent) {
                continue;
            }
            if visitor(&process) == IterationDecision::Break {
                break;
            }
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
