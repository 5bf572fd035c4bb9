//! Process Management
//!
//! The process object and everything hanging off it: guarded credentials,
//! promise-based capability restriction, the unveil tree, the descriptor
//! table, thread membership, and the registry of live processes.
//!
//! # Locking
//!
//! Every process carries one coarse `big_lock` serializing privileged
//! mutations (credential updates, pledge/unveil, exec, the fork commit).
//! Hot short-lived structures (the thread list, the futex table, the
//! descriptor table) sit behind their own spin locks, which are never
//! held across a blocking wait.

pub mod credentials;
pub mod fd;
pub mod lifecycle;
pub mod pledge;
pub mod registry;
pub mod thread;
pub mod unveil;

pub use lifecycle::{WaitInfo, WaitSelector};
pub use registry::{IterationDecision, ProcessRegistry};
pub use thread::{Thread, ThreadContext, ThreadId, ThreadState};

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use hashbrown::HashMap;
use spin::{Mutex, MutexGuard};

use crate::errno::{Errno, SysResult};
use crate::loader::{AddressSpace, MasterTls};
use crate::signal::{SignalState, SIGABRT};
use crate::sync::futex::FutexQueues;
use crate::sync::WaitCondition;

use credentials::{Credentials, ProtectedCredentials, Uid};
use fd::FdTable;
use pledge::Promise;
use unveil::{UnveilTree, VeilState};

/// Process ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process group ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coredump metadata: at most this many distinct keys per process.
pub const COREDUMP_METADATA_MAX_ENTRIES: usize = 16;
/// Coredump metadata: longest accepted key or value.
pub const COREDUMP_METADATA_MAX_LEN: usize = 16 * 1024;

/// Metadata key recorded when a promise check fails fatally.
pub const PLEDGE_VIOLATION_KEY: &str = "pledge_violation";

/// A running (or dying, or dead-but-unreaped) program.
///
/// Kept alive by the registry, by each of its threads, and by anyone who
/// looked it up; destroyed only after it is reaped and the last handle
/// drops.  Back-references (tracer, process group, controlling terminal)
/// are ids resolved through lookup, never owning pointers.
pub struct Process {
    name: Mutex<String>,
    creds: ProtectedCredentials,
    registry: Arc<ProcessRegistry>,
    is_kernel_process: bool,

    space: Mutex<AddressSpace>,
    executable_path: Mutex<Option<String>>,
    current_directory: Mutex<String>,
    root_directory: Mutex<String>,
    arguments: Mutex<Vec<String>>,
    environment: Mutex<Vec<String>>,

    fds: Mutex<FdTable>,

    thread_count: AtomicU32,
    thread_list: Mutex<BTreeMap<ThreadId, Weak<Thread>>>,

    veil: Mutex<UnveilTree>,
    signals: Mutex<SignalState>,

    pgid: Mutex<GroupId>,
    tracer: Mutex<Option<ProcessId>>,
    umask: AtomicU32,

    dead: AtomicBool,
    stopped: AtomicBool,
    profiling: AtomicBool,
    should_dump_core: AtomicBool,
    finalized: AtomicBool,
    reaped: AtomicBool,
    termination_status: AtomicU32,
    termination_signal: AtomicU8,

    ticks_user: AtomicU64,
    ticks_kernel: AtomicU64,
    ticks_user_dead_children: AtomicU64,
    ticks_kernel_dead_children: AtomicU64,

    coredump_metadata: Mutex<HashMap<String, String>>,
    futex_queues: FutexQueues,
    master_tls: Mutex<Option<MasterTls>>,

    /// Waiters blocked in this process's `waitid` calls park here; a
    /// dying child notifies its parent's condition from `finalize`.
    wait_condition: WaitCondition,

    big_lock: Mutex<()>,
}

impl Process {
    pub(crate) fn new(
        registry: Arc<ProcessRegistry>,
        name: String,
        credentials: Credentials,
        space: AddressSpace,
        is_kernel_process: bool,
    ) -> Arc<Self> {
        let pgid = GroupId(credentials.pid.0);
        Arc::new(Process {
            name: Mutex::new(name),
            creds: ProtectedCredentials::new(credentials),
            registry,
            is_kernel_process,
            space: Mutex::new(space),
            executable_path: Mutex::new(None),
            current_directory: Mutex::new(String::from("/")),
            root_directory: Mutex::new(String::from("/")),
            arguments: Mutex::new(Vec::new()),
            environment: Mutex::new(Vec::new()),
            fds: Mutex::new(FdTable::new()),
            thread_count: AtomicU32::new(0),
            thread_list: Mutex::new(BTreeMap::new()),
            veil: Mutex::new(UnveilTree::new()),
            signals: Mutex::new(SignalState::new()),
            pgid: Mutex::new(pgid),
            tracer: Mutex::new(None),
            umask: AtomicU32::new(0o022),
            dead: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            profiling: AtomicBool::new(false),
            should_dump_core: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            reaped: AtomicBool::new(false),
            termination_status: AtomicU32::new(0),
            termination_signal: AtomicU8::new(0),
            ticks_user: AtomicU64::new(0),
            ticks_kernel: AtomicU64::new(0),
            ticks_user_dead_children: AtomicU64::new(0),
            ticks_kernel_dead_children: AtomicU64::new(0),
            coredump_metadata: Mutex::new(HashMap::new()),
            futex_queues: FutexQueues::new(),
            master_tls: Mutex::new(None),
            wait_condition: WaitCondition::new(),
            big_lock: Mutex::new(()),
        })
    }

    // ─── Identity ───────────────────────────────────────────────────

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.lock() = name;
    }

    pub fn pid(&self) -> ProcessId {
        self.creds.with(|c| c.pid)
    }

    pub fn ppid(&self) -> ProcessId {
        self.creds.with(|c| c.ppid)
    }

    pub fn sid(&self) -> SessionId {
        self.creds.with(|c| c.sid)
    }

    pub fn pgid(&self) -> GroupId {
        *self.pgid.lock()
    }

    pub fn set_pgid(&self, pgid: GroupId) {
        *self.pgid.lock() = pgid;
    }

    pub fn is_session_leader(&self) -> bool {
        self.creds.with(|c| c.sid.0 == c.pid.0)
    }

    pub fn is_group_leader(&self) -> bool {
        self.pgid().0 == self.pid().0
    }

    pub fn is_kernel_process(&self) -> bool {
        self.is_kernel_process
    }

    pub fn is_user_process(&self) -> bool {
        !self.is_kernel_process
    }

    /// The guarded credential block.
    pub fn credentials(&self) -> &ProtectedCredentials {
        &self.creds
    }

    pub fn is_superuser(&self) -> bool {
        self.creds.with(|c| c.euid == 0)
    }

    pub fn euid(&self) -> Uid {
        self.creds.with(|c| c.euid)
    }

    pub fn is_dumpable(&self) -> bool {
        self.creds.with(|c| c.dumpable)
    }

    // ─── Flags and state ────────────────────────────────────────────

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub(crate) fn set_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Flip the job-control suspension flag, returning the old value.
    pub fn set_stopped(&self, stopped: bool) -> bool {
        self.stopped.swap(stopped, Ordering::AcqRel)
    }

    pub fn is_profiling(&self) -> bool {
        self.profiling.load(Ordering::Acquire)
    }

    pub fn set_profiling(&self, profiling: bool) {
        self.profiling.store(profiling, Ordering::Release);
    }

    pub fn should_dump_core(&self) -> bool {
        self.should_dump_core.load(Ordering::Acquire)
    }

    pub fn is_reaped(&self) -> bool {
        self.reaped.load(Ordering::Acquire)
    }

    pub fn termination_status(&self) -> i32 {
        self.termination_status.load(Ordering::Acquire) as i32
    }

    pub fn termination_signal(&self) -> Option<u8> {
        match self.termination_signal.load(Ordering::Acquire) {
            0 => None,
            signal => Some(signal),
        }
    }

    pub fn umask(&self) -> u32 {
        self.umask.load(Ordering::Acquire)
    }

    /// Install a new umask, returning the previous one.
    pub fn set_umask(&self, mask: u32) -> u32 {
        self.umask.swap(mask & 0o777, Ordering::AcqRel)
    }

    // ─── Tracing ────────────────────────────────────────────────────

    /// Pid of the attached tracer, if any. A non-owning back-reference.
    pub fn tracer(&self) -> Option<ProcessId> {
        *self.tracer.lock()
    }

    pub fn start_tracing_from(&self, tracer: ProcessId) {
        *self.tracer.lock() = Some(tracer);
    }

    pub fn stop_tracing(&self) {
        *self.tracer.lock() = None;
    }

    pub fn is_traced(&self) -> bool {
        self.tracer.lock().is_some()
    }

    // ─── Subsystem access ───────────────────────────────────────────

    /// The coarse per-process lock. Privileged mutating operations take
    /// this first; it is never held across a blocking wait.
    pub fn big_lock(&self) -> MutexGuard<'_, ()> {
        self.big_lock.lock()
    }

    pub fn with_fds<R>(&self, f: impl FnOnce(&mut FdTable) -> R) -> R {
        f(&mut self.fds.lock())
    }

    pub fn with_veil<R>(&self, f: impl FnOnce(&mut UnveilTree) -> R) -> R {
        f(&mut self.veil.lock())
    }

    pub fn veil_state(&self) -> VeilState {
        self.veil.lock().state()
    }

    pub fn with_signals<R>(&self, f: impl FnOnce(&mut SignalState) -> R) -> R {
        f(&mut self.signals.lock())
    }

    pub fn futex_queues(&self) -> &FutexQueues {
        &self.futex_queues
    }

    pub fn master_tls(&self) -> Option<MasterTls> {
        self.master_tls.lock().clone()
    }

    pub fn address_space(&self) -> AddressSpace {
        self.space.lock().clone()
    }

    pub fn executable_path(&self) -> Option<String> {
        self.executable_path.lock().clone()
    }

    pub fn current_directory(&self) -> String {
        self.current_directory.lock().clone()
    }

    pub fn set_current_directory(&self, path: String) {
        *self.current_directory.lock() = path;
    }

    pub fn root_directory(&self) -> String {
        self.root_directory.lock().clone()
    }

    pub fn arguments(&self) -> Vec<String> {
        self.arguments.lock().clone()
    }

    pub fn environment(&self) -> Vec<String> {
        self.environment.lock().clone()
    }

    pub(crate) fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub(crate) fn wait_condition(&self) -> &WaitCondition {
        &self.wait_condition
    }

    // ─── Threads ────────────────────────────────────────────────────

    pub fn thread_count(&self) -> u32 {
        self.thread_count.load(Ordering::Acquire)
    }

    /// Visit every live thread. The thread-list lock is fine-grained and
    /// short; the visitor must not block.
    pub fn for_each_thread(&self, mut visitor: impl FnMut(&Arc<Thread>) -> IterationDecision) {
        let threads: Vec<Arc<Thread>> = {
            let list = self.thread_list.lock();
            list.values().filter_map(Weak::upgrade).collect()
        };
        for thread in &threads {
            if visitor(thread) == IterationDecision::Break {
                break;
            }
        }
    }

    pub fn any_thread(&self) -> Option<Arc<Thread>> {
        let list = self.thread_list.lock();
        list.values().find_map(Weak::upgrade)
    }

    // ─── CPU time accounting ────────────────────────────────────────

    /// Charge scheduler ticks to this process.
    pub fn charge_ticks(&self, user: u64, kernel: u64) {
        self.ticks_user.fetch_add(user, Ordering::Relaxed);
        self.ticks_kernel.fetch_add(kernel, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> (u64, u64) {
        (
            self.ticks_user.load(Ordering::Relaxed),
            self.ticks_kernel.load(Ordering::Relaxed),
        )
    }

    /// Accumulated CPU time of already-reaped children.
    pub fn dead_children_ticks(&self) -> (u64, u64) {
        (
            self.ticks_user_dead_children.load(Ordering::Relaxed),
            self.ticks_kernel_dead_children.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn absorb_dead_child_ticks(&self, user: u64, kernel: u64) {
        self.ticks_user_dead_children
            .fetch_add(user, Ordering::Relaxed);
        self.ticks_kernel_dead_children
            .fetch_add(kernel, Ordering::Relaxed);
    }

    // ─── Coredump metadata ──────────────────────────────────────────

    /// Attach a key/value pair to the process's coredump metadata.
    pub fn set_coredump_metadata(&self, key: &str, value: &str) -> SysResult<()> {
        if key.is_empty() || key.len() > COREDUMP_METADATA_MAX_LEN {
            return Err(Errno::EINVAL);
        }
        if value.len() > COREDUMP_METADATA_MAX_LEN {
            return Err(Errno::EINVAL);
        }
        let mut metadata = self.coredump_metadata.lock();
        if !metadata.contains_key(key) && metadata.len() >= COREDUMP_METADATA_MAX_ENTRIES {
            return Err(Errno::EFAULT);
        }
        metadata.insert(String::from(key), String::from(value));
        Ok(())
    }

    pub fn coredump_metadata(&self, key: &str) -> Option<String> {
        self.coredump_metadata.lock().get(key).cloned()
    }

    pub fn coredump_metadata_count(&self) -> usize {
        self.coredump_metadata.lock().len()
    }

    // ─── Promise enforcement ────────────────────────────────────────

    pub fn has_promises(&self) -> bool {
        self.creds.with(|c| c.has_promises)
    }

    pub fn has_promised(&self, promise: Promise) -> bool {
        self.creds.with(|c| c.promises.has(promise))
    }

    /// Gate a privileged operation on a pledged promise.
    ///
    /// Proceeding without the required promise while promises are active
    /// is a security violation, not an error the caller recovers from:
    /// the violated promise is recorded in the coredump metadata and the
    /// process is abnormally terminated.  The `EPERM` returned here only
    /// unwinds the already-doomed calling context.
    pub fn require_promise(self: &Arc<Self>, promise: Promise) -> SysResult<()> {
        let violated = self
            .creds
            .with(|c| c.has_promises && !c.promises.has(promise));
        if !violated {
            return Ok(());
        }
        log::warn!(
            "[Oryx/proc] {}({}) has not pledged {}",
            self.name(),
            self.pid(),
            promise.name()
        );
        let _ = self.set_coredump_metadata(PLEDGE_VIOLATION_KEY, promise.name());
        self.should_dump_core.store(true, Ordering::Release);
        self.terminate_due_to_signal(SIGABRT);
        Err(Errno::EPERM)
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.pid())
    }
}
