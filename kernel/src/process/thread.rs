//! Kernel Threads
//!
//! A thread is the schedulable unit; it owns a strong reference to its
//! process, while the process side of the relationship (the thread list)
//! is weak.  The scheduler collaborator holds the `Arc<Thread>` handles
//! and drives execution; this module only tracks identity, state, and
//! the hooks the process lifecycle needs (unwind requests, wait
//! interruption).

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use crate::process::Process;
use crate::sync::Waiter;

/// Thread ID. Tids are drawn from the same counter as pids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Saved register state. The layout that matters lives with the
/// architecture collaborator; the lifecycle only copies it around
/// (fork seeds the child's first thread from the caller's state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadContext {
    pub instruction_pointer: u64,
    pub stack_pointer: u64,
    pub flags: u64,
}

impl ThreadContext {
    pub const fn zero() -> Self {
        ThreadContext {
            instruction_pointer: 0,
            stack_pointer: 0,
            flags: 0,
        }
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::zero()
    }
}

/// Thread execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Eligible to run.
    Runnable,
    /// Parked on a wait object.
    Blocked,
    /// Suspended by job control or a tracer.
    Stopped,
    /// Unwinding toward exit.
    Dying,
    /// Gone; only the handle remains.
    Dead,
}

/// One thread of a process.
pub struct Thread {
    tid: ThreadId,
    process: Arc<Process>,
    state: Mutex<ThreadState>,
    context: Mutex<ThreadContext>,
    /// Set when the process is tearing down and this thread must exit.
    should_unwind: AtomicBool,
    /// The waiter this thread is currently parked on, if any. Signal
    /// delivery interrupts it through this handle.
    current_waiter: Mutex<Option<Arc<Waiter>>>,
}

impl Thread {
    pub(crate) fn new(tid: ThreadId, process: Arc<Process>, context: ThreadContext) -> Arc<Self> {
        Arc::new(Thread {
            tid,
            process,
            state: Mutex::new(ThreadState::Runnable),
            context: Mutex::new(context),
            should_unwind: AtomicBool::new(false),
            current_waiter: Mutex::new(None),
        })
    }

    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    pub fn context(&self) -> ThreadContext {
        *self.context.lock()
    }

    pub fn set_context(&self, context: ThreadContext) {
        *self.context.lock() = context;
    }

    /// Ask the thread to unwind and exit. Interrupts any wait it is
    /// parked in so the request is seen promptly.
    pub fn request_unwind(&self) {
        self.should_unwind.store(true, Ordering::Release);
        self.set_state(ThreadState::Dying);
        self.interrupt_blocked_wait();
    }

    pub fn should_unwind(&self) -> bool {
        self.should_unwind.load(Ordering::Acquire)
    }

    /// Interrupt the wait this thread is parked in, if any. Signal
    /// delivery path.
    pub fn interrupt_blocked_wait(&self) {
        if let Some(waiter) = self.current_waiter.lock().as_ref() {
            waiter.interrupt();
        }
    }

    /// Record the waiter about to be blocked on. Called before dropping
    /// the locks that protect the wait check.
    pub(crate) fn begin_blocking(&self, waiter: Arc<Waiter>) {
        *self.current_waiter.lock() = Some(waiter);
        self.set_state(ThreadState::Blocked);
    }

    /// Forget the waiter after the block resolves.
    pub(crate) fn end_blocking(&self) {
        *self.current_waiter.lock() = None;
        self.set_state(ThreadState::Runnable);
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("state", &self.state())
            .finish()
    }
}
