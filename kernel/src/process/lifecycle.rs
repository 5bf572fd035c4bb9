//! Process Lifecycle
//!
//! Creation (kernel- and user-process paths), fork, in-place image
//! replacement, termination, finalization, and reaping.
//!
//! A process moves Active → Dying (termination signal recorded) → Dead
//! (finalized, waiters notified) → Reaped (consumed by a parent wait and
//! removed from the registry).  The Stopped flag is orthogonal job-control
//! suspension.  All transitions are one-directional except Active↔Stopped.
//!
//! Thread exits drive the terminal transitions: the last thread to leave
//! triggers `finalize`, guarded so it runs exactly once no matter how the
//! last references race.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use crate::errno::{Errno, SysResult};
use crate::loader::{AddressSpace, ImageLoader};
use crate::process::credentials::{Credentials, Gid, Uid};
use crate::process::fd::{FdFlags, FileDescription};
use crate::process::registry::{IterationDecision, ProcessRegistry};
use crate::process::thread::{Thread, ThreadContext, ThreadState};
use crate::process::{GroupId, Process, ProcessId, SessionId};
use crate::signal::{self, DefaultAction, Disposition};

/// Terminal state handed to a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitInfo {
    pub pid: ProcessId,
    /// Exit status passed to `exit`, 0 for signal deaths.
    pub exit_status: i32,
    /// Terminating signal, if the process died to one.
    pub signal: Option<u8>,
}

/// Which children a wait call is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSelector {
    /// Any child.
    Any,
    /// The child with this exact pid.
    Pid(ProcessId),
    /// Any child in this process group.
    Group(GroupId),
}

impl WaitSelector {
    pub fn matches(&self, child: &Process) -> bool {
        match *self {
            WaitSelector::Any => true,
            WaitSelector::Pid(pid) => child.pid() == pid,
            WaitSelector::Group(pgid) => child.pgid() == pgid,
        }
    }
}

fn name_from_path(path: &str) -> String {
    path.rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or(path)
        .to_string()
}

impl Process {
    // ─── Creation ───────────────────────────────────────────────────

    /// Create a kernel process with one thread entering at `entry`.
    pub fn create_kernel_process(
        registry: &Arc<ProcessRegistry>,
        name: &str,
        entry: ThreadContext,
    ) -> (Arc<Process>, Arc<Thread>) {
        let pid = registry.allocate_pid();
        let credentials = Credentials::root(pid, ProcessId(0), SessionId(pid.0));
        let process = Process::new(
            registry.clone(),
            name.to_string(),
            credentials,
            AddressSpace::kernel(),
            true,
        );
        let thread = process.spawn_thread(entry);
        registry.register(process.clone());
        log::debug!("[Oryx/proc] Created kernel process {}({})", name, pid);
        (process, thread)
    }

    /// Create a user process from an executable image.
    ///
    /// Loading is the only fallible step and happens before any global
    /// state is touched; a load failure creates nothing.
    pub fn create_user_process(
        registry: &Arc<ProcessRegistry>,
        loader: &dyn ImageLoader,
        path: &str,
        uid: Uid,
        gid: Gid,
        ppid: ProcessId,
        arguments: Vec<String>,
        environment: Vec<String>,
    ) -> SysResult<(Arc<Process>, Arc<Thread>)> {
        let image = loader.load(path)?;

        let pid = registry.allocate_pid();
        let mut credentials = Credentials::root(pid, ppid, SessionId(pid.0));
        credentials.uid = uid;
        credentials.euid = uid;
        credentials.suid = uid;
        credentials.gid = gid;
        credentials.egid = gid;
        credentials.sgid = gid;

        let process = Process::new(
            registry.clone(),
            name_from_path(path),
            credentials,
            image.space,
            false,
        );
        *process.executable_path.lock() = Some(image.executable_path);
        *process.arguments.lock() = arguments;
        *process.environment.lock() = environment;
        *process.master_tls.lock() = image.master_tls;

        // Standard descriptors; the real endpoints (tty, pipes) are wired
        // up by the spawning context.
        process.with_fds(|fds| -> SysResult<()> {
            fds.install(0, FileDescription::new("/dev/stdin"), FdFlags::empty())?;
            fds.install(1, FileDescription::new("/dev/stdout"), FdFlags::empty())?;
            fds.install(2, FileDescription::new("/dev/stderr"), FdFlags::empty())?;
            Ok(())
        })?;

        let thread = process.spawn_thread(ThreadContext {
            instruction_pointer: image.entry_point,
            stack_pointer: 0,
            flags: 0,
        });
        registry.register(process.clone());
        log::debug!(
            "[Oryx/proc] Created user process {}({}) uid={} gid={}",
            process.name(),
            pid,
            uid,
            gid
        );
        Ok((process, thread))
    }

    // ─── Thread membership ──────────────────────────────────────────

    /// Create a new thread in this process.
    pub fn spawn_thread(self: &Arc<Self>, context: ThreadContext) -> Arc<Thread> {
        let tid = self.registry().allocate_tid();
        let thread = Thread::new(tid, self.clone(), context);
        self.add_thread(&thread);
        thread
    }

    pub(crate) fn add_thread(&self, thread: &Arc<Thread>) {
        self.thread_list
            .lock()
            .insert(thread.tid(), Arc::downgrade(thread));
        self.thread_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Take a thread out of the process.  The last removal drives the
    /// Dying → Dead transition through `finalize`.
    pub fn remove_thread(self: &Arc<Self>, thread: &Arc<Thread>) {
        thread.set_state(ThreadState::Dead);
        self.thread_list.lock().remove(&thread.tid());
        let previous = self.thread_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "thread count underflow");
        if previous == 1 {
            self.finalize();
        }
    }

    /// A thread's exit path, called by the scheduler when the thread has
    /// unwound. Equivalent to `remove_thread`; the name marks intent.
    pub fn exit_thread(self: &Arc<Self>, thread: &Arc<Thread>) {
        self.remove_thread(thread);
    }

    // ─── Voluntary and signal exit ──────────────────────────────────

    /// `exit(2)`: record the status and ask every thread to unwind.
    /// The process becomes Dead when the last of them leaves.
    pub fn exit(self: &Arc<Self>, status: i32) {
        self.termination_status
            .store(status as u32, Ordering::Release);
        self.termination_signal.store(0, Ordering::Release);
        self.for_each_thread(|thread| {
            thread.request_unwind();
            IterationDecision::Continue
        });
    }

    /// Abnormal termination by `signal`: record it, ask all threads to
    /// unwind, and finalize once the last one has stopped.
    pub fn terminate_due_to_signal(self: &Arc<Self>, signal: u8) {
        log::debug!(
            "[Oryx/proc] {}({}) terminating due to signal {}",
            self.name(),
            self.pid(),
            signal
        );
        self.termination_status.store(0, Ordering::Release);
        self.termination_signal.store(signal, Ordering::Release);
        self.for_each_thread(|thread| {
            thread.request_unwind();
            IterationDecision::Continue
        });
        if self.thread_count() == 0 {
            self.finalize();
        }
    }

    /// Terminal cleanup, run exactly once.
    ///
    /// Releases the image-scoped resources, folds CPU time into the
    /// parent's dead-children totals, and wakes every waiter blocked on
    /// this process's exit, once each.
    pub(crate) fn finalize(self: &Arc<Self>) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_dead();
        log::debug!("[Oryx/proc] Finalizing {}({})", self.name(), self.pid());

        // Detach whatever thread bookkeeping remains and release the
        // image and resource tables.
        self.thread_list.lock().clear();
        self.with_fds(|fds| *fds = super::fd::FdTable::new());
        self.futex_queues.clear();
        *self.master_tls.lock() = None;
        *self.space.lock() = AddressSpace::kernel();

        let ppid = self.ppid();
        let parent = if ppid.0 == 0 {
            None
        } else {
            self.registry().find_by_pid(ppid).filter(|p| !p.is_dead())
        };

        match parent {
            Some(parent) => {
                let (user, kernel) = self.ticks();
                parent.absorb_dead_child_ticks(user, kernel);
                parent.with_signals(|s| s.set_pending(signal::SIGCHLD));
                // Every thread blocked in the parent's wait gets exactly
                // one wakeup for this terminal event.
                parent.wait_condition().notify_all();
            }
            None => {
                // Nobody will ever reap a parentless corpse; release it.
                self.reaped.store(true, Ordering::Release);
                self.registry().unregister(self.pid());
            }
        }
    }

    /// Consume this process's terminal state for a waiting parent.
    ///
    /// Succeeds exactly once: the winning wait call takes the state and
    /// unregisters the process; everyone else sees nothing to reap.
    pub fn try_reap(self: &Arc<Self>) -> Option<WaitInfo> {
        if !self.is_dead() {
            return None;
        }
        if self.reaped.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.registry().unregister(self.pid());
        Some(WaitInfo {
            pid: self.pid(),
            exit_status: self.termination_status(),
            signal: self.termination_signal(),
        })
    }

    // ─── Signal delivery ────────────────────────────────────────────

    /// Deliver `signal` to this process.  Permission checks belong to
    /// the syscall layer; lifecycle races surface as `ESRCH`.
    pub fn send_signal(self: &Arc<Self>, signal: u8) -> SysResult<()> {
        if self.is_dead() {
            return Err(Errno::ESRCH);
        }
        match signal {
            signal::SIGKILL => {
                self.terminate_due_to_signal(signal);
                return Ok(());
            }
            signal::SIGCONT => {
                self.set_stopped(false);
                return Ok(());
            }
            _ => {}
        }

        let disposition = self.with_signals(|s| s.disposition(signal));
        match disposition {
            Disposition::Ignore => Ok(()),
            Disposition::Handler(_) => {
                self.with_signals(|s| s.set_pending(signal));
                // A blocked thread must notice the signal and return
                // EINTR from its wait.
                if let Some(thread) = self.any_thread() {
                    thread.interrupt_blocked_wait();
                }
                Ok(())
            }
            Disposition::Default => match signal::default_action(signal) {
                DefaultAction::Ignore | DefaultAction::Continue => Ok(()),
                DefaultAction::Stop => {
                    self.set_stopped(true);
                    Ok(())
                }
                DefaultAction::Terminate => {
                    self.terminate_due_to_signal(signal);
                    Ok(())
                }
                DefaultAction::DumpCore => {
                    self.should_dump_core.store(true, Ordering::Release);
                    self.terminate_due_to_signal(signal);
                    Ok(())
                }
            },
        }
    }

    // ─── Fork ───────────────────────────────────────────────────────

    /// Create a child duplicating this process.
    ///
    /// The child gets copied credentials under a fresh pid, an
    /// independently duplicated descriptor table, pledge and unveil
    /// state copied verbatim, and exactly one thread seeded from the
    /// caller's register state.
    pub fn fork(self: &Arc<Self>, caller_regs: ThreadContext) -> SysResult<(Arc<Process>, Arc<Thread>)> {
        let _big = self.big_lock();

        let child_pid = self.registry().allocate_pid();
        let child_creds = self.creds.snapshot().forked(child_pid);
        let child = Process::new(
            self.registry().clone(),
            self.name(),
            child_creds,
            self.address_space().duplicate(),
            false,
        );

        *child.fds.lock() = self.fds.lock().clone_for_fork();
        *child.veil.lock() = self.veil.lock().clone();
        *child.signals.lock() = self.signals.lock().clone();
        *child.pgid.lock() = self.pgid();
        *child.executable_path.lock() = self.executable_path();
        *child.current_directory.lock() = self.current_directory();
        *child.root_directory.lock() = self.root_directory();
        *child.arguments.lock() = self.arguments();
        *child.environment.lock() = self.environment();
        child.umask.store(self.umask(), Ordering::Release);
        *child.master_tls.lock() = self.master_tls();

        let thread = child.spawn_thread(caller_regs);
        self.registry().register(child.clone());
        log::debug!(
            "[Oryx/proc] {}({}) forked child {}",
            self.name(),
            self.pid(),
            child_pid
        );
        Ok((child, thread))
    }

    // ─── Exec ───────────────────────────────────────────────────────

    /// Replace the running image in place, keeping the process identity.
    ///
    /// The load is the only step that can fail, and it completes before
    /// anything is committed: on error the previous image, credentials,
    /// and descriptor table are untouched.  On success the exec-promise
    /// slot (active or not) becomes the promise slot, image-scoped
    /// resources are cleared, and close-on-exec descriptors are dropped.
    pub fn exec(
        self: &Arc<Self>,
        executing: &Arc<Thread>,
        loader: &dyn ImageLoader,
        path: &str,
        arguments: Vec<String>,
        environment: Vec<String>,
    ) -> SysResult<()> {
        let _big = self.big_lock();

        let image = loader.load(path)?;

        // Point of no return: everything below is infallible.
        self.for_each_thread(|thread| {
            if !Arc::ptr_eq(thread, executing) {
                thread.request_unwind();
            }
            IterationDecision::Continue
        });

        *self.space.lock() = image.space;
        *self.executable_path.lock() = Some(image.executable_path);
        self.set_name(name_from_path(path));
        *self.arguments.lock() = arguments;
        *self.environment.lock() = environment;

        // Image-scoped resources do not survive the image.
        self.futex_queues.clear();
        *self.master_tls.lock() = image.master_tls;
        self.with_signals(|s| s.reset_for_exec());
        self.with_fds(|fds| fds.close_on_exec());

        {
            let mut creds = self.creds.unprotect();
            creds.has_promises = creds.has_execpromises;
            creds.promises = creds.execpromises;
            creds.has_execpromises = false;
            creds.execpromises = Default::default();
            creds.dumpable = true;
        }

        executing.set_context(ThreadContext {
            instruction_pointer: image.entry_point,
            stack_pointer: 0,
            flags: 0,
        });
        log::debug!(
            "[Oryx/proc] {}({}) replaced image with {}",
            self.name(),
            self.pid(),
            path
        );
        Ok(())
    }

    // ─── Disown ─────────────────────────────────────────────────────

    /// Give up the wait/reap relationship with a child.  A child that is
    /// already dead is released immediately; a live one will release
    /// itself when it finalizes with no parent left.
    pub fn disown(self: &Arc<Self>, child: &Arc<Process>) -> SysResult<()> {
        if child.ppid() != self.pid() {
            return Err(Errno::ECHILD);
        }
        {
            let _child_big = child.big_lock();
            let mut creds = child.creds.unprotect();
            creds.ppid = ProcessId(0);
        }
        if child.is_dead() {
            child.try_reap();
        }
        Ok(())
    }
}
