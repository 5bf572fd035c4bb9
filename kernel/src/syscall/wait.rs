//! `waitid` Syscall
//!
//! Blocks the calling thread until a matching child reaches its terminal
//! state, then consumes that state.  The waiter registers on the parent's
//! wait condition *before* scanning so a child dying between the scan and
//! the park cannot slip through unnoticed.

use alloc::sync::Arc;
use bitflags::bitflags;

use crate::errno::{Errno, SysResult};
use crate::process::pledge::Promise;
use crate::process::registry::IterationDecision;
use crate::process::{Process, Thread, WaitInfo, WaitSelector};
use crate::sync::WaitOutcome;

bitflags! {
    /// `waitid` option bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitOptions: u32 {
        /// Return immediately instead of blocking.
        const NOHANG = 0b0001;
    }
}

/// `waitid(selector, options)`
///
/// `Ok(Some(info))` consumed a child's terminal state; `Ok(None)` is the
/// WNOHANG "nothing yet" answer.  `ECHILD` when no child matches the
/// selector at all, `EINTR` when a signal interrupts the block.
pub fn sys_waitid(
    thread: &Arc<Thread>,
    selector: WaitSelector,
    options: WaitOptions,
) -> SysResult<Option<WaitInfo>> {
    let current = thread.process().clone();
    current.require_promise(Promise::Proc)?;

    loop {
        // Register first: a terminal event after the scan below must not
        // be missed while we decide to park.
        let waiter = current.wait_condition().register();

        let mut any_match = false;
        let mut reaped: Option<WaitInfo> = None;
        current
            .registry()
            .for_each_child(current.pid(), |child| {
                if !selector.matches(child) {
                    return IterationDecision::Continue;
                }
                any_match = true;
                match child.try_reap() {
                    Some(info) => {
                        reaped = Some(info);
                        IterationDecision::Break
                    }
                    None => IterationDecision::Continue,
                }
            });

        if let Some(info) = reaped {
            current.wait_condition().cancel(&waiter);
            return Ok(Some(info));
        }
        if !any_match {
            current.wait_condition().cancel(&waiter);
            return Err(Errno::ECHILD);
        }
        if options.contains(WaitOptions::NOHANG) {
            current.wait_condition().cancel(&waiter);
            return Ok(None);
        }

        thread.begin_blocking(waiter.clone());
        let outcome = waiter.block();
        thread.end_blocking();
        match outcome {
            WaitOutcome::Notified => continue,
            WaitOutcome::Interrupted => {
                current.wait_condition().cancel(&waiter);
                return Err(Errno::EINTR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{AddressSpace, ImageLoader, LoadedImage};
    use crate::process::{ProcessId, ProcessRegistry, ThreadContext};
    use alloc::string::ToString;
    use alloc::vec::Vec;

    struct FixedLoader;

    impl ImageLoader for FixedLoader {
        fn load(&self, path: &str) -> SysResult<LoadedImage> {
            Ok(LoadedImage {
                entry_point: 0x40_0000,
                space: AddressSpace::new(0x1000),
                master_tls: None,
                executable_path: path.to_string(),
            })
        }
    }

    fn parent_with_thread() -> (Arc<ProcessRegistry>, Arc<Process>, Arc<crate::process::Thread>) {
        let registry = Arc::new(ProcessRegistry::new());
        let (parent, thread) = Process::create_user_process(
            &registry,
            &FixedLoader,
            "/bin/parent",
            0,
            0,
            ProcessId(0),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        (registry, parent, thread)
    }

    #[test]
    fn test_no_children_is_echild() {
        let (_registry, _parent, thread) = parent_with_thread();
        assert_eq!(
            sys_waitid(&thread, WaitSelector::Any, WaitOptions::NOHANG),
            Err(Errno::ECHILD)
        );
    }

    #[test]
    fn test_nohang_with_running_child() {
        let (_registry, parent, thread) = parent_with_thread();
        let (_child, _ct) = parent.fork(ThreadContext::zero()).unwrap();
        assert_eq!(
            sys_waitid(&thread, WaitSelector::Any, WaitOptions::NOHANG),
            Ok(None)
        );
    }

    #[test]
    fn test_dead_child_is_consumed_exactly_once() {
        let (registry, parent, thread) = parent_with_thread();
        let (child, child_thread) = parent.fork(ThreadContext::zero()).unwrap();
        let child_pid = child.pid();
        child.exit(42);
        child.exit_thread(&child_thread);

        let info = sys_waitid(&thread, WaitSelector::Any, WaitOptions::NOHANG)
            .unwrap()
            .expect("terminal state visible");
        assert_eq!(info.pid, child_pid);
        assert_eq!(info.exit_status, 42);
        assert_eq!(info.signal, None);
        assert!(registry.find_by_pid(child_pid).is_none());

        // The child is gone; a second wait has nothing to wait for.
        assert_eq!(
            sys_waitid(&thread, WaitSelector::Any, WaitOptions::NOHANG),
            Err(Errno::ECHILD)
        );
    }

    #[test]
    fn test_wait_by_pid_and_group() {
        let (_registry, parent, thread) = parent_with_thread();
        let (first, first_thread) = parent.fork(ThreadContext::zero()).unwrap();
        let (second, second_thread) = parent.fork(ThreadContext::zero()).unwrap();
        first.exit(1);
        first.exit_thread(&first_thread);
        second.exit(2);
        second.exit_thread(&second_thread);

        // Selecting by pid picks that child even though another died
        // first.
        let info = sys_waitid(&thread, WaitSelector::Pid(second.pid()), WaitOptions::NOHANG)
            .unwrap()
            .unwrap();
        assert_eq!(info.exit_status, 2);

        // The other is reachable through its process group.
        let info = sys_waitid(
            &thread,
            WaitSelector::Group(parent.pgid()),
            WaitOptions::NOHANG,
        )
        .unwrap()
        .unwrap();
        assert_eq!(info.exit_status, 1);
    }

    #[test]
    fn test_signal_death_reported() {
        let (_registry, parent, thread) = parent_with_thread();
        let (child, child_thread) = parent.fork(ThreadContext::zero()).unwrap();
        child.send_signal(crate::signal::SIGTERM).unwrap();
        child.exit_thread(&child_thread);

        let info = sys_waitid(&thread, WaitSelector::Any, WaitOptions::NOHANG)
            .unwrap()
            .unwrap();
        assert_eq!(info.signal, Some(crate::signal::SIGTERM));
        assert_eq!(info.exit_status, 0);
    }

    #[test]
    fn test_blocking_wait_sees_concurrent_child_death() {
        use std::thread as host_thread;

        let (_registry, parent, thread) = parent_with_thread();
        let (child, child_thread) = parent.fork(ThreadContext::zero()).unwrap();
        let child_pid = child.pid();

        let reaper = {
            let thread = thread.clone();
            host_thread::spawn(move || sys_waitid(&thread, WaitSelector::Any, WaitOptions::empty()))
        };
        // Let the waiter park, then kill the child from this thread.
        while parent.wait_condition().waiter_count() == 0 {
            host_thread::yield_now();
        }
        child.exit(9);
        child.exit_thread(&child_thread);

        let info = reaper.join().unwrap().unwrap().unwrap();
        assert_eq!(info.pid, child_pid);
        assert_eq!(info.exit_status, 9);
    }

    #[test]
    fn test_interrupted_wait_is_eintr() {
        use std::thread as host_thread;

        let (_registry, parent, thread) = parent_with_thread();
        let (_child, _child_thread) = parent.fork(ThreadContext::zero()).unwrap();

        let waiting = {
            let thread = thread.clone();
            host_thread::spawn(move || sys_waitid(&thread, WaitSelector::Any, WaitOptions::empty()))
        };
        while thread.state() != crate::process::ThreadState::Blocked {
            host_thread::yield_now();
        }
        // Signal delivery to the parked thread interrupts the wait.
        thread.interrupt_blocked_wait();
        assert_eq!(waiting.join().unwrap(), Err(Errno::EINTR));
        // The wait condition is left clean.
        assert_eq!(parent.wait_condition().waiter_count(), 0);
    }
}
