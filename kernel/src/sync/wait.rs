//! Wait Conditions
//!
//! A `WaitCondition` is the object a thread parks on while waiting for a
//! terminal event on a process (child exit, futex wake).  Notification
//! drains the waiter list, so each registered waiter is woken exactly once
//! per event: none missed, none double-notified.  A parked waiter can also
//! be interrupted by signal delivery, in which case the blocking call
//! returns `EINTR` and the condition itself is left untouched.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU8, Ordering};
use spin::Mutex;

const STATE_WAITING: u8 = 0;
const STATE_NOTIFIED: u8 = 1;
const STATE_INTERRUPTED: u8 = 2;

/// Why `Waiter::block` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition was notified.
    Notified,
    /// A signal interrupted the wait.
    Interrupted,
}

/// One parked thread.
///
/// Held by the blocking thread and (until woken or cancelled) by the
/// condition's waiter list.
pub struct Waiter {
    state: AtomicU8,
}

impl Waiter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Waiter {
            state: AtomicU8::new(STATE_WAITING),
        })
    }

    /// Park until notified or interrupted.
    ///
    /// The park loop is a spin-wait; a scheduler would block the thread
    /// here and re-run the check on wakeup. Must not be called with any
    /// spin lock held.
    pub fn block(&self) -> WaitOutcome {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_NOTIFIED => return WaitOutcome::Notified,
                STATE_INTERRUPTED => return WaitOutcome::Interrupted,
                _ => core::hint::spin_loop(),
            }
        }
    }

    /// Wake the waiter with a notification.
    ///
    /// Only moves out of the waiting state; an already-interrupted waiter
    /// keeps its outcome.
    pub fn notify(&self) {
        let _ = self.state.compare_exchange(
            STATE_WAITING,
            STATE_NOTIFIED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Interrupt the waiter (signal delivery). A notification that already
    /// happened wins the race.
    pub fn interrupt(&self) {
        let _ = self.state.compare_exchange(
            STATE_WAITING,
            STATE_INTERRUPTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_waiting(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_WAITING
    }
}

/// A notification point with a list of parked waiters.
pub struct WaitCondition {
    waiters: Mutex<Vec<Arc<Waiter>>>,
}

impl WaitCondition {
    pub const fn new() -> Self {
        WaitCondition {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Register the calling thread as a waiter. The returned handle is
    /// passed to `Waiter::block` after all locks are dropped.
    pub fn register(&self) -> Arc<Waiter> {
        let waiter = Waiter::new();
        self.waiters.lock().push(waiter.clone());
        waiter
    }

    /// Deregister a waiter that is bailing out (interrupted wait).
    ///
    /// Returns `false` if the waiter had already been claimed by a
    /// notification; the caller then reports the notification, not EINTR.
    pub fn cancel(&self, waiter: &Arc<Waiter>) -> bool {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            waiters.remove(pos);
            true
        } else {
            false
        }
    }

    /// Wake every currently registered waiter exactly once.
    ///
    /// Draining the list under the lock is what makes the exactly-once
    /// guarantee hold: a waiter woken here is no longer registered and
    /// cannot be woken again by a later event.
    pub fn notify_all(&self) -> usize {
        let drained: Vec<Arc<Waiter>> = core::mem::take(&mut *self.waiters.lock());
        for waiter in &drained {
            waiter.notify();
        }
        drained.len()
    }

    /// Number of currently parked waiters.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for WaitCondition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_wakes_registered_waiter() {
        let condition = WaitCondition::new();
        let waiter = condition.register();
        assert_eq!(condition.waiter_count(), 1);
        assert_eq!(condition.notify_all(), 1);
        assert_eq!(condition.waiter_count(), 0);
        assert_eq!(waiter.block(), WaitOutcome::Notified);
    }

    #[test]
    fn test_notify_all_is_exactly_once() {
        let condition = WaitCondition::new();
        let _first = condition.register();
        let _second = condition.register();
        assert_eq!(condition.notify_all(), 2);
        // A second terminal event finds no registered waiters.
        assert_eq!(condition.notify_all(), 0);
    }

    #[test]
    fn test_interrupted_waiter_reports_eintr() {
        let condition = WaitCondition::new();
        let waiter = condition.register();
        waiter.interrupt();
        assert!(condition.cancel(&waiter));
        assert_eq!(waiter.block(), WaitOutcome::Interrupted);
        // The condition state is unchanged by the bail-out.
        assert_eq!(condition.waiter_count(), 0);
        assert_eq!(condition.notify_all(), 0);
    }

    #[test]
    fn test_notification_wins_interrupt_race() {
        let condition = WaitCondition::new();
        let waiter = condition.register();
        condition.notify_all();
        waiter.interrupt();
        assert!(!condition.cancel(&waiter));
        assert_eq!(waiter.block(), WaitOutcome::Notified);
    }

    #[test]
    fn test_block_across_threads() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let condition = StdArc::new(WaitCondition::new());
        let waiter = condition.register();
        let notifier = {
            let condition = condition.clone();
            thread::spawn(move || {
                while condition.waiter_count() == 0 {
                    thread::yield_now();
                }
                condition.notify_all()
            })
        };
        assert_eq!(waiter.block(), WaitOutcome::Notified);
        assert_eq!(notifier.join().unwrap(), 1);
    }
}
