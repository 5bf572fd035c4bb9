//! Per-Process Futex Wait Queues
//!
//! Wait queues keyed by the user-space address of the futex word.  The
//! table is image-scoped: it belongs to the running executable and is
//! cleared wholesale on exec, waking anything still parked there.
//! Reading and comparing the futex word itself is the marshaling layer's
//! job; this table only parks and wakes.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use spin::Mutex;

use super::wait::Waiter;

/// Futex wait-queue table for one process.
pub struct FutexQueues {
    queues: Mutex<BTreeMap<u64, VecDeque<Arc<Waiter>>>>,
}

impl FutexQueues {
    pub const fn new() -> Self {
        FutexQueues {
            queues: Mutex::new(BTreeMap::new()),
        }
    }

    /// Park the calling thread on the queue for `addr`.  The caller blocks
    /// on the returned waiter after dropping its locks.
    pub fn enqueue(&self, addr: u64) -> Arc<Waiter> {
        let waiter = Waiter::new();
        self.queues
            .lock()
            .entry(addr)
            .or_insert_with(VecDeque::new)
            .push_back(waiter.clone());
        waiter
    }

    /// Wake up to `count` waiters parked on `addr`, FIFO. Returns the
    /// number woken.
    pub fn wake(&self, addr: u64, count: usize) -> usize {
        let mut queues = self.queues.lock();
        let mut woken = 0;
        if let Some(queue) = queues.get_mut(&addr) {
            while woken < count {
                match queue.pop_front() {
                    Some(waiter) => {
                        waiter.notify();
                        woken += 1;
                    }
                    None => break,
                }
            }
            if queue.is_empty() {
                queues.remove(&addr);
            }
        }
        woken
    }

    /// Drop every queue, waking all parked waiters. Used on exec, where
    /// the addresses the queues are keyed by stop meaning anything.
    pub fn clear(&self) {
        let drained = core::mem::take(&mut *self.queues.lock());
        for (_, queue) in drained {
            for waiter in queue {
                waiter.notify();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }
}

impl Default for FutexQueues {
    fn default() -> Self {
        Self::new()
    }
}
