//! Signal Numbers and Per-Process Signal State
//!
//! Holds the pending/blocked masks and the per-signal disposition table
//! consulted by the delivery and termination paths.  Actual delivery to a
//! user-space handler frame is the dispatch layer's job; this module only
//! decides *what* a signal does to the process.

use alloc::vec::Vec;

// ─── Signal numbers (POSIX) ─────────────────────────────────────────

pub const SIGHUP: u8 = 1;
pub const SIGINT: u8 = 2;
pub const SIGQUIT: u8 = 3;
pub const SIGILL: u8 = 4;
pub const SIGTRAP: u8 = 5;
pub const SIGABRT: u8 = 6;
pub const SIGBUS: u8 = 7;
pub const SIGFPE: u8 = 8;
pub const SIGKILL: u8 = 9;
pub const SIGUSR1: u8 = 10;
pub const SIGSEGV: u8 = 11;
pub const SIGUSR2: u8 = 12;
pub const SIGPIPE: u8 = 13;
pub const SIGALRM: u8 = 14;
pub const SIGTERM: u8 = 15;
pub const SIGCHLD: u8 = 17;
pub const SIGCONT: u8 = 18;
pub const SIGSTOP: u8 = 19;
pub const SIGTSTP: u8 = 20;

/// Number of signal slots in the disposition table.
pub const NSIG: usize = 32;

/// What a signal does when the disposition is `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    /// Terminate the process.
    Terminate,
    /// Terminate the process and write a coredump.
    DumpCore,
    /// Discard the signal.
    Ignore,
    /// Suspend the process (job control).
    Stop,
    /// Resume a stopped process.
    Continue,
}

/// Per-signal disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Take the default action for this signal.
    Default,
    /// Discard on delivery.
    Ignore,
    /// Invoke a user handler at this address.
    Handler(u64),
}

/// Per-process signal bookkeeping.
#[derive(Debug, Clone)]
pub struct SignalState {
    /// Bitmask of pending signals (bit N = signal N).
    pending: u32,
    /// Bitmask of blocked signals.
    blocked: u32,
    /// Disposition table indexed by signal number.
    dispositions: Vec<Disposition>,
}

impl SignalState {
    pub fn new() -> Self {
        let mut dispositions = Vec::with_capacity(NSIG);
        dispositions.resize(NSIG, Disposition::Default);
        SignalState {
            pending: 0,
            blocked: 0,
            dispositions,
        }
    }

    /// Mark a signal pending. Out-of-range numbers are discarded.
    pub fn set_pending(&mut self, signal: u8) {
        if (signal as usize) < NSIG {
            self.pending |= 1 << signal;
        }
    }

    pub fn is_pending(&self, signal: u8) -> bool {
        (signal as usize) < NSIG && self.pending & (1 << signal) != 0
    }

    /// Lowest pending signal that is not blocked, removed from the
    /// pending set.
    pub fn dequeue(&mut self) -> Option<u8> {
        let deliverable = self.pending & !self.blocked;
        if deliverable == 0 {
            return None;
        }
        let signal = deliverable.trailing_zeros() as u8;
        self.pending &= !(1 << signal);
        Some(signal)
    }

    pub fn disposition(&self, signal: u8) -> Disposition {
        self.dispositions
            .get(signal as usize)
            .copied()
            .unwrap_or(Disposition::Default)
    }

    /// Install a disposition, returning the previous one.
    /// SIGKILL and SIGSTOP cannot be caught or ignored.
    pub fn set_disposition(&mut self, signal: u8, disposition: Disposition) -> Disposition {
        if signal == SIGKILL || signal == SIGSTOP || (signal as usize) >= NSIG {
            return Disposition::Default;
        }
        let old = self.dispositions[signal as usize];
        self.dispositions[signal as usize] = disposition;
        old
    }

    /// Reset every disposition to default and clear pending signals.
    /// The image the handlers pointed into is gone after exec.
    pub fn reset_for_exec(&mut self) {
        for d in &mut self.dispositions {
            *d = Disposition::Default;
        }
        self.pending = 0;
    }

    pub fn block(&mut self, mask: u32) {
        self.blocked |= mask;
        self.blocked &= !((1 << SIGKILL) | (1 << SIGSTOP));
    }

    pub fn unblock(&mut self, mask: u32) {
        self.blocked &= !mask;
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Default action for a signal number.
pub fn default_action(signal: u8) -> DefaultAction {
    match signal {
        SIGCHLD => DefaultAction::Ignore,
        SIGCONT => DefaultAction::Continue,
        SIGSTOP | SIGTSTP => DefaultAction::Stop,
        SIGQUIT | SIGILL | SIGTRAP | SIGABRT | SIGBUS | SIGFPE | SIGSEGV => {
            DefaultAction::DumpCore
        }
        _ => DefaultAction::Terminate,
    }
}

/// Whether userspace may install a handler for (or ignore) this signal.
pub fn is_catchable(signal: u8) -> bool {
    signal != SIGKILL && signal != SIGSTOP
}

/// Whether the signal number is valid for `kill(2)`.
pub fn is_valid(signal: u8) -> bool {
    (signal as usize) < NSIG
}
