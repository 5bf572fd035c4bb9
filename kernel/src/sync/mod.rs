//! Synchronization Primitives for the Process Subsystem
//!
//! Blocking here means parking on a wait object until another context
//! notifies (or a signal interrupts) the parked thread.  The scheduler
//! integration point is the `Waiter::block` park loop.

pub mod futex;
pub mod wait;

pub use wait::{WaitCondition, WaitOutcome, Waiter};
