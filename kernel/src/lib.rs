//! Oryx Kernel: Process-Control Subsystem
//!
//! The entity representing a running program and the machinery around
//! it: guarded credentials, promise-based capability restriction
//! (pledge), filesystem visibility restriction (unveil), the descriptor
//! table, thread membership, and the lifecycle state machine from
//! creation through exec, fork, termination, and reaping.
//!
//! External collaborators (the virtual-memory manager, the scheduler's
//! run queue, the executable loader's parsing, the filesystem, and the
//! raw syscall marshaling layer) are consumed through the narrow
//! interfaces in `loader` and `uspace` and are not implemented here.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod errno;
pub mod loader;
pub mod process;
pub mod signal;
pub mod sync;
pub mod syscall;
pub mod uspace;
