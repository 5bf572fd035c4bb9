//! System Call Handlers
//!
//! The POSIX-facing surface of the process subsystem.  Register and
//! user-memory marshaling happens in the dispatch collaborator; by the
//! time a handler here runs, it has the calling thread, validated (or
//! deliberately invalid) user-memory wrappers, and plain Rust arguments.
//!
//! Handlers return `SysResult`; the dispatcher turns errors into the
//! `-errno` return convention.  A handler that trips a fatal promise
//! violation never really "returns": the calling process is already
//! terminating when the error unwinds.

pub mod identity;
pub mod kill;
pub mod pledge;
pub mod process;
pub mod unveil;
pub mod wait;
