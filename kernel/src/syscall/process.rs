//! Process Information and Control Syscalls
//!
//! Pid getters, process naming, umask, coredump metadata, and disown.

use alloc::sync::Arc;

use crate::errno::{Errno, SysResult};
use crate::process::pledge::Promise;
use crate::process::{Process, ProcessId};
use crate::uspace::UserSlice;

/// Longest accepted process name.
pub const PROCESS_NAME_MAX: usize = 256;

/// `getpid()`
pub fn sys_getpid(current: &Arc<Process>) -> SysResult<ProcessId> {
    current.require_promise(Promise::Stdio)?;
    Ok(current.pid())
}

/// `getppid()`
pub fn sys_getppid(current: &Arc<Process>) -> SysResult<ProcessId> {
    current.require_promise(Promise::Stdio)?;
    Ok(current.ppid())
}

/// `get_process_name(buffer)`
pub fn sys_get_process_name(
    current: &Arc<Process>,
    buffer: &mut UserSlice<'_, u8>,
    buffer_size: usize,
) -> SysResult<()> {
    current.require_promise(Promise::Stdio)?;
    let name = current.name();
    if name.len() + 1 > buffer_size {
        return Err(Errno::ENAMETOOLONG);
    }
    buffer.write_all(name.as_bytes())?;
    Ok(())
}

/// `set_process_name(name)`
pub fn sys_set_process_name(current: &Arc<Process>, name: &str) -> SysResult<()> {
    current.require_promise(Promise::Proc)?;
    if name.len() > PROCESS_NAME_MAX {
        return Err(Errno::ENAMETOOLONG);
    }
    // Empty and whitespace-only names only exist to confuse users.
    if name.trim().is_empty() {
        return Err(Errno::EINVAL);
    }
    current.set_name(name.into());
    Ok(())
}

/// `umask(mask)`, returning the previous mask.
pub fn sys_umask(current: &Arc<Process>, mask: u32) -> SysResult<u32> {
    current.require_promise(Promise::Stdio)?;
    Ok(current.set_umask(mask))
}

/// `set_coredump_metadata(key, value)`
pub fn sys_set_coredump_metadata(
    current: &Arc<Process>,
    key: &str,
    value: &str,
) -> SysResult<()> {
    current.set_coredump_metadata(key, value)
}

/// `disown(pid)`: give up the wait relationship with a child.
pub fn sys_disown(current: &Arc<Process>, pid: ProcessId) -> SysResult<()> {
    current.require_promise(Promise::Proc)?;
    let child = current
        .registry()
        .find_by_pid(pid)
        .ok_or(Errno::ESRCH)?;
    current.disown(&child)
}
