//! Identity Syscalls
//!
//! Credential getters plus `setgroups`.  Every getter is gated on the
//! `stdio` promise when promises are active.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::errno::{Errno, SysResult};
use crate::process::credentials::{Gid, Uid};
use crate::process::pledge::Promise;
use crate::process::Process;
use crate::uspace::{UserPtr, UserSlice};

/// `getuid()`
pub fn sys_getuid(current: &Arc<Process>) -> SysResult<Uid> {
    current.require_promise(Promise::Stdio)?;
    Ok(current.credentials().with(|c| c.uid))
}

/// `getgid()`
pub fn sys_getgid(current: &Arc<Process>) -> SysResult<Gid> {
    current.require_promise(Promise::Stdio)?;
    Ok(current.credentials().with(|c| c.gid))
}

/// `geteuid()`
pub fn sys_geteuid(current: &Arc<Process>) -> SysResult<Uid> {
    current.require_promise(Promise::Stdio)?;
    Ok(current.credentials().with(|c| c.euid))
}

/// `getegid()`
pub fn sys_getegid(current: &Arc<Process>) -> SysResult<Gid> {
    current.require_promise(Promise::Stdio)?;
    Ok(current.credentials().with(|c| c.egid))
}

/// `getresuid(ruid, euid, suid)`
pub fn sys_getresuid(
    current: &Arc<Process>,
    ruid: &mut UserPtr<'_, Uid>,
    euid: &mut UserPtr<'_, Uid>,
    suid: &mut UserPtr<'_, Uid>,
) -> SysResult<()> {
    current.require_promise(Promise::Stdio)?;
    let (r, e, s) = current.credentials().with(|c| (c.uid, c.euid, c.suid));
    ruid.write(r)?;
    euid.write(e)?;
    suid.write(s)?;
    Ok(())
}

/// `getresgid(rgid, egid, sgid)`
pub fn sys_getresgid(
    current: &Arc<Process>,
    rgid: &mut UserPtr<'_, Gid>,
    egid: &mut UserPtr<'_, Gid>,
    sgid: &mut UserPtr<'_, Gid>,
) -> SysResult<()> {
    current.require_promise(Promise::Stdio)?;
    let (r, e, s) = current.credentials().with(|c| (c.gid, c.egid, c.sgid));
    rgid.write(r)?;
    egid.write(e)?;
    sgid.write(s)?;
    Ok(())
}

/// `getgroups(count, buf)`
///
/// `count == 0` queries the number of supplementary groups without
/// touching the buffer; any other count must equal it exactly.
pub fn sys_getgroups(
    current: &Arc<Process>,
    count: isize,
    buf: &mut UserSlice<'_, Gid>,
) -> SysResult<usize> {
    current.require_promise(Promise::Stdio)?;
    if count < 0 {
        return Err(Errno::EINVAL);
    }
    let groups = current.credentials().with(|c| c.extra_gids.clone());
    if count == 0 {
        return Ok(groups.len());
    }
    if count as usize != groups.len() {
        return Err(Errno::EINVAL);
    }
    buf.write_all(&groups)?;
    Ok(0)
}

/// `setgroups(gids)`
///
/// Superuser only; replaces the supplementary group set wholesale.
pub fn sys_setgroups(current: &Arc<Process>, gids: &[Gid]) -> SysResult<()> {
    current.require_promise(Promise::Id)?;
    if !current.is_superuser() {
        return Err(Errno::EPERM);
    }
    let _big = current.big_lock();
    let mut creds = current.credentials().unprotect();
    creds.extra_gids = Vec::from(gids);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessRegistry, ThreadContext};

    fn kernel_process() -> Arc<Process> {
        let registry = Arc::new(ProcessRegistry::new());
        let (process, _thread) =
            Process::create_kernel_process(&registry, "idtest", ThreadContext::zero());
        process
    }

    fn with_identity(uid: u32, gid: u32) -> Arc<Process> {
        let process = kernel_process();
        {
            let _big = process.big_lock();
            let mut creds = process.credentials().unprotect();
            creds.uid = uid;
            creds.euid = uid + 1;
            creds.suid = uid + 2;
            creds.gid = gid;
            creds.egid = gid + 1;
            creds.sgid = gid + 2;
        }
        process
    }

    #[test]
    fn test_scalar_getters() {
        let process = with_identity(100, 200);
        assert_eq!(sys_getuid(&process), Ok(100));
        assert_eq!(sys_geteuid(&process), Ok(101));
        assert_eq!(sys_getgid(&process), Ok(200));
        assert_eq!(sys_getegid(&process), Ok(201));
    }

    #[test]
    fn test_getresuid_copies_all_three() {
        let process = with_identity(100, 200);
        let (mut r, mut e, mut s) = (0, 0, 0);
        sys_getresuid(
            &process,
            &mut UserPtr::valid(&mut r),
            &mut UserPtr::valid(&mut e),
            &mut UserPtr::valid(&mut s),
        )
        .unwrap();
        assert_eq!((r, e, s), (100, 101, 102));
    }

    #[test]
    fn test_getresuid_bad_buffer_faults() {
        let process = with_identity(100, 200);
        let (mut r, mut e) = (0, 0);
        let result = sys_getresuid(
            &process,
            &mut UserPtr::valid(&mut r),
            &mut UserPtr::valid(&mut e),
            &mut UserPtr::invalid(),
        );
        assert_eq!(result, Err(Errno::EFAULT));
    }

    #[test]
    fn test_getgroups_count_contract() {
        let process = kernel_process();
        sys_setgroups(&process, &[10, 20, 30]).unwrap();

        // count == 0: report the size, leave the buffer alone.
        let mut untouched = [0xFFu32; 3];
        assert_eq!(
            sys_getgroups(&process, 0, &mut UserSlice::valid(&mut untouched)),
            Ok(3)
        );
        assert_eq!(untouched, [0xFF; 3]);

        // Wrong count: EINVAL.
        let mut buf = [0u32; 2];
        assert_eq!(
            sys_getgroups(&process, 2, &mut UserSlice::valid(&mut buf)),
            Err(Errno::EINVAL)
        );

        // Exact count: copy.
        let mut buf = [0u32; 3];
        assert_eq!(
            sys_getgroups(&process, 3, &mut UserSlice::valid(&mut buf)),
            Ok(0)
        );
        assert_eq!(buf, [10, 20, 30]);

        assert_eq!(
            sys_getgroups(&process, -1, &mut UserSlice::invalid()),
            Err(Errno::EINVAL)
        );
    }

    #[test]
    fn test_setgroups_requires_superuser() {
        let process = kernel_process();
        {
            let _big = process.big_lock();
            process.credentials().unprotect().euid = 1000;
        }
        assert_eq!(sys_setgroups(&process, &[10]), Err(Errno::EPERM));
    }

    #[test]
    fn test_getuid_without_stdio_promise_is_fatal() {
        let process = kernel_process();
        crate::process::pledge::apply(process.credentials(), Some("rpath"), None).unwrap();
        assert_eq!(sys_getuid(&process), Err(Errno::EPERM));
        // The violation is fatal: metadata recorded, termination begun.
        assert_eq!(
            process.coredump_metadata(crate::process::PLEDGE_VIOLATION_KEY),
            Some("stdio".into())
        );
        assert_eq!(process.termination_signal(), Some(crate::signal::SIGABRT));
    }
}
