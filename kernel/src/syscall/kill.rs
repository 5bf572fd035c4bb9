//! `kill` and `killpg` Syscalls
//!
//! Signal delivery with POSIX permission checks.  Group and broadcast
//! forms walk the registry snapshot; lifecycle races (a target dying
//! under us) surface as `ESRCH`, never as undefined behavior.

use alloc::sync::Arc;

use crate::errno::{Errno, SysResult};
use crate::process::pledge::Promise;
use crate::process::registry::IterationDecision;
use crate::process::{GroupId, Process, ProcessId};
use crate::signal;

/// POSIX permission rule: the sender's real or effective uid must match
/// the target's real or saved uid, unless the sender is superuser.
fn may_signal(sender: &Process, target: &Process) -> bool {
    let (sender_uid, sender_euid) = sender.credentials().with(|c| (c.uid, c.euid));
    if sender_euid == 0 {
        return true;
    }
    let (target_uid, target_suid) = target.credentials().with(|c| (c.uid, c.suid));
    sender_euid == target_uid
        || sender_euid == target_suid
        || sender_uid == target_uid
        || sender_uid == target_suid
}

fn deliver(current: &Arc<Process>, target: &Arc<Process>, sig: u8) -> SysResult<()> {
    if !may_signal(current, target) {
        return Err(Errno::EPERM);
    }
    // Signal 0 probes existence and permission without delivering.
    if sig == 0 {
        return Ok(());
    }
    target.send_signal(sig)
}

fn kill_one(current: &Arc<Process>, pid: ProcessId, sig: u8) -> SysResult<()> {
    let target = current.registry().find_by_pid(pid).ok_or(Errno::ESRCH)?;
    if target.is_dead() {
        return Err(Errno::ESRCH);
    }
    // Kernel processes are not signalable from userspace.
    if target.is_kernel_process() {
        return Err(Errno::EPERM);
    }
    deliver(current, &target, sig)
}

fn kill_group(current: &Arc<Process>, pgid: GroupId, sig: u8) -> SysResult<()> {
    let mut matched = 0usize;
    let mut delivered = 0usize;
    current.registry().for_each_in_group(pgid, |member| {
        if member.is_kernel_process() {
            return IterationDecision::Continue;
        }
        matched += 1;
        if deliver(current, member, sig).is_ok() {
            delivered += 1;
        }
        IterationDecision::Continue
    });
    if matched == 0 {
        return Err(Errno::ESRCH);
    }
    if delivered == 0 {
        return Err(Errno::EPERM);
    }
    Ok(())
}

/// Broadcast to every user process except the sender.
fn kill_all(current: &Arc<Process>, sig: u8) -> SysResult<()> {
    current.registry().for_each(|target| {
        if target.pid() != current.pid() && target.is_user_process() && !target.is_dead() {
            let _ = deliver(current, target, sig);
        }
        IterationDecision::Continue
    });
    Ok(())
}

/// `kill(pid, sig)`
///
/// `pid > 0` targets one process, `pid == 0` the sender's group,
/// `pid == -1` broadcasts, `pid < -1` targets group `-pid`.
pub fn sys_kill(current: &Arc<Process>, pid: i32, sig: i32) -> SysResult<()> {
    current.require_promise(Promise::Proc)?;
    if sig < 0 || !signal::is_valid(sig as u8) {
        return Err(Errno::EINVAL);
    }
    let sig = sig as u8;
    match pid {
        1.. => kill_one(current, ProcessId(pid as u32), sig),
        0 => kill_group(current, current.pgid(), sig),
        -1 => kill_all(current, sig),
        _ => kill_group(current, GroupId(pid.unsigned_abs()), sig),
    }
}

/// `killpg(pgid, sig)`
pub fn sys_killpg(current: &Arc<Process>, pgid: u32, sig: i32) -> SysResult<()> {
    current.require_promise(Promise::Proc)?;
    if sig < 0 || !signal::is_valid(sig as u8) {
        return Err(Errno::EINVAL);
    }
    if pgid == 0 {
        return kill_group(current, current.pgid(), sig as u8);
    }
    kill_group(current, GroupId(pgid), sig as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{AddressSpace, ImageLoader, LoadedImage};
    use crate::process::ProcessRegistry;
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

    fn spawn(registry: &Arc<ProcessRegistry>, name: &str) -> Arc<Process> {
        let path = alloc::format!("/bin/{}", name);
        Process::create_user_process(
            registry,
            &FixedLoader,
            &path,
            0,
            0,
            ProcessId(0),
            Vec::new(),
            Vec::new(),
        )
        .unwrap()
        .0
    }

    fn set_identity(process: &Arc<Process>, uid: u32, euid: u32) {
        let _big = process.big_lock();
        let mut creds = process.credentials().unprotect();
        creds.uid = uid;
        creds.euid = euid;
        creds.suid = uid;
    }

    #[test]
    fn test_kill_unknown_pid_is_esrch() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "killer");
        assert_eq!(sys_kill(&current, 424242, 15), Err(Errno::ESRCH));
    }

    #[test]
    fn test_kill_invalid_signal() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "killer");
        assert_eq!(sys_kill(&current, 1, -3), Err(Errno::EINVAL));
        assert_eq!(sys_kill(&current, 1, 99), Err(Errno::EINVAL));
    }

    #[test]
    fn test_unprivileged_cross_user_kill_is_eperm() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "alice");
        let target = spawn(&registry, "bob");
        set_identity(&current, 100, 100);
        set_identity(&target, 200, 200);

        assert_eq!(
            sys_kill(&current, target.pid().0 as i32, signal::SIGTERM as i32),
            Err(Errno::EPERM)
        );
        assert_eq!(target.termination_signal(), None);
    }

    #[test]
    fn test_superuser_may_kill_anyone() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "root");
        let target = spawn(&registry, "victim");
        set_identity(&target, 200, 200);

        sys_kill(&current, target.pid().0 as i32, signal::SIGTERM as i32).unwrap();
        assert_eq!(target.termination_signal(), Some(signal::SIGTERM));
    }

    #[test]
    fn test_signal_zero_probes_without_delivery() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "prober");
        let target = spawn(&registry, "target");

        sys_kill(&current, target.pid().0 as i32, 0).unwrap();
        assert_eq!(target.termination_signal(), None);
        assert!(!target.is_dead());
    }

    #[test]
    fn test_killpg_hits_every_group_member() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "leader");
        let group = GroupId(777);
        let first = spawn(&registry, "a");
        let second = spawn(&registry, "b");
        let outsider = spawn(&registry, "c");
        first.set_pgid(group);
        second.set_pgid(group);

        sys_killpg(&current, 777, signal::SIGTERM as i32).unwrap();
        assert_eq!(first.termination_signal(), Some(signal::SIGTERM));
        assert_eq!(second.termination_signal(), Some(signal::SIGTERM));
        assert_eq!(outsider.termination_signal(), None);
    }

    #[test]
    fn test_killpg_empty_group_is_esrch() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "leader");
        assert_eq!(
            sys_killpg(&current, 999, signal::SIGTERM as i32),
            Err(Errno::ESRCH)
        );
    }

    #[test]
    fn test_killpg_all_denied_is_eperm() {
        let registry = Arc::new(ProcessRegistry::new());
        let current = spawn(&registry, "alice");
        set_identity(&current, 100, 100);
        let target = spawn(&registry, "bob");
        set_identity(&target, 200, 200);
        target.set_pgid(GroupId(555));

        assert_eq!(
            sys_killpg(&current, 555, signal::SIGTERM as i32),
            Err(Errno::EPERM)
        );
    }
}
