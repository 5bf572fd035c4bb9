//! Guarded Process Credentials
//!
//! The security-sensitive identity fields live behind a write-protection
//! toggle.  Reads hand out snapshots; any write goes through the
//! scope-bound `CredentialsMut` guard, which flips the region writable on
//! construction and restores read-only when it drops, on every exit path,
//! early returns and failures included.  The guard does no mutual
//! exclusion of its own: callers serialize through the process big lock.

use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use spin::{Mutex, MutexGuard};

use crate::process::pledge::PromiseMask;
use crate::process::{ProcessId, SessionId};

/// User identity.
pub type Uid = u32;
/// Group identity.
pub type Gid = u32;

/// The protected credential block of one process.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub pid: ProcessId,
    pub ppid: ProcessId,
    pub sid: SessionId,
    pub uid: Uid,
    pub euid: Uid,
    pub suid: Uid,
    pub gid: Gid,
    pub egid: Gid,
    pub sgid: Gid,
    pub extra_gids: Vec<Gid>,
    pub dumpable: bool,
    pub has_promises: bool,
    pub promises: PromiseMask,
    pub has_execpromises: bool,
    pub execpromises: PromiseMask,
}

impl Credentials {
    /// Credentials for a new root-owned process with no restrictions.
    pub fn root(pid: ProcessId, ppid: ProcessId, sid: SessionId) -> Self {
        Credentials {
            pid,
            ppid,
            sid,
            uid: 0,
            euid: 0,
            suid: 0,
            gid: 0,
            egid: 0,
            sgid: 0,
            extra_gids: Vec::new(),
            dumpable: true,
            has_promises: false,
            promises: PromiseMask::empty(),
            has_execpromises: false,
            execpromises: PromiseMask::empty(),
        }
    }

    /// Effective or supplementary membership in `gid`.
    pub fn in_group(&self, gid: Gid) -> bool {
        self.egid == gid || self.extra_gids.contains(&gid)
    }

    /// Copy for a forked child: identical identity under a fresh pid.
    pub fn forked(&self, child_pid: ProcessId) -> Self {
        let mut child = self.clone();
        child.pid = child_pid;
        child.ppid = self.pid;
        child
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials::root(ProcessId(0), ProcessId(0), SessionId(0))
    }
}

/// Credentials behind the write-protection toggle.
///
/// The toggle mirrors the page-protection trick the design is modeled on:
/// outside a `CredentialsMut` scope the region is read-only, so a stray
/// write elsewhere in the kernel cannot quietly corrupt identity or
/// promise state.  The short inner lock is only the storage cell.
pub struct ProtectedCredentials {
    writable: AtomicBool,
    data: Mutex<Credentials>,
}

impl ProtectedCredentials {
    pub fn new(credentials: Credentials) -> Self {
        ProtectedCredentials {
            writable: AtomicBool::new(false),
            data: Mutex::new(credentials),
        }
    }

    /// Read access without taking the write toggle.
    pub fn with<R>(&self, f: impl FnOnce(&Credentials) -> R) -> R {
        f(&self.data.lock())
    }

    /// Owned snapshot of the whole block.
    pub fn snapshot(&self) -> Credentials {
        self.data.lock().clone()
    }

    /// Open the block for writing until the returned guard drops.
    ///
    /// Panics on nested acquisition: the writable window must be a single
    /// tight scope, never widened by re-entry.
    pub fn unprotect(&self) -> CredentialsMut<'_> {
        let was_writable = self.writable.swap(true, Ordering::Acquire);
        assert!(!was_writable, "credentials already unprotected");
        CredentialsMut {
            data: self.data.lock(),
            writable: &self.writable,
        }
    }

    /// Whether a mutation scope is currently open.
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }
}

/// Scope-bound write access to the credential block.
pub struct CredentialsMut<'a> {
    data: MutexGuard<'a, Credentials>,
    writable: &'a AtomicBool,
}

impl Deref for CredentialsMut<'_> {
    type Target = Credentials;

    fn deref(&self) -> &Credentials {
        &self.data
    }
}

impl DerefMut for CredentialsMut<'_> {
    fn deref_mut(&mut self) -> &mut Credentials {
        &mut self.data
    }
}

impl Drop for CredentialsMut<'_> {
    fn drop(&mut self) {
        self.writable.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_protection_on_drop() {
        let creds = ProtectedCredentials::new(Credentials::default());
        assert!(!creds.is_writable());
        {
            let mut guard = creds.unprotect();
            assert!(guard.writable.load(Ordering::Acquire));
            guard.euid = 100;
        }
        assert!(!creds.is_writable());
        creds.with(|c| assert_eq!(c.euid, 100));
    }

    #[test]
    fn test_guard_restores_protection_on_early_exit() {
        fn failing_update(creds: &ProtectedCredentials) -> Result<(), ()> {
            let mut guard = creds.unprotect();
            guard.uid = 7;
            Err(())
        }

        let creds = ProtectedCredentials::new(Credentials::default());
        assert!(failing_update(&creds).is_err());
        assert!(!creds.is_writable());
        // The partial write happened; atomicity is the caller's contract,
        // protection restoration is the guard's.
        creds.with(|c| assert_eq!(c.uid, 7));
    }

    #[test]
    #[should_panic(expected = "already unprotected")]
    fn test_nested_unprotect_panics() {
        let creds = ProtectedCredentials::new(Credentials::default());
        let _outer = creds.unprotect();
        let _inner = creds.unprotect();
    }

    #[test]
    fn test_forked_copy_gets_fresh_identity() {
        let mut parent = Credentials::root(ProcessId(5), ProcessId(1), SessionId(1));
        parent.euid = 1000;
        parent.extra_gids = alloc::vec![20, 30];

        let child = parent.forked(ProcessId(9));
        assert_eq!(child.pid, ProcessId(9));
        assert_eq!(child.ppid, ProcessId(5));
        assert_eq!(child.euid, 1000);
        assert_eq!(child.extra_gids, alloc::vec![20, 30]);
    }

    #[test]
    fn test_group_membership() {
        let mut creds = Credentials::default();
        creds.egid = 10;
        creds.extra_gids = alloc::vec![20, 30];
        assert!(creds.in_group(10));
        assert!(creds.in_group(30));
        assert!(!creds.in_group(40));
    }
}
