//! Promise-Based Capability Restriction
//!
//! A process may pledge itself down to an enumerated set of privilege
//! categories.  Two independent slots exist: the promises governing the
//! current image and the exec-promises that take over at the next image
//! replacement.  Updates only ever narrow: once a slot is active, every
//! later successful update is a non-empty subset of what was there
//! before.  A spec with no tokens requests nothing; it cannot clear an
//! active mask down to empty.

use crate::errno::{Errno, SysResult};
use crate::process::credentials::ProtectedCredentials;

/// Upper bound on the length of one promise spec string.
pub const PLEDGE_SPEC_MAX: usize = 1024;

/// Privilege categories a process can retain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Promise {
    Stdio,
    RPath,
    WPath,
    CPath,
    DPath,
    Inet,
    Id,
    Proc,
    Ptrace,
    Exec,
    Unix,
    RecvFd,
    SendFd,
    FAttr,
    Tty,
    Chown,
    Chroot,
    Thread,
    Video,
    Accept,
    SetTime,
    SigAction,
    SetKeymap,
    ProtExec,
    MapFixed,
    GetKeymap,
}

/// Bidirectional name ↔ bit table. Order defines the bit positions.
pub const PROMISE_TABLE: [(&str, Promise); 26] = [
    ("stdio", Promise::Stdio),
    ("rpath", Promise::RPath),
    ("wpath", Promise::WPath),
    ("cpath", Promise::CPath),
    ("dpath", Promise::DPath),
    ("inet", Promise::Inet),
    ("id", Promise::Id),
    ("proc", Promise::Proc),
    ("ptrace", Promise::Ptrace),
    ("exec", Promise::Exec),
    ("unix", Promise::Unix),
    ("recvfd", Promise::RecvFd),
    ("sendfd", Promise::SendFd),
    ("fattr", Promise::FAttr),
    ("tty", Promise::Tty),
    ("chown", Promise::Chown),
    ("chroot", Promise::Chroot),
    ("thread", Promise::Thread),
    ("video", Promise::Video),
    ("accept", Promise::Accept),
    ("settime", Promise::SetTime),
    ("sigaction", Promise::SigAction),
    ("setkeymap", Promise::SetKeymap),
    ("prot_exec", Promise::ProtExec),
    ("map_fixed", Promise::MapFixed),
    ("getkeymap", Promise::GetKeymap),
];

impl Promise {
    /// Bit position of this promise in a mask.
    pub const fn bit(self) -> u32 {
        1u32 << (self as u32)
    }

    /// Look a promise up by its spec-string token.
    pub fn from_name(name: &str) -> Option<Promise> {
        PROMISE_TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| *p)
    }

    /// Spec-string token for this promise.
    pub fn name(self) -> &'static str {
        PROMISE_TABLE[self as usize].0
    }
}

/// Fixed-width bitset over `Promise`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromiseMask(u32);

impl PromiseMask {
    pub const fn empty() -> Self {
        PromiseMask(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn has(self, promise: Promise) -> bool {
        self.0 & promise.bit() != 0
    }

    pub fn insert(&mut self, promise: Promise) {
        self.0 |= promise.bit();
    }

    /// True if every bit of `self` is also set in `other`.
    pub const fn is_subset_of(self, other: PromiseMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Parse a space-separated promise spec into a mask.
///
/// The mask under construction is purely local; an unrecognized token
/// aborts the whole parse with `EINVAL` and nothing is committed anywhere.
pub fn parse_promise_spec(spec: &str) -> SysResult<PromiseMask> {
    let mut mask = PromiseMask::empty();
    for token in spec.split(' ').filter(|t| !t.is_empty()) {
        match Promise::from_name(token) {
            Some(promise) => mask.insert(promise),
            None => return Err(Errno::EINVAL),
        }
    }
    Ok(mask)
}

/// Validated update for one (active, mask) slot.
fn narrowed(active: bool, current: PromiseMask, new: PromiseMask) -> SysResult<PromiseMask> {
    // An active mask only ever narrows.
    if active && !new.is_subset_of(current) {
        return Err(Errno::EPERM);
    }
    Ok(new)
}

/// Parse one optional spec into an optional requested mask.
///
/// A spec with no tokens requests nothing: it cannot clear an active
/// mask down to empty, and on an inactive slot it leaves the slot
/// inactive.  Only a spec naming at least one promise is an update.
fn requested(spec: Option<&str>) -> SysResult<Option<PromiseMask>> {
    match spec {
        Some(spec) => {
            let mask = parse_promise_spec(spec)?;
            Ok(if mask.is_empty() { None } else { Some(mask) })
        }
        None => Ok(None),
    }
}

/// Apply a pledge request to both promise slots.
///
/// Either both requested slot updates commit or neither does; every check
/// runs against local values before the single guarded write at the end.
pub fn apply(
    creds: &ProtectedCredentials,
    promises: Option<&str>,
    execpromises: Option<&str>,
) -> SysResult<()> {
    if promises.map_or(false, |s| s.len() > PLEDGE_SPEC_MAX)
        || execpromises.map_or(false, |s| s.len() > PLEDGE_SPEC_MAX)
    {
        return Err(Errno::E2BIG);
    }

    let new_promises = requested(promises)?;
    let new_execpromises = requested(execpromises)?;

    let (active, current, exec_active, exec_current) = creds.with(|c| {
        (
            c.has_promises,
            c.promises,
            c.has_execpromises,
            c.execpromises,
        )
    });

    let checked = match new_promises {
        Some(mask) => Some(narrowed(active, current, mask)?),
        None => None,
    };
    let exec_checked = match new_execpromises {
        Some(mask) => Some(narrowed(exec_active, exec_current, mask)?),
        None => None,
    };

    let mut creds = creds.unprotect();
    if let Some(mask) = checked {
        creds.has_promises = true;
        creds.promises = mask;
    }
    if let Some(mask) = exec_checked {
        creds.has_execpromises = true;
        creds.execpromises = mask;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::credentials::Credentials;

    fn fresh_creds() -> ProtectedCredentials {
        ProtectedCredentials::new(Credentials::default())
    }

    fn mask_of(spec: &str) -> PromiseMask {
        parse_promise_spec(spec).unwrap()
    }

    #[test]
    fn test_name_table_round_trips() {
        for (name, promise) in PROMISE_TABLE {
            assert_eq!(Promise::from_name(name), Some(promise));
            assert_eq!(promise.name(), name);
        }
        assert_eq!(Promise::from_name("notapromise"), None);
    }

    #[test]
    fn test_first_pledge_installs_mask() {
        let creds = fresh_creds();
        apply(&creds, Some("stdio rpath"), None).unwrap();
        creds.with(|c| {
            assert!(c.has_promises);
            assert!(c.promises.has(Promise::Stdio));
            assert!(c.promises.has(Promise::RPath));
            assert!(!c.promises.has(Promise::WPath));
            assert!(!c.has_execpromises);
        });
    }

    #[test]
    fn test_empty_spec_changes_nothing() {
        let creds = fresh_creds();
        apply(&creds, Some(""), None).unwrap();
        creds.with(|c| {
            assert!(!c.has_promises);
            assert!(c.promises.is_empty());
        });
    }

    #[test]
    fn test_none_changes_nothing() {
        let creds = fresh_creds();
        apply(&creds, None, None).unwrap();
        creds.with(|c| {
            assert!(!c.has_promises);
            assert!(!c.has_execpromises);
        });
    }

    #[test]
    fn test_unknown_token_rejects_whole_call() {
        let creds = fresh_creds();
        apply(&creds, Some("stdio rpath"), None).unwrap();
        let before = creds.with(|c| c.promises);
        assert_eq!(
            apply(&creds, Some("stdio notapromise"), None),
            Err(Errno::EINVAL)
        );
        creds.with(|c| assert_eq!(c.promises, before));
    }

    #[test]
    fn test_widening_rejected_narrowing_allowed() {
        let creds = fresh_creds();
        apply(&creds, Some("stdio rpath"), None).unwrap();

        // Adding a bit fails and changes nothing.
        assert_eq!(
            apply(&creds, Some("stdio rpath wpath"), None),
            Err(Errno::EPERM)
        );
        creds.with(|c| assert_eq!(c.promises, mask_of("stdio rpath")));

        // Strict subset succeeds.
        apply(&creds, Some("stdio"), None).unwrap();
        creds.with(|c| assert_eq!(c.promises, mask_of("stdio")));
    }

    #[test]
    fn test_empty_spec_after_active_is_noop_not_clear() {
        let creds = fresh_creds();
        apply(&creds, Some("stdio"), None).unwrap();
        apply(&creds, Some(""), None).unwrap();
        creds.with(|c| {
            assert!(c.has_promises);
            assert_eq!(c.promises, mask_of("stdio"));
        });
    }

    #[test]
    fn test_oversized_spec_rejected_before_parse() {
        let creds = fresh_creds();
        let huge = "a".repeat(PLEDGE_SPEC_MAX + 1);
        assert_eq!(apply(&creds, Some(&huge), None), Err(Errno::E2BIG));
        creds.with(|c| assert!(!c.has_promises));
    }

    #[test]
    fn test_slots_are_independent_but_commit_together() {
        let creds = fresh_creds();
        apply(&creds, Some("stdio rpath"), Some("stdio exec")).unwrap();
        creds.with(|c| {
            assert_eq!(c.promises, mask_of("stdio rpath"));
            assert_eq!(c.execpromises, mask_of("stdio exec"));
        });

        // The exec slot update is illegal, so the legal promises update
        // must not commit either.
        assert_eq!(
            apply(&creds, Some("stdio"), Some("stdio exec inet")),
            Err(Errno::EPERM)
        );
        creds.with(|c| {
            assert_eq!(c.promises, mask_of("stdio rpath"));
            assert_eq!(c.execpromises, mask_of("stdio exec"));
        });
    }

    #[test]
    fn test_subset_math() {
        let small = mask_of("stdio");
        let big = mask_of("stdio rpath");
        assert!(small.is_subset_of(big));
        assert!(!big.is_subset_of(small));
        assert!(PromiseMask::empty().is_subset_of(small));
    }
}
