//! `pledge` Syscall
//!
//! Thin wrapper over the capability-set update: the dispatch layer has
//! already copied the spec strings (or established that a pointer was
//! absent), so all that remains is the guarded, all-or-nothing apply.

use alloc::sync::Arc;

use crate::errno::SysResult;
use crate::process::{pledge, Process};

/// `pledge(promises, execpromises)`
///
/// `None` leaves the corresponding slot untouched. Both requested slot
/// updates commit together or not at all.
pub fn sys_pledge(
    current: &Arc<Process>,
    promises: Option<&str>,
    execpromises: Option<&str>,
) -> SysResult<()> {
    let _big = current.big_lock();
    pledge::apply(current.credentials(), promises, execpromises)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno::Errno;
    use crate::process::pledge::Promise;
    use crate::process::{ProcessRegistry, ThreadContext};

    fn process() -> Arc<Process> {
        let registry = Arc::new(ProcessRegistry::new());
        Process::create_kernel_process(&registry, "pledger", ThreadContext::zero()).0
    }

    #[test]
    fn test_pledge_then_narrow() {
        let current = process();
        sys_pledge(&current, Some("stdio rpath wpath"), None).unwrap();
        sys_pledge(&current, Some("stdio"), None).unwrap();
        assert!(current.has_promised(Promise::Stdio));
        assert!(!current.has_promised(Promise::WPath));
    }

    #[test]
    fn test_pledge_widen_is_eperm() {
        let current = process();
        sys_pledge(&current, Some("stdio"), None).unwrap();
        assert_eq!(
            sys_pledge(&current, Some("stdio inet"), None),
            Err(Errno::EPERM)
        );
    }

    #[test]
    fn test_pledge_empty_call_is_noop_success() {
        let current = process();
        sys_pledge(&current, Some("stdio"), None).unwrap();
        sys_pledge(&current, None, None).unwrap();
        assert!(current.has_promised(Promise::Stdio));
    }
}
