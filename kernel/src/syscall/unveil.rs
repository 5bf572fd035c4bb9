//! `unveil` Syscall
//!
//! Adds one path to the process's unveil tree, or (called with no path
//! and no permissions) locks the veil for good.

use alloc::sync::Arc;

use crate::errno::{Errno, SysResult};
use crate::process::unveil::UnveilPerms;
use crate::process::Process;

/// `unveil(path, permissions)`
///
/// `(Some, Some)` unveils a path; `(None, None)` locks the veil.  The
/// mixed forms are malformed requests.
pub fn sys_unveil(
    current: &Arc<Process>,
    path: Option<&str>,
    permissions: Option<&str>,
) -> SysResult<()> {
    let _big = current.big_lock();
    match (path, permissions) {
        (None, None) => {
            current.with_veil(|veil| veil.lock());
            Ok(())
        }
        (Some(path), Some(permissions)) => {
            if path.is_empty() {
                return Err(Errno::EINVAL);
            }
            let perms = UnveilPerms::parse(permissions)?;
            current.with_veil(|veil| veil.add(path, perms))
        }
        _ => Err(Errno::EINVAL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::unveil::VeilState;
    use crate::process::{ProcessRegistry, ThreadContext};

    fn process() -> Arc<Process> {
        let registry = Arc::new(ProcessRegistry::new());
        Process::create_kernel_process(&registry, "unveiler", ThreadContext::zero()).0
    }

    #[test]
    fn test_unveil_then_lock() {
        let current = process();
        sys_unveil(&current, Some("/home"), Some("rw")).unwrap();
        assert_eq!(current.veil_state(), VeilState::Dropped);

        sys_unveil(&current, None, None).unwrap();
        assert_eq!(current.veil_state(), VeilState::Locked);

        // Locked means locked, whatever the request looks like.
        assert_eq!(
            sys_unveil(&current, Some("/home"), Some("r")),
            Err(Errno::EPERM)
        );
        assert_eq!(sys_unveil(&current, Some("/tmp"), Some("")), Err(Errno::EPERM));
    }

    #[test]
    fn test_malformed_requests() {
        let current = process();
        assert_eq!(sys_unveil(&current, Some("/home"), None), Err(Errno::EINVAL));
        assert_eq!(sys_unveil(&current, None, Some("r")), Err(Errno::EINVAL));
        assert_eq!(sys_unveil(&current, Some(""), Some("r")), Err(Errno::EINVAL));
        assert_eq!(
            sys_unveil(&current, Some("/home"), Some("rz")),
            Err(Errno::EINVAL)
        );
        assert_eq!(current.veil_state(), VeilState::None);
    }
}
