//! POSIX Error Numbers
//!
//! Error type shared by every fallible operation in the process subsystem.
//! The numeric values are the POSIX ones, adopted verbatim so the syscall
//! dispatch layer can return them to userspace unchanged (`-errno`).

/// Result alias used across the syscall surface.
pub type SysResult<T> = Result<T, Errno>;

/// POSIX-style error number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted.
    EPERM = 1,
    /// No such file or directory.
    ENOENT = 2,
    /// No such process.
    ESRCH = 3,
    /// Interrupted system call.
    EINTR = 4,
    /// I/O error.
    EIO = 5,
    /// Argument list too long.
    E2BIG = 7,
    /// Exec format error.
    ENOEXEC = 8,
    /// Bad file descriptor.
    EBADF = 9,
    /// No child processes.
    ECHILD = 10,
    /// Try again.
    EAGAIN = 11,
    /// Out of memory.
    ENOMEM = 12,
    /// Permission denied.
    EACCES = 13,
    /// Bad address.
    EFAULT = 14,
    /// Device or resource busy.
    EBUSY = 16,
    /// File exists.
    EEXIST = 17,
    /// Not a directory.
    ENOTDIR = 20,
    /// Invalid argument.
    EINVAL = 22,
    /// Too many open files.
    EMFILE = 24,
    /// File name too long.
    ENAMETOOLONG = 36,
    /// Function not implemented.
    ENOSYS = 38,
}

impl Errno {
    /// Raw errno value as returned to userspace (positive).
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Value in the `-errno` convention used by the syscall return path.
    pub const fn as_ret(self) -> i64 {
        -(self as i32 as i64)
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values_are_posix() {
        assert_eq!(Errno::EPERM.as_i32(), 1);
        assert_eq!(Errno::ESRCH.as_i32(), 3);
        assert_eq!(Errno::EINTR.as_i32(), 4);
        assert_eq!(Errno::E2BIG.as_i32(), 7);
        assert_eq!(Errno::ECHILD.as_i32(), 10);
        assert_eq!(Errno::EFAULT.as_i32(), 14);
        assert_eq!(Errno::EINVAL.as_i32(), 22);
        assert_eq!(Errno::EMFILE.as_i32(), 24);
    }

    #[test]
    fn test_errno_ret_convention() {
        assert_eq!(Errno::EPERM.as_ret(), -1);
        assert_eq!(Errno::EINVAL.as_ret(), -22);
    }
}
