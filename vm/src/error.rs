//! The error taxonomy the rest of `vm` returns, and its mapping onto the
//! POSIX-style errno surface the syscall boundary expects.

use thiserror::Error;

/// Every fallible `vm` operation returns one of these. Each variant documents
/// the errno it maps to so callers at the syscall boundary don't have to
/// rediscover the mapping.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// Access to an address with no mapping, no permission, or no current
    /// address space at all. Maps to `EFAULT`.
    #[error("bad address")]
    Fault,

    /// A request described a range or argument that can never be valid
    /// (misaligned, zero-length, end before start). Maps to `EINVAL`.
    #[error("invalid argument")]
    Invalid,

    /// The buddy allocator or swap store had no room left. Maps to `ENOMEM`.
    #[error("out of memory")]
    NoMemory,

    /// The backing executable was rejected (bad header, truncated segment).
    /// Maps to `ENOEXEC`.
    #[error("exec format error")]
    BadExecutable,

    /// A request (argument vector, argument block) exceeded a hard limit.
    /// Maps to `E2BIG`.
    #[error("argument list too long")]
    TooBig,

    /// A recognized but unimplemented path (legacy region compatibility
    /// beyond the first two regions). Maps to `ENOSYS`.
    #[error("function not implemented")]
    NotImplemented,
}

impl VmError {
    /// The POSIX-style errno this variant corresponds to, for callers that
    /// need to hand a raw integer back to userspace.
    pub const fn errno(self) -> i32 {
        match self {
            VmError::Fault => 14,          // EFAULT
            VmError::Invalid => 22,        // EINVAL
            VmError::NoMemory => 12,       // ENOMEM
            VmError::BadExecutable => 8,   // ENOEXEC
            VmError::TooBig => 7,          // E2BIG
            VmError::NotImplemented => 38, // ENOSYS
        }
    }
}

/// Shorthand used throughout the crate.
pub type VmResult<T> = Result<T, VmError>;
