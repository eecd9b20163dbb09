//! Kernel error types
//!
//! One central error enum with context-carrying variants replaces ad-hoc
//! string errors throughout the kernel. The syscall layer decides per
//! variant whether a failure terminates the calling process or surfaces as
//! a -1 return value.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Address is null, kernel-space, or otherwise outside the process.
    InvalidAddress { addr: usize },
    /// Access violated the page's permission bits.
    PermissionDenied { operation: &'static str },
    /// A file-backed page delivered fewer bytes than its descriptor demands.
    ShortRead { expected: usize, actual: usize },
    /// No free slot left on the swap device.
    SwapExhausted { slots: usize },
    /// All file-descriptor slots are occupied.
    FdTableFull,
    /// The descriptor does not name an open file.
    BadFileDescriptor { fd: usize },
    /// A caller-supplied argument failed validation.
    InvalidArgument {
        name: &'static str,
        value: &'static str,
    },
    /// A named resource does not exist.
    NotFound { resource: &'static str },
    /// Subsystem used before its boot-time initialization.
    NotInitialized { subsystem: &'static str },
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Whether this failure must terminate the offending user process
    /// rather than flow back as a -1 syscall return.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::PermissionDenied { .. }
                | Self::ShortRead { .. }
                | Self::BadFileDescriptor { .. }
        )
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress { addr } => write!(f, "Invalid address: {:#x}", addr),
            Self::PermissionDenied { operation } => {
                write!(f, "Permission denied for operation: {}", operation)
            }
            Self::ShortRead { expected, actual } => {
                write!(f, "Short read: expected {} bytes, got {}", expected, actual)
            }
            Self::SwapExhausted { slots } => {
                write!(f, "Swap device exhausted: all {} slots in use", slots)
            }
            Self::FdTableFull => write!(f, "File descriptor table is full"),
            Self::BadFileDescriptor { fd } => write!(f, "Bad file descriptor: {}", fd),
            Self::InvalidArgument { name, value } => {
                write!(f, "Invalid argument '{}': {}", name, value)
            }
            Self::NotFound { resource } => write!(f, "{} not found", resource),
            Self::NotInitialized { subsystem } => {
                write!(f, "Subsystem not initialized: {}", subsystem)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(KernelError::InvalidAddress { addr: 0 }.is_fatal());
        assert!(KernelError::BadFileDescriptor { fd: 99 }.is_fatal());
        assert!(!KernelError::FdTableFull.is_fatal());
        assert!(!KernelError::SwapExhausted { slots: 8 }.is_fatal());
    }

    #[test]
    fn display_carries_context() {
        extern crate std;
        use std::string::ToString;

        let msg = KernelError::ShortRead {
            expected: 4096,
            actual: 100,
        }
        .to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("100"));
    }
}
