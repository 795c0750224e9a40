//! Error types for the Halcyon kernel.
//!
//! Recoverable conditions are reported through [`KernelResult`];
//! configuration-invariant violations (a missing redistributor frame, a
//! registration for a vector that cannot exist) are programming or platform
//! bugs and panic instead of returning one of these.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// An interrupt vector outside the range discovered from the hardware.
    InvalidVector {
        vector: u32,
        max: u32,
    },

    /// A subsystem was used before its one-time initialization ran.
    NotInitialized {
        subsystem: &'static str,
    },

    /// A one-time initialization ran twice.
    AlreadyInitialized {
        subsystem: &'static str,
    },

    /// Hardware errors
    HardwareError {
        device: &'static str,
        code: u32,
    },
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVector { vector, max } => {
                write!(f, "Invalid interrupt vector {} (max {})", vector, max)
            }
            Self::NotInitialized { subsystem } => {
                write!(f, "{} has not been initialized", subsystem)
            }
            Self::AlreadyInitialized { subsystem } => {
                write!(f, "{} has already been initialized", subsystem)
            }
            Self::HardwareError { device, code } => {
                write!(f, "Hardware error on {}: code 0x{:x}", device, code)
            }
        }
    }
}
