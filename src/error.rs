//! System Call Error Codes
//!
//! Two tiers of failure leave a syscall handler:
//! - [`SyscallError`]: recoverable, returned to the caller as a negative code
//! - [`Terminated`]: the caller touched memory it may not touch and has been
//!   destroyed; there is nobody left to return to

use core::fmt;

use crate::mm::MappingError;

/// Recoverable system call error codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Environment doesn't exist or the caller may not act on it
    BadEnv = -2,
    /// Invalid argument
    Inval = -3,
    /// Out of memory
    NoMem = -4,
    /// Environment table is full
    NoFreeEnv = -5,
    /// Target is not blocked in receive
    IpcNotRecv = -7,
    /// Request parked on behalf of a FlexSC partner
    Blocked = -16,
    /// Transmit descriptor ring is full
    TxRingFull = -17,
    /// No packet waiting in the receive ring
    RxRingEmpty = -18,
}

impl SyscallError {
    /// The negative value placed in the caller's return register.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Decode a negative return value.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(Self::BadEnv),
            -3 => Some(Self::Inval),
            -4 => Some(Self::NoMem),
            -5 => Some(Self::NoFreeEnv),
            -7 => Some(Self::IpcNotRecv),
            -16 => Some(Self::Blocked),
            -17 => Some(Self::TxRingFull),
            -18 => Some(Self::RxRingEmpty),
            _ => None,
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadEnv => write!(f, "bad environment"),
            Self::Inval => write!(f, "invalid parameter"),
            Self::NoMem => write!(f, "out of memory"),
            Self::NoFreeEnv => write!(f, "out of environments"),
            Self::IpcNotRecv => write!(f, "env is not recving"),
            Self::Blocked => write!(f, "blocked on partner"),
            Self::TxRingFull => write!(f, "transmit ring full"),
            Self::RxRingEmpty => write!(f, "receive ring empty"),
        }
    }
}

impl From<MappingError> for SyscallError {
    fn from(_: MappingError) -> Self {
        Self::NoMem
    }
}

/// The calling environment was destroyed while servicing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminated;

/// Error returned by the dispatcher and handler stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Recoverable failure reported to the caller.
    Syscall(SyscallError),
    /// Caller destroyed; no return value is delivered.
    Terminated,
}

impl From<SyscallError> for Error {
    fn from(value: SyscallError) -> Self {
        Self::Syscall(value)
    }
}

impl From<Terminated> for Error {
    fn from(_: Terminated) -> Self {
        Self::Terminated
    }
}

impl From<MappingError> for Error {
    fn from(value: MappingError) -> Self {
        Self::Syscall(value.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syscall(err) => write!(f, "{}", err),
            Self::Terminated => write!(f, "caller terminated"),
        }
    }
}

/// Result type used by syscall handlers.
pub type SysResult<T> = Result<T, Error>;
