//! Device drivers
//!
//! The kernel reaches devices only through [`Platform`]. A board image
//! implements it over real hardware; [`LoopbackPlatform`] implements it
//! in memory for hosted runs.
//!
//! All drivers follow these principles:
//! - Input validation on all public interfaces
//! - No panics on invalid input (return errors)

pub mod e1000;
mod loopback;

pub use loopback::LoopbackPlatform;

use crate::error::SyscallError;

/// Failure reported by the network device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// Every transmit descriptor is still owned by the device.
    TxRingFull,
    /// No packet is waiting.
    RxRingEmpty,
    /// The next packet is longer than the receive buffer. It is dropped.
    FrameTooLong(usize),
}

impl From<NetError> for SyscallError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::TxRingFull => Self::TxRingFull,
            NetError::RxRingEmpty => Self::RxRingEmpty,
            NetError::FrameTooLong(_) => Self::Inval,
        }
    }
}

/// Devices the syscall layer talks to.
pub trait Platform: Send {
    /// Write bytes to the console.
    fn console_write(&mut self, bytes: &[u8]);

    /// Next console input byte, without blocking.
    fn console_getc(&mut self) -> Option<u8>;

    /// Milliseconds since boot.
    fn time_msec(&self) -> u64;

    /// Queue one packet for transmission.
    fn net_transmit(&mut self, packet: &[u8]) -> Result<(), NetError>;

    /// Copy the next received packet into `buf`, returning its length.
    /// A packet that does not fit is consumed and reported as
    /// [`NetError::FrameTooLong`], never truncated.
    fn net_receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError>;
}
