//! Intel 82540EM (E1000) transmit path
//!
//! Descriptor layout and the software side of the transmit descriptor
//! ring. Packets are copied into per-descriptor buffers; a descriptor
//! belongs to software again once the device sets its DD status bit.
//!
//! # Ring Ownership
//! ```text
//!   head (TDH): next descriptor the device will send
//!   tail (TDT): next descriptor software will fill
//!   [head, tail) pending, DD clear; everything else free, DD set
//! ```

use alloc::vec;
use alloc::vec::Vec;
use core::mem::size_of;

use super::NetError;

/// Descriptor command: end of packet.
pub const TXD_CMD_EOP: u8 = 0x01;
/// Descriptor command: report status.
pub const TXD_CMD_RS: u8 = 0x08;
/// Descriptor status: descriptor done.
pub const TXD_STAT_DD: u8 = 0x01;

/// Number of transmit descriptors.
pub const NUMTD: usize = 64;
/// Largest packet accepted for transmission (Ethernet frame).
pub const PBUFSIZE: usize = 1518;
/// Receive buffer size a caller must provide.
pub const RBUFSIZE: usize = 2048;

/// Legacy transmit descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxDescriptor {
    pub addr: u64,
    pub length: u16,
    pub cso: u8,
    pub cmd: u8,
    pub status: u8,
    pub css: u8,
    pub special: u16,
}

const _: () = assert!(size_of::<TxDescriptor>() == 16);

impl TxDescriptor {
    #[inline]
    pub const fn is_done(&self) -> bool {
        self.status & TXD_STAT_DD != 0
    }
}

/// Software view of the transmit ring.
pub struct TxRing {
    descs: [TxDescriptor; NUMTD],
    buffers: Vec<[u8; PBUFSIZE]>,
    head: usize,
    tail: usize,
}

impl TxRing {
    /// A ring with every descriptor free.
    pub fn new() -> Self {
        let mut descs = [TxDescriptor::default(); NUMTD];
        for (index, desc) in descs.iter_mut().enumerate() {
            // Buffer offset within the ring's packet area
            desc.addr = (index * PBUFSIZE) as u64;
            desc.status = TXD_STAT_DD;
        }
        Self {
            descs,
            buffers: vec![[0u8; PBUFSIZE]; NUMTD],
            head: 0,
            tail: 0,
        }
    }

    /// Copy a packet into the tail descriptor and hand it to the device.
    ///
    /// Packets longer than [`PBUFSIZE`] are truncated; callers reject
    /// them first.
    pub fn transmit(&mut self, packet: &[u8]) -> Result<(), NetError> {
        let desc = &mut self.descs[self.tail];
        if !desc.is_done() {
            return Err(NetError::TxRingFull);
        }
        let len = packet.len().min(PBUFSIZE);
        self.buffers[self.tail][..len].copy_from_slice(&packet[..len]);
        desc.length = len as u16;
        desc.cmd = TXD_CMD_RS | TXD_CMD_EOP;
        desc.status &= !TXD_STAT_DD;
        self.tail = (self.tail + 1) % NUMTD;
        Ok(())
    }

    /// Play the device: send every pending descriptor in order and mark
    /// it done. Returns the number of packets sent.
    pub fn process(&mut self, mut sink: impl FnMut(&[u8])) -> usize {
        let mut sent = 0;
        while !self.descs[self.head].is_done() {
            let len = self.descs[self.head].length as usize;
            sink(&self.buffers[self.head][..len]);
            self.descs[self.head].status |= TXD_STAT_DD;
            self.head = (self.head + 1) % NUMTD;
            sent += 1;
        }
        sent
    }

    /// Descriptors waiting for the device.
    pub fn pending(&self) -> usize {
        self.descs.iter().filter(|desc| !desc.is_done()).count()
    }
}

impl Default for TxRing {
    fn default() -> Self {
        Self::new()
    }
}
