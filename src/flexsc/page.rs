//! Syscall Page Layout
//!
//! A syscall page is an array of fixed-size entries shared between a
//! process and its worker. This layout is the only wire format between
//! them, so it is spelled out byte for byte.
//!
//! # Entry Layout (little-endian)
//! ```text
//!  offset  size  field
//!  0       4     status   FREE=0, SUBMITTED=1, BUSY=2, DONE=3
//!  4       4     num      syscall number
//!  8       20    args     five argument words
//!  28      4     ret      result, valid once DONE
//! ```
//!
//! # Ownership
//! The process writes an entry while it is FREE and publishes it by
//! setting SUBMITTED. The worker claims it (BUSY), runs it, stores `ret`
//! and sets DONE. The process consumes the result and resets it to FREE.
//! Each party only ever advances the status one step, so one writer per
//! slot at a time needs no further synchronization.

use core::mem::size_of;

use crate::mm::PAGE_SIZE;
use crate::syscall::Syscall;

/// Lifecycle of an entry.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Free = 0,
    Submitted = 1,
    Busy = 2,
    Done = 3,
}

impl EntryStatus {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Free),
            1 => Some(Self::Submitted),
            2 => Some(Self::Busy),
            3 => Some(Self::Done),
            _ => None,
        }
    }

    /// The only status this one may move to.
    pub const fn next(self) -> Self {
        match self {
            Self::Free => Self::Submitted,
            Self::Submitted => Self::Busy,
            Self::Busy => Self::Done,
            Self::Done => Self::Free,
        }
    }
}

/// One request slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyscallEntry {
    pub status: u32,
    pub num: u32,
    pub args: [u32; 5],
    pub ret: i32,
}

/// Bytes per entry.
pub const ENTRY_SIZE: usize = size_of::<SyscallEntry>();
/// Entries per syscall page.
pub const SYSCALL_ENTRIES: usize = PAGE_SIZE / ENTRY_SIZE;

const _: () = assert!(ENTRY_SIZE == 32);
const _: () = assert!(SYSCALL_ENTRIES == 128);

const STATUS_OFFSET: usize = 0;
const RET_OFFSET: usize = 28;

impl SyscallEntry {
    /// A request ready for the worker.
    pub fn submitted(call: Syscall) -> Self {
        let (num, args) = call.encode();
        Self {
            status: EntryStatus::Submitted as u32,
            num,
            args,
            ret: 0,
        }
    }

    pub fn status(&self) -> Option<EntryStatus> {
        EntryStatus::from_raw(self.status)
    }

    /// Byte offset of entry `slot` within its page.
    #[inline]
    pub const fn offset(slot: usize) -> usize {
        slot * ENTRY_SIZE
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        let words = [self.status, self.num]
            .into_iter()
            .chain(self.args)
            .chain([self.ret as u32]);
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut words = [0u32; 8];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self {
            status: words[0],
            num: words[1],
            args: [words[2], words[3], words[4], words[5], words[6]],
            ret: words[7] as i32,
        }
    }

    /// Read entry `slot` out of a syscall page.
    pub fn load(page: &[u8], slot: usize) -> Self {
        let start = Self::offset(slot);
        Self::from_bytes(&page[start..start + ENTRY_SIZE])
    }

    /// Overwrite only the status word of entry `slot`.
    pub fn store_status(page: &mut [u8], slot: usize, status: EntryStatus) {
        let at = Self::offset(slot) + STATUS_OFFSET;
        page[at..at + 4].copy_from_slice(&(status as u32).to_le_bytes());
    }

    /// Publish a result: `ret` first, then DONE.
    pub fn store_result(page: &mut [u8], slot: usize, ret: i32) {
        let at = Self::offset(slot) + RET_OFFSET;
        page[at..at + 4].copy_from_slice(&ret.to_le_bytes());
        Self::store_status(page, slot, EntryStatus::Busy.next());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::numbers;

    #[test]
    fn test_byte_layout() {
        let entry = SyscallEntry {
            status: 1,
            num: 4,
            args: [10, 20, 30, 40, 50],
            ret: -3,
        };
        let bytes = entry.to_bytes();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[4, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[10, 0, 0, 0]);
        assert_eq!(&bytes[24..28], &[50, 0, 0, 0]);
        assert_eq!(&bytes[28..32], &(-3i32).to_le_bytes());
        assert_eq!(SyscallEntry::from_bytes(&bytes), entry);
    }

    #[test]
    fn test_status_only_moves_forward() {
        let mut status = EntryStatus::Free;
        let mut seen = [status; 4];
        for step in seen.iter_mut().skip(1) {
            status = status.next();
            *step = status;
        }
        assert_eq!(
            seen,
            [EntryStatus::Free, EntryStatus::Submitted, EntryStatus::Busy, EntryStatus::Done]
        );
        assert_eq!(EntryStatus::Done.next(), EntryStatus::Free);
        assert_eq!(EntryStatus::from_raw(4), None);
    }

    #[test]
    fn test_slot_access() {
        let mut page = [0u8; PAGE_SIZE];
        let entry = SyscallEntry::submitted(Syscall::GetEnvId);
        let at = SyscallEntry::offset(127);
        page[at..at + ENTRY_SIZE].copy_from_slice(&entry.to_bytes());

        let loaded = SyscallEntry::load(&page, 127);
        assert_eq!(loaded.status(), Some(EntryStatus::Submitted));
        assert_eq!(loaded.num, numbers::SYS_GETENVID);

        SyscallEntry::store_result(&mut page, 127, 0x1001);
        let done = SyscallEntry::load(&page, 127);
        assert_eq!(done.status(), Some(EntryStatus::Done));
        assert_eq!(done.ret, 0x1001);
        assert_eq!(SyscallEntry::load(&page, 126), SyscallEntry::default());
    }
}
