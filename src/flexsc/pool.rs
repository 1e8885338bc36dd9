//! Syscall Page Pool
//!
//! Bounded arena of syscall pages addressed by stable handles. The pool
//! holds one reference on each page's frame while the slot is in use;
//! mappings in the process and its worker hold the rest, so the frame
//! outlives the slot until the last mapping goes away.

use alloc::vec::Vec;
use core::fmt;

use super::page::SYSCALL_ENTRIES;
use crate::error::SyscallError;
use crate::mm::{PagePool, PhysAddr};

/// Stable name of a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScPageHandle(usize);

impl ScPageHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Why a syscall page could not be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is in use.
    Exhausted,
    /// No physical frame for the page.
    OutOfMemory,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "syscall page pool exhausted"),
            Self::OutOfMemory => write!(f, "no frame for syscall page"),
        }
    }
}

impl From<PoolError> for SyscallError {
    fn from(_: PoolError) -> Self {
        Self::NoMem
    }
}

struct ScPage {
    frame: PhysAddr,
    /// Next entry the worker examines.
    cursor: usize,
}

pub struct ScPagePool {
    slots: Vec<Option<ScPage>>,
}

impl ScPagePool {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Take a free slot and back it with a zeroed frame, so every entry
    /// starts FREE.
    pub fn alloc(&mut self, pages: &mut PagePool) -> Result<ScPageHandle, PoolError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(PoolError::Exhausted)?;
        let frame = pages.alloc().ok_or(PoolError::OutOfMemory)?;
        pages.incref(frame);
        self.slots[index] = Some(ScPage { frame, cursor: 0 });
        Ok(ScPageHandle(index))
    }

    /// Return a slot, dropping the pool's reference on its frame.
    pub fn release(&mut self, pages: &mut PagePool, handle: ScPageHandle) {
        if let Some(page) = self.slots.get_mut(handle.0).and_then(Option::take) {
            pages.decref(page.frame);
        }
    }

    /// Frame backing a live slot.
    pub fn frame(&self, handle: ScPageHandle) -> Option<PhysAddr> {
        self.page(handle).map(|page| page.frame)
    }

    /// The entry the worker should look at next, advancing the cursor
    /// cyclically.
    pub(crate) fn next_slot(&mut self, handle: ScPageHandle) -> Option<(PhysAddr, usize)> {
        let page = self.slots.get_mut(handle.0)?.as_mut()?;
        let slot = page.cursor;
        page.cursor = (page.cursor + 1) % SYSCALL_ENTRIES;
        Some((page.frame, slot))
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn page(&self, handle: ScPageHandle) -> Option<&ScPage> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }
}
