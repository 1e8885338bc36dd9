//! Two-Level Page Tables
//!
//! Implements per-environment address spaces with a page directory of
//! 1024 entries, each pointing at a page table of 1024 entries.
//!
//! # Page Table Structure (4KB pages)
//! - Page directory: 1024 entries, each covers 4MB
//! - Page table: 1024 entries, each covers 4KB
//!
//! The directory and every page table occupy one frame from the page
//! pool, so creating an address space or touching a fresh 4MB region can
//! fail with [`MappingError::OutOfMemory`].
//!
//! # Security Properties
//! - Page flags are strictly typed
//! - A frame's reference count tracks every mapping of it

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use bitflags::bitflags;

use super::address::{PhysAddr, VirtAddr, ENTRIES_PER_TABLE, PAGE_SIZE, ULIM};
use super::frame::PagePool;

bitflags! {
    /// Page table entry flags.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct PteFlags: u32 {
        /// Entry is present.
        const PRESENT = 0x001;
        /// Page is writable.
        const WRITABLE = 0x002;
        /// Page is accessible from user mode.
        const USER = 0x004;
        /// Write-through caching.
        const WRITE_THROUGH = 0x008;
        /// Caching disabled.
        const CACHE_DISABLE = 0x010;
        /// Set by hardware on access.
        const ACCESSED = 0x020;
        /// Set by hardware on write.
        const DIRTY = 0x040;
        /// Large page.
        const HUGE = 0x080;
        /// Global mapping.
        const GLOBAL = 0x100;
        /// Available for software use.
        const AVAIL = 0xE00;
    }
}

impl PteFlags {
    /// Bits a user environment may pass to a mapping syscall.
    pub const SYSCALL: Self = Self::PRESENT
        .union(Self::WRITABLE)
        .union(Self::USER)
        .union(Self::AVAIL);

    /// Bits every user-requested mapping must carry.
    pub const REQUIRED: Self = Self::PRESENT.union(Self::USER);

    /// Present, user-accessible and writable.
    pub const USER_RW: Self = Self::REQUIRED.union(Self::WRITABLE);
}

/// A single page table entry: frame address in the high 20 bits,
/// flags in the low 12.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// Address mask for page table entries (bits [31:12]).
    const ADDR_MASK: u32 = 0xFFFF_F000;

    /// Create an entry mapping a physical frame.
    #[inline]
    pub fn page(phys: PhysAddr, flags: PteFlags) -> Self {
        debug_assert!(phys.is_aligned());
        Self((phys.as_usize() as u32 & Self::ADDR_MASK) | flags.bits())
    }

    /// Check if the entry is present.
    #[inline]
    pub const fn is_present(self) -> bool {
        self.0 & PteFlags::PRESENT.bits() != 0
    }

    /// Get the physical address from this entry.
    #[inline]
    pub const fn addr(self) -> PhysAddr {
        PhysAddr::new((self.0 & Self::ADDR_MASK) as usize)
    }

    /// Get the flags from this entry.
    #[inline]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & !Self::ADDR_MASK)
    }

    /// Clear the entry (make invalid).
    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_present() {
            write!(f, "PTE(addr={}, flags={:?})", self.addr(), self.flags())
        } else {
            write!(f, "PTE(invalid)")
        }
    }
}

/// One second-level page table and the frame that backs it.
struct PageTable {
    frame: PhysAddr,
    entries: Box<[PageTableEntry; ENTRIES_PER_TABLE]>,
}

impl PageTable {
    fn new(frame: PhysAddr) -> Self {
        Self {
            frame,
            entries: Box::new([PageTableEntry::default(); ENTRIES_PER_TABLE]),
        }
    }
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is not mapped.
    NotMapped,
    /// No physical frames available for page tables.
    OutOfMemory,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::OutOfMemory => write!(f, "out of memory for page tables"),
        }
    }
}

/// A user environment's address space.
pub struct AddressSpace {
    root: PhysAddr,
    tables: BTreeMap<usize, PageTable>,
}

impl AddressSpace {
    /// Create an empty address space, taking one frame for the directory.
    pub fn new(pool: &mut PagePool) -> Result<Self, MappingError> {
        let root = pool.alloc().ok_or(MappingError::OutOfMemory)?;
        pool.incref(root);
        Ok(Self {
            root,
            tables: BTreeMap::new(),
        })
    }

    /// Physical address of the page directory.
    pub fn root(&self) -> PhysAddr {
        self.root
    }

    fn walk(&self, va: VirtAddr) -> Option<PageTableEntry> {
        self.tables
            .get(&va.dir_index())
            .map(|table| table.entries[va.table_index()])
            .filter(|entry| entry.is_present())
    }

    fn walk_create(
        &mut self,
        pool: &mut PagePool,
        va: VirtAddr,
    ) -> Result<&mut PageTableEntry, MappingError> {
        let dir = va.dir_index();
        if !self.tables.contains_key(&dir) {
            let frame = pool.alloc().ok_or(MappingError::OutOfMemory)?;
            pool.incref(frame);
            self.tables.insert(dir, PageTable::new(frame));
        }
        match self.tables.get_mut(&dir) {
            Some(table) => Ok(&mut table.entries[va.table_index()]),
            None => Err(MappingError::OutOfMemory),
        }
    }

    /// Map `phys` at `va` with `flags | PRESENT`.
    ///
    /// Any page already mapped at `va` is unmapped first. Re-inserting
    /// the frame that is already mapped at `va` only updates the flags.
    /// On failure nothing changes.
    pub fn insert(
        &mut self,
        pool: &mut PagePool,
        phys: PhysAddr,
        va: VirtAddr,
        flags: PteFlags,
    ) -> Result<(), MappingError> {
        let va = va.align_down();
        let old = *self.walk_create(pool, va)?;

        // Take the new reference before dropping the old one so that
        // re-inserting the same frame never frees it.
        pool.incref(phys);
        if old.is_present() {
            pool.decref(old.addr());
        }

        let entry = self.walk_create(pool, va)?;
        *entry = PageTableEntry::page(phys, flags | PteFlags::PRESENT);
        Ok(())
    }

    /// Frame and flags mapped at `va`, if any.
    pub fn lookup(&self, va: VirtAddr) -> Option<(PhysAddr, PteFlags)> {
        self.walk(va).map(|entry| (entry.addr(), entry.flags()))
    }

    /// Unmap whatever is at `va`. Unmapped addresses are a no-op.
    pub fn remove(&mut self, pool: &mut PagePool, va: VirtAddr) {
        let dir = va.dir_index();
        let Some(table) = self.tables.get_mut(&dir) else {
            return;
        };
        let entry = &mut table.entries[va.table_index()];
        if entry.is_present() {
            let phys = entry.addr();
            entry.clear();
            pool.decref(phys);
        }
    }

    /// Every present mapping strictly below `limit`, in address order.
    pub fn mappings_below(&self, limit: VirtAddr) -> Vec<(VirtAddr, PhysAddr, PteFlags)> {
        let mut out = Vec::new();
        for (&dir, table) in self.tables.iter() {
            for (index, entry) in table.entries.iter().enumerate() {
                let va = VirtAddr::from_indices(dir, index);
                if va >= limit {
                    return out;
                }
                if entry.is_present() {
                    out.push((va, entry.addr(), entry.flags()));
                }
            }
        }
        out
    }

    /// Check that `[va, va + len)` lies below `ULIM` and every page in it
    /// is mapped with at least `perm | PRESENT`.
    ///
    /// Returns the first faulting address on failure.
    pub fn check_user(&self, va: VirtAddr, len: usize, perm: PteFlags) -> Result<(), VirtAddr> {
        if len == 0 {
            return Ok(());
        }
        let end = match va.as_usize().checked_add(len) {
            Some(end) => end,
            None => return Err(va),
        };
        let required = perm | PteFlags::PRESENT;

        let mut page = va.align_down().as_usize();
        while page < end {
            // Report the caller's own address for the first page.
            let fault = VirtAddr::new(page.max(va.as_usize()));
            if page >= ULIM {
                return Err(fault);
            }
            match self.walk(VirtAddr::new(page)) {
                Some(entry) if entry.flags().contains(required) => {}
                _ => return Err(fault),
            }
            page += PAGE_SIZE;
        }
        Ok(())
    }

    /// Kernel-mode copy out of this address space. Permissions are not
    /// checked; only presence is.
    pub fn read(&self, pool: &PagePool, va: VirtAddr, out: &mut [u8]) -> Result<(), MappingError> {
        let mut done = 0;
        while done < out.len() {
            let cur = va.checked_add(done).ok_or(MappingError::NotMapped)?;
            let entry = self.walk(cur).ok_or(MappingError::NotMapped)?;
            let offset = cur.page_offset();
            let chunk = (PAGE_SIZE - offset).min(out.len() - done);
            out[done..done + chunk].copy_from_slice(&pool.bytes(entry.addr())[offset..offset + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Kernel-mode copy into this address space. Permissions are not
    /// checked; only presence is.
    pub fn write(&self, pool: &mut PagePool, va: VirtAddr, data: &[u8]) -> Result<(), MappingError> {
        let mut done = 0;
        while done < data.len() {
            let cur = va.checked_add(done).ok_or(MappingError::NotMapped)?;
            let entry = self.walk(cur).ok_or(MappingError::NotMapped)?;
            let offset = cur.page_offset();
            let chunk = (PAGE_SIZE - offset).min(data.len() - done);
            pool.bytes_mut(entry.addr())[offset..offset + chunk]
                .copy_from_slice(&data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Number of present mappings.
    pub fn mapped_pages(&self) -> usize {
        self.tables
            .values()
            .map(|table| table.entries.iter().filter(|entry| entry.is_present()).count())
            .sum()
    }

    /// Drop every mapping, page table and the directory itself.
    pub fn destroy(mut self, pool: &mut PagePool) {
        let tables = core::mem::take(&mut self.tables);
        for (_, table) in tables {
            for entry in table.entries.iter().filter(|entry| entry.is_present()) {
                pool.decref(entry.addr());
            }
            pool.decref(table.frame);
        }
        pool.decref(self.root);
    }
}
