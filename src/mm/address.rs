//! Physical and Virtual Address Types
//!
//! Type-safe wrappers for memory addresses that prevent mixing
//! physical frames with user virtual addresses at compile time.
//!
//! # User Address Space Layout
//! ```text
//!  ULIM       0xEF80_0000  ─┬─ kernel only above this line
//!                           │  read-only kernel exports
//!  UTOP       0xEEC0_0000  ─┼─ UXSTACKTOP: exception stack (1 page)
//!                           │  empty guard page
//!  USTACKTOP  0xEEBF_E000  ─┼─ normal user stack grows down
//!                           │  program text, data, heap, shared pages
//!             0x0000_0000  ─┘
//! ```
//!
//! # Security Properties
//! - Physical addresses cannot be dereferenced directly
//! - Every user-supplied address is range- and alignment-checked before use

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Number of entries per page table and per page directory.
pub const ENTRIES_PER_TABLE: usize = 1024;
/// Bits to shift for the page directory index.
pub const PDX_SHIFT: usize = 22;

/// User/kernel split: nothing at or above this is user-accessible.
pub const ULIM: usize = 0xEF80_0000;

/// Highest address (exclusive) a user environment may map or request.
pub const UTOP: usize = 0xEEC0_0000;

/// Top of the one-page user exception stack.
pub const UXSTACKTOP: usize = UTOP;

/// Top of the normal user stack (one guard page below the exception stack).
pub const USTACKTOP: usize = UTOP - 2 * PAGE_SIZE;

/// A physical memory address.
///
/// Physical addresses name frames in the page pool. They are never
/// dereferenced; the pool hands out the backing bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Create a new physical address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Physical address of the frame with the given number.
    #[inline]
    pub const fn from_frame_number(pfn: usize) -> Self {
        Self(pfn << PAGE_SHIFT)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Get the page frame number.
    #[inline]
    pub const fn frame_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#010x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A virtual memory address in a user environment's address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Page directory index.
    #[inline]
    pub const fn dir_index(self) -> usize {
        (self.0 >> PDX_SHIFT) & (ENTRIES_PER_TABLE - 1)
    }

    /// Page table index.
    #[inline]
    pub const fn table_index(self) -> usize {
        (self.0 >> PAGE_SHIFT) & (ENTRIES_PER_TABLE - 1)
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Rebuild an address from directory and table indices.
    #[inline]
    pub const fn from_indices(dir: usize, table: usize) -> Self {
        Self((dir << PDX_SHIFT) | (table << PAGE_SHIFT))
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Below `UTOP`: the range user environments may map.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < UTOP
    }

    /// Below `UTOP` and page-aligned.
    #[inline]
    pub const fn is_user_page(self) -> bool {
        self.is_user() && self.is_aligned()
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
