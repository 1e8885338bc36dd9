//! Memory management module
//!
//! Provides:
//! - Physical page pool with reference counting
//! - Per-environment two-level address spaces
//! - Validated page mapping syscalls (`mapper`)
//!
//! # Security Principles
//! - All user addresses are bounds- and alignment-checked
//! - Pages are zeroed before they are handed out
//! - A page is freed only when its last mapping is removed

pub mod address;
pub mod frame;
pub mod mapper;
pub mod paging;

pub use address::{PhysAddr, VirtAddr, PAGE_SIZE, ULIM, USTACKTOP, UTOP, UXSTACKTOP};
pub use frame::PagePool;
pub use paging::{AddressSpace, MappingError, PteFlags};
