//! Kernel configuration
//!
//! Sizes of the fixed pools the kernel is built around. Everything else
//! (user address layout, entry geometry, priority range) is part of the
//! ABI and lives beside the types it governs.

use core::fmt;

use crate::env::ENV_GEN_SHIFT;
use crate::flexsc::SYSCALL_ENTRIES;
use crate::mm::address::PAGE_SHIFT;

/// Default number of environment slots.
pub const DEFAULT_MAX_ENVS: usize = 1024;
/// Default number of physical frames in the page pool.
pub const DEFAULT_MAX_PAGES: usize = 4096;
/// Frames a 32-bit page table entry can address.
pub const MAX_PAGES: usize = 1 << (32 - PAGE_SHIFT);
/// Default number of FlexSC syscall pages.
pub const DEFAULT_SYSCALL_PAGES: usize = 8;

/// Pool sizes for one kernel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Environment table slots. Must be a power of two.
    pub max_envs: usize,
    /// Physical frames available to the page pool.
    pub max_pages: usize,
    /// Syscall pages available to FlexSC registration.
    pub syscall_pages: usize,
    /// Entries a FlexSC worker examines before yielding the CPU.
    pub worker_slice: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_envs: DEFAULT_MAX_ENVS,
            max_pages: DEFAULT_MAX_PAGES,
            syscall_pages: DEFAULT_SYSCALL_PAGES,
            worker_slice: SYSCALL_ENTRIES,
        }
    }
}

/// Rejected configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment count is zero, not a power of two, or exceeds the
    /// id generation stride.
    EnvCount(usize),
    /// A pool was configured empty.
    EmptyPool(&'static str),
    /// More frames than a page table entry can address.
    PageCount(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvCount(count) => write!(f, "invalid environment count {}", count),
            Self::EmptyPool(name) => write!(f, "{} must not be zero", name),
            Self::PageCount(count) => write!(f, "{} pages exceeds the limit of {}", count, MAX_PAGES),
        }
    }
}

impl KernelConfig {
    /// Check the configuration before building a kernel from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_envs.is_power_of_two() || self.max_envs > 1 << ENV_GEN_SHIFT {
            return Err(ConfigError::EnvCount(self.max_envs));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::EmptyPool("max_pages"));
        }
        if self.max_pages > MAX_PAGES {
            return Err(ConfigError::PageCount(self.max_pages));
        }
        if self.syscall_pages == 0 {
            return Err(ConfigError::EmptyPool("syscall_pages"));
        }
        if self.worker_slice == 0 {
            return Err(ConfigError::EmptyPool("worker_slice"));
        }
        Ok(())
    }
}
