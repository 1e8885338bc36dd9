//! System Call Input Validation
//!
//! Checks caller-supplied buffers against the caller's own page tables.
//!
//! # Security Principles
//! - Validate ALL user memory before use
//! - Fail-secure: a buffer that fails the check destroys the caller,
//!   which then receives no return value ([`Terminated`])
//! - Copy into kernel space once, so later changes to the user page
//!   cannot race the handler (TOCTOU)

use alloc::vec;
use alloc::vec::Vec;

use log::warn;

use crate::error::Terminated;
use crate::kernel::Kernel;
use crate::mm::{PteFlags, VirtAddr};

/// A kernel-side copy of a validated user buffer.
#[derive(Debug)]
pub struct UserBuffer {
    bytes: Vec<u8>,
}

impl UserBuffer {
    /// Get the buffer as a byte slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Kernel {
    /// Check that the caller may access `[va, va + len)` with `perm`,
    /// destroying it if not.
    ///
    /// # Security Checks
    /// 1. Every page lies below `ULIM`
    /// 2. Every page is mapped with at least `perm | USER | PRESENT`
    /// 3. The range doesn't wrap around the address space
    pub(crate) fn user_mem_assert(
        &mut self,
        caller: usize,
        va: VirtAddr,
        len: usize,
        perm: PteFlags,
    ) -> Result<(), Terminated> {
        let Some(env) = self.envs.get(caller) else {
            return Err(Terminated);
        };
        match env.space.check_user(va, len, perm | PteFlags::USER) {
            Ok(()) => Ok(()),
            Err(fault) => {
                warn!("[{}] user_mem_check assertion failure for va {}", env.id, fault);
                self.destroy_env(caller);
                Err(Terminated)
            }
        }
    }

    /// Validate a readable user buffer and copy it in.
    pub(crate) fn copy_in(&mut self, caller: usize, va: VirtAddr, len: usize) -> Result<UserBuffer, Terminated> {
        self.user_mem_assert(caller, va, len, PteFlags::USER)?;
        let mut bytes = vec![0u8; len];
        let env = self.envs.get(caller).ok_or(Terminated)?;
        // Every page was just checked present.
        env.space.read(&self.pages, va, &mut bytes).map_err(|_| Terminated)?;
        Ok(UserBuffer { bytes })
    }

    /// Write into a user buffer the caller already asserted writable.
    pub(crate) fn copy_out(&mut self, caller: usize, va: VirtAddr, data: &[u8]) -> Result<(), Terminated> {
        let env = self.envs.get(caller).ok_or(Terminated)?;
        env.space.write(&mut self.pages, va, data).map_err(|_| Terminated)
    }
}
