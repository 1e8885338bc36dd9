//! Memory Mapping Syscalls
//!
//! Validated wrappers turning user requests into page pool and page
//! table operations. They own no state; every call checks addresses,
//! permissions and environment ids before touching a page table.
//!
//! # Security Properties
//! - Only page-aligned addresses below `UTOP` are accepted
//! - Permission masks are restricted to the syscall set
//! - A read-only page can't be remapped writable
//! - A freshly allocated page is released if it can't be mapped

use log::trace;

use crate::cap::{check_grant, check_perm, resolve, Access};
use crate::env::EnvId;
use crate::error::{SysResult, SyscallError};
use crate::kernel::Kernel;
use crate::syscall::Reply;

use super::address::VirtAddr;

impl Kernel {
    /// Allocate a zeroed page and map it at `va` in `id`'s address space,
    /// replacing whatever was there.
    ///
    /// Errors: `Inval` for a bad address or mask, `BadEnv`, `NoMem`.
    pub(crate) fn sys_page_alloc(&mut self, caller: usize, id: EnvId, va: VirtAddr, perm: u32) -> SysResult<Reply> {
        if !va.is_user_page() {
            return Err(SyscallError::Inval.into());
        }
        let perm = check_perm(perm)?;
        let target = resolve(&self.envs, caller, id, Access::Privileged)?;

        let page = self.pages.alloc().ok_or(SyscallError::NoMem)?;
        let env = self.envs.slot_mut(target)?;
        if let Err(err) = env.space.insert(&mut self.pages, page, va, perm) {
            self.pages.free(page);
            return Err(err.into());
        }
        trace!("[{}] page_alloc {} -> {}", env.id, va, page);
        Ok(Reply::Value(0))
    }

    /// Map the page at `src_va` in `src` at `dst_va` in `dst`.
    ///
    /// Errors: `BadEnv`; `Inval` for bad addresses, an unmapped source,
    /// a bad mask or a write grant over a read-only source; `NoMem`.
    pub(crate) fn sys_page_map(
        &mut self,
        caller: usize,
        src: EnvId,
        src_va: VirtAddr,
        dst: EnvId,
        dst_va: VirtAddr,
        perm: u32,
    ) -> SysResult<Reply> {
        let src = resolve(&self.envs, caller, src, Access::Privileged)?;
        let dst = resolve(&self.envs, caller, dst, Access::Privileged)?;
        if !src_va.is_user_page() || !dst_va.is_user_page() {
            return Err(SyscallError::Inval.into());
        }

        let (page, src_flags) = self
            .envs
            .slot(src)?
            .space
            .lookup(src_va)
            .ok_or(SyscallError::Inval)?;
        let perm = check_perm(perm)?;
        check_grant(perm, src_flags)?;

        let env = self.envs.slot_mut(dst)?;
        env.space.insert(&mut self.pages, page, dst_va, perm)?;
        Ok(Reply::Value(0))
    }

    /// Remove the mapping at `va` in `id`. Unmapped addresses succeed.
    ///
    /// Errors: `Inval` for a bad address, `BadEnv`.
    pub(crate) fn sys_page_unmap(&mut self, caller: usize, id: EnvId, va: VirtAddr) -> SysResult<Reply> {
        if !va.is_user_page() {
            return Err(SyscallError::Inval.into());
        }
        let target = resolve(&self.envs, caller, id, Access::Privileged)?;
        let env = self.envs.slot_mut(target)?;
        env.space.remove(&mut self.pages, va);
        Ok(Reply::Value(0))
    }
}
