//! FlexSC Batched Syscalls
//!
//! A process registers a page of syscall entries and gets a dedicated
//! worker environment sharing its address space. The process fills
//! entries and marks them SUBMITTED; the worker polls the page, runs each
//! submitted call through the ordinary dispatcher and publishes the
//! result. No trap is taken per call.
//!
//! # Pairing
//! ```text
//!   process (NORMAL) ◄──── link ────► worker (FLEX_WORKER)
//!        │                                │
//!        └──── va ──► syscall page ◄── va ┘
//! ```
//! The worker maps every page of the process below its private stacks,
//! so pages the process maps later are not visible to it. The link is
//! symmetric and is checked after every spawn and destroy.

mod page;
mod pool;
mod worker;

use log::{info, warn};

use crate::env::{EnvKind, EnvStatus, TrapFrame};
use crate::error::{SysResult, SyscallError};
use crate::kernel::Kernel;
use crate::mm::{PhysAddr, PteFlags, VirtAddr, PAGE_SIZE, USTACKTOP, UXSTACKTOP};
use crate::syscall::Reply;

pub use page::{EntryStatus, SyscallEntry, ENTRY_SIZE, SYSCALL_ENTRIES};
pub use pool::{PoolError, ScPageHandle, ScPagePool};

/// User address of the worker loop in the user library. A worker starts
/// here with its syscall page's address in x0.
pub const WORKER_ENTRY: usize = 0x0080_0020;

/// The worker's private user stack page.
pub const WORKER_STACK: usize = USTACKTOP - PAGE_SIZE;
/// The worker's private exception stack page.
pub const WORKER_XSTACK: usize = UXSTACKTOP - PAGE_SIZE;

impl Kernel {
    /// Turn the writable page at `va` into a syscall page and start a
    /// worker for it.
    ///
    /// Errors: `Inval` if the caller is a worker or already registered,
    /// or `va` is not a page-aligned user address below the worker's
    /// stacks; `NoMem` when the syscall page pool or physical memory runs
    /// out; `NoFreeEnv` if there is no slot for the worker. A `va` that is
    /// not mapped writable destroys the caller.
    pub(crate) fn sys_flexsc_register(&mut self, caller: usize, va: VirtAddr) -> SysResult<Reply> {
        let env = self.envs.slot(caller)?;
        if env.kind != EnvKind::Normal || env.link.is_some() {
            return Err(SyscallError::Inval.into());
        }
        if !va.is_user_page() || va.as_usize() >= WORKER_STACK {
            return Err(SyscallError::Inval.into());
        }
        self.user_mem_assert(caller, va, PAGE_SIZE, PteFlags::USER_RW)?;

        let handle = self.scpages.alloc(&mut self.pages).map_err(|err| {
            warn!("flexsc: {}", err);
            SyscallError::from(err)
        })?;
        let frame = match self.scpages.frame(handle) {
            Some(frame) => frame,
            None => return Err(SyscallError::NoMem.into()),
        };

        let worker = match self.spawn_worker(caller, frame, va) {
            Ok(worker) => worker,
            Err(err) => {
                self.scpages.release(&mut self.pages, handle);
                return Err(err.into());
            }
        };

        let process = self.envs.slot_mut(caller)?;
        if let Err(err) = process.space.insert(&mut self.pages, frame, va, PteFlags::USER_RW) {
            self.envs.free(&mut self.pages, worker);
            self.scpages.release(&mut self.pages, handle);
            return Err(SyscallError::from(err).into());
        }

        self.envs.link(caller, worker)?;
        for index in [caller, worker] {
            self.envs.slot_mut(index)?.scpage = Some(handle);
        }
        let worker_env = self.envs.slot_mut(worker)?;
        worker_env.status = EnvStatus::Runnable;
        let worker_id = worker_env.id;
        self.check_links();

        info!(
            "[{}] flexsc worker {} on syscall page {} at {}",
            self.envs.slot(caller)?.id,
            worker_id,
            handle.index(),
            va
        );
        Ok(Reply::Value(0))
    }

    /// Build a worker for the process in `caller`. It is left
    /// NOT_RUNNABLE and unlinked; on failure nothing is left behind.
    fn spawn_worker(&mut self, caller: usize, frame: PhysAddr, va: VirtAddr) -> Result<usize, SyscallError> {
        let process = self.envs.slot(caller)?;
        let (parent, upcall) = (process.id, process.pgfault_upcall);
        let shared = process.space.mappings_below(VirtAddr::new(WORKER_STACK));

        let index = self.envs.alloc(&mut self.pages, parent)?;
        if let Err(err) = self.populate_worker(index, &shared, frame, va) {
            self.envs.free(&mut self.pages, index);
            return Err(err);
        }

        let worker = self.envs.slot_mut(index)?;
        worker.kind = EnvKind::FlexWorker;
        worker.status = EnvStatus::NotRunnable;
        worker.pgfault_upcall = upcall;
        worker.frame = TrapFrame::user(WORKER_ENTRY, USTACKTOP);
        worker.frame.set_arg0(va);
        Ok(index)
    }

    fn populate_worker(
        &mut self,
        index: usize,
        shared: &[(VirtAddr, PhysAddr, PteFlags)],
        frame: PhysAddr,
        va: VirtAddr,
    ) -> Result<(), SyscallError> {
        let worker = self.envs.slot_mut(index)?;
        for &(page_va, page, flags) in shared {
            worker.space.insert(&mut self.pages, page, page_va, flags & PteFlags::SYSCALL)?;
        }

        for stack in [WORKER_STACK, WORKER_XSTACK] {
            let page = self.pages.alloc().ok_or(SyscallError::NoMem)?;
            if let Err(err) = worker.space.insert(&mut self.pages, page, VirtAddr::new(stack), PteFlags::USER_RW) {
                self.pages.free(page);
                return Err(err.into());
            }
        }

        worker.space.insert(&mut self.pages, frame, va, PteFlags::USER_RW)?;
        Ok(())
    }

    /// Wake the caller's worker and sleep until something wakes the
    /// caller again.
    ///
    /// Nothing in the kernel does that when entries complete: the caller
    /// stays NOT_RUNNABLE until another environment sets it RUNNABLE or
    /// sends it a message after it receives.
    ///
    /// Errors: `Inval` if the caller has no live worker.
    pub(crate) fn sys_flexsc_wait(&mut self, caller: usize) -> SysResult<Reply> {
        let env = self.envs.slot(caller)?;
        if env.kind != EnvKind::Normal {
            return Err(SyscallError::Inval.into());
        }
        let worker = env
            .link
            .and_then(|id| self.envs.lookup(id))
            .ok_or(SyscallError::Inval)?;

        self.envs.slot_mut(worker)?.status = EnvStatus::Runnable;
        let env = self.envs.slot_mut(caller)?;
        env.frame.set_return(0);
        env.status = EnvStatus::NotRunnable;
        self.switch_to(worker);
        Ok(Reply::Suspended)
    }
}
