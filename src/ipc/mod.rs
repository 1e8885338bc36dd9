//! Rendezvous IPC
//!
//! One 32-bit value, and optionally one page, passes from a sender to a
//! receiver that is blocked waiting for it.
//!
//! # Protocol
//! ```text
//!   receiver                         sender
//!   ipc_recv(dstva)
//!     recving = true
//!     NOT_RUNNABLE, yield ──────►    ipc_try_send(id, value, srcva, perm)
//!                                      target not recving? IPC_NOT_RECV
//!                                      page wanted by both? map it
//!                                      recving = false, record value
//!   ◄──────────────────────────────    target RUNNABLE
//!   observes 0
//! ```
//!
//! A send either completes entirely or has no effect: every check that
//! can fail, including the page mapping, runs before the receiver's IPC
//! state changes. The receive state is read once, up front.

use log::{debug, trace};

use crate::cap::{check_grant, check_perm, resolve, Access};
use crate::env::{EnvId, EnvKind, EnvStatus};
use crate::error::{SysResult, SyscallError};
use crate::kernel::Kernel;
use crate::mm::{PteFlags, VirtAddr};
use crate::syscall::Reply;

impl Kernel {
    /// Try to deliver `value` (and the page at `srcva`, if it is below
    /// `UTOP` and the receiver asked for one) to `id`.
    ///
    /// Errors: `BadEnv`; `IpcNotRecv` if `id` is not blocked in receive;
    /// `Inval` for a misaligned or unmapped `srcva`, a bad mask or a write
    /// grant over a read-only page; `NoMem`.
    pub(crate) fn sys_ipc_try_send(
        &mut self,
        caller: usize,
        id: EnvId,
        value: u32,
        srcva: VirtAddr,
        perm: u32,
    ) -> SysResult<Reply> {
        let target = resolve(&self.envs, caller, id, Access::Any)?;
        let receiver = self.envs.slot(target)?;
        if !receiver.ipc.recving {
            return Err(SyscallError::IpcNotRecv.into());
        }
        let dstva = receiver.ipc.dstva;

        let mut granted = PteFlags::empty();
        if let (true, Some(dstva)) = (srcva.is_user(), dstva) {
            if !srcva.is_aligned() {
                return Err(SyscallError::Inval.into());
            }
            let perm = check_perm(perm)?;
            let (page, src_flags) = self
                .envs
                .slot(caller)?
                .space
                .lookup(srcva)
                .ok_or(SyscallError::Inval)?;
            check_grant(perm, src_flags)?;

            let receiver = self.envs.slot_mut(target)?;
            receiver.space.insert(&mut self.pages, page, dstva, perm)?;
            granted = perm;
        }

        let from = self.envs.slot(caller)?.effective_id();
        let receiver = self.envs.slot_mut(target)?;
        receiver.ipc.recving = false;
        receiver.ipc.parked = false;
        receiver.ipc.from = from;
        receiver.ipc.value = value;
        receiver.ipc.perm = granted;
        receiver.status = EnvStatus::Runnable;
        trace!("ipc {} -> {}: {:#x} perm {:?}", from, receiver.id, value, granted);
        Ok(Reply::Value(0))
    }

    /// Block until a message arrives. A `dstva` below `UTOP` also accepts
    /// a page there.
    ///
    /// On success the caller is suspended and later observes 0. A FlexSC
    /// worker receives for its partner instead: the partner is marked
    /// receiving and put to sleep, and the worker gets `Blocked`.
    ///
    /// Errors: `Inval` if `dstva` is below `UTOP` but misaligned.
    pub(crate) fn sys_ipc_recv(&mut self, caller: usize, dstva: VirtAddr) -> SysResult<Reply> {
        let env = self.envs.slot(caller)?;
        if env.kind == EnvKind::FlexWorker {
            let partner = env
                .link
                .and_then(|partner| self.envs.lookup(partner))
                .ok_or(SyscallError::BadEnv)?;
            let process = self.envs.slot_mut(partner)?;
            process.ipc.recving = true;
            process.ipc.parked = true;
            process.ipc.dstva = None;
            process.status = EnvStatus::NotRunnable;
            return Err(SyscallError::Blocked.into());
        }

        if dstva.is_user() && !dstva.is_aligned() {
            return Err(SyscallError::Inval.into());
        }

        let env = self.envs.slot_mut(caller)?;
        env.ipc.recving = true;
        env.ipc.parked = false;
        env.ipc.dstva = Some(dstva).filter(|va| va.is_user());
        env.frame.set_return(0);
        env.status = EnvStatus::NotRunnable;
        self.schedule();
        Ok(Reply::Suspended)
    }

    /// Abandon a receive the worker parked on the process in `index`.
    /// The process runs again and sees `BadEnv`.
    pub(crate) fn cancel_parked_recv(&mut self, index: usize) {
        let Some(env) = self.envs.get_mut(index) else {
            return;
        };
        if !env.is_live() || !env.ipc.recving || !env.ipc.parked {
            return;
        }
        env.ipc.recving = false;
        env.ipc.parked = false;
        env.status = EnvStatus::Runnable;
        env.frame.set_return(SyscallError::BadEnv.code());
        debug!("[{}] parked receive cancelled", env.id);
    }
}
