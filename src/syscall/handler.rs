//! System Call Handler
//!
//! Routes a decoded [`Syscall`] to exactly one handler.

use crate::error::SysResult;
use crate::kernel::Kernel;

use super::{Reply, Syscall};

impl Kernel {
    /// Dispatch a system call made by the environment in slot `caller`.
    ///
    /// # Returns
    /// - `Ok(Reply::Value(v))`: `v` goes to the caller's x0
    /// - `Ok(Reply::Suspended)`: the caller is off the CPU
    /// - `Err(Error::Syscall(e))`: `e.code()` goes to the caller's x0
    /// - `Err(Error::Terminated)`: the caller no longer exists
    pub(crate) fn dispatch(&mut self, caller: usize, call: Syscall) -> SysResult<Reply> {
        match call {
            Syscall::Cputs { buf, len } => self.sys_cputs(caller, buf, len),
            Syscall::Cgetc => self.sys_cgetc(),
            Syscall::GetEnvId => self.sys_getenvid(caller),
            Syscall::EnvDestroy { env } => self.sys_env_destroy(caller, env),
            Syscall::PageAlloc { env, va, perm } => self.sys_page_alloc(caller, env, va, perm),
            Syscall::PageMap {
                src_env,
                src_va,
                dst_env,
                dst_va,
                perm,
            } => self.sys_page_map(caller, src_env, src_va, dst_env, dst_va, perm),
            Syscall::PageUnmap { env, va } => self.sys_page_unmap(caller, env, va),
            Syscall::Exofork => self.sys_exofork(caller),
            Syscall::EnvSetStatus { env, status } => self.sys_env_set_status(caller, env, status),
            Syscall::EnvSetTrapframe { env, frame } => {
                self.sys_env_set_trapframe(caller, env, frame)
            }
            Syscall::EnvSetPgfaultUpcall { env, func } => {
                self.sys_env_set_pgfault_upcall(caller, env, func)
            }
            Syscall::Yield => self.sys_yield(caller),
            Syscall::IpcTrySend {
                env,
                value,
                src_va,
                perm,
            } => self.sys_ipc_try_send(caller, env, value, src_va, perm),
            Syscall::IpcRecv { dst_va } => self.sys_ipc_recv(caller, dst_va),
            Syscall::TimeMsec => self.sys_time_msec(),
            Syscall::NetSend { buf, len } => self.sys_net_send(caller, buf, len),
            Syscall::NetRecv { buf } => self.sys_net_recv(caller, buf),
            Syscall::EnvSetPriority { env, priority } => {
                self.sys_env_set_priority(caller, env, priority)
            }
            Syscall::FlexscRegister { va } => self.sys_flexsc_register(caller, va),
            Syscall::FlexscWait => self.sys_flexsc_wait(caller),
        }
    }
}
