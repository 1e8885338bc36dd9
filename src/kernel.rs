//! Kernel State
//!
//! One [`Kernel`] owns every pool the syscall layer works on: physical
//! pages, the environment table, FlexSC syscall pages and the platform
//! devices. Syscall handlers are `impl Kernel` blocks in their own
//! modules; this file holds construction, environment lifecycle and the
//! trap entry.

use alloc::boxed::Box;

use log::{debug, error, trace};

use crate::config::{ConfigError, KernelConfig};
use crate::drivers::Platform;
use crate::env::{Env, EnvId, EnvKind, EnvStatus, EnvTable};
use crate::error::{Error, SysResult, SyscallError};
use crate::flexsc::ScPagePool;
use crate::mm::{PagePool, VirtAddr};
use crate::syscall::{Reply, Syscall};

pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) pages: PagePool,
    pub(crate) envs: EnvTable,
    pub(crate) scpages: ScPagePool,
    /// Slot of the environment on the CPU.
    pub(crate) current: Option<usize>,
    pub(crate) platform: Box<dyn Platform>,
}

impl Kernel {
    /// Build a kernel with empty pools.
    pub fn new(config: KernelConfig, platform: impl Platform + 'static) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            "kernel: {} envs, {} pages, {} syscall pages",
            config.max_envs, config.max_pages, config.syscall_pages
        );
        Ok(Self {
            config,
            pages: PagePool::new(config.max_pages),
            envs: EnvTable::new(config.max_envs),
            scpages: ScPagePool::new(config.syscall_pages),
            current: None,
            platform: Box::new(platform),
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn pages(&self) -> &PagePool {
        &self.pages
    }

    pub fn scpages(&self) -> &ScPagePool {
        &self.scpages
    }

    /// Environment currently on the CPU.
    pub fn current(&self) -> Option<EnvId> {
        self.current.and_then(|index| self.envs.get(index)).map(|env| env.id)
    }

    /// Live environment named by `id`.
    pub fn env(&self, id: EnvId) -> Option<&Env> {
        self.envs.lookup(id).and_then(|index| self.envs.get(index))
    }

    /// Create a runnable root environment with an empty address space.
    pub fn env_create(&mut self) -> Result<EnvId, SyscallError> {
        let index = self.envs.alloc(&mut self.pages, EnvId::CURRENT)?;
        Ok(self.envs.slot(index)?.id)
    }

    /// Put a runnable environment on the CPU.
    pub fn env_run(&mut self, id: EnvId) -> Result<(), SyscallError> {
        let index = self.envs.lookup(id).ok_or(SyscallError::BadEnv)?;
        if self.envs.slot(index)?.status != EnvStatus::Runnable {
            return Err(SyscallError::Inval);
        }
        self.switch_to(index);
        Ok(())
    }

    /// Destroy an environment, and its worker if it has one.
    pub fn env_destroy(&mut self, id: EnvId) -> Result<(), SyscallError> {
        let index = self.envs.lookup(id).ok_or(SyscallError::BadEnv)?;
        self.destroy_env(index);
        Ok(())
    }

    pub(crate) fn switch_to(&mut self, index: usize) {
        if let Some(env) = self.envs.get_mut(index) {
            env.runs = env.runs.wrapping_add(1);
            trace!("switch to {}", env.id);
            self.current = Some(index);
        }
    }

    /// Tear down the environment in `index`. If that leaves the CPU
    /// without an environment, pick the next one.
    pub(crate) fn destroy_env(&mut self, index: usize) {
        self.teardown(index);
        self.check_links();
        if self.current.is_none() {
            self.schedule();
        }
    }

    fn teardown(&mut self, index: usize) {
        let Some(env) = self.envs.get_mut(index) else {
            return;
        };
        env.status = EnvStatus::Dying;
        let (id, kind, link, scpage) = (env.id, env.kind, env.link, env.scpage);

        match kind {
            // The worker shares the process's pages; it goes first.
            EnvKind::Normal => {
                if let Some(worker) = link {
                    if self.envs.get(worker.index()).map(|w| w.id) == Some(worker) {
                        self.teardown(worker.index());
                    }
                }
            }
            EnvKind::FlexWorker => {
                if let Some(process) = self.envs.unlink(index) {
                    self.cancel_parked_recv(process);
                }
                if let Some(handle) = scpage {
                    self.scpages.release(&mut self.pages, handle);
                }
                debug!("flexsc worker {} stopped", id);
            }
        }

        self.envs.unlink(index);
        self.envs.free(&mut self.pages, index);
        if self.current == Some(index) {
            self.current = None;
        }
        debug!("[{}] destroyed", id);
    }

    pub(crate) fn check_links(&self) {
        let result = self.envs.verify_links();
        if let Err(violation) = result {
            error!("link invariant violated: {}", violation);
        }
        debug_assert!(result.is_ok(), "link invariant violated");
    }

    /// Decode and run one syscall on behalf of `caller`.
    pub(crate) fn invoke(&mut self, caller: usize, num: u32, args: [u32; 5]) -> SysResult<Reply> {
        match Syscall::decode(num, args) {
            Some(call) => self.dispatch(caller, call),
            None => {
                debug!("unknown syscall {}", num);
                Err(SyscallError::Inval.into())
            }
        }
    }

    /// Service the syscall held in the current environment's registers.
    ///
    /// The result lands in the caller's x0 unless the caller gave up the
    /// CPU (its frame already holds what it will observe) or was
    /// destroyed. Returns the environment to resume.
    pub fn handle_trap(&mut self) -> Option<EnvId> {
        let caller = self.current?;
        let (num, args) = self.envs.get(caller)?.frame.syscall_args();

        let result = self.invoke(caller, num, args);
        let value = match result {
            Ok(Reply::Value(value)) => Some(value),
            Err(Error::Syscall(err)) => Some(err.code()),
            Ok(Reply::Suspended) | Err(Error::Terminated) => None,
        };
        if let (Some(value), Some(env)) = (value, self.envs.get_mut(caller)) {
            env.frame.set_return(value);
        }
        self.current()
    }

    /// Issue a syscall as the current environment would: load the
    /// registers, trap, and read back x0.
    ///
    /// Returns `None` if there is no current environment or the caller
    /// was destroyed by the call.
    pub fn syscall(&mut self, num: u32, args: [u32; 5]) -> Option<i32> {
        let caller = self.current?;
        let id = self.envs.get_mut(caller).map(|env| {
            env.frame.set_syscall(num, args);
            env.id
        })?;
        self.handle_trap();
        match self.envs.get(caller) {
            Some(env) if env.id == id => Some(env.frame.return_value()),
            _ => None,
        }
    }

    /// Kernel-mode write into an environment's memory. Only presence is
    /// checked, as for a loader.
    pub fn copy_to_user(&mut self, id: EnvId, va: VirtAddr, data: &[u8]) -> Result<(), SyscallError> {
        let index = self.envs.lookup(id).ok_or(SyscallError::BadEnv)?;
        let env = self.envs.slot(index)?;
        env.space
            .write(&mut self.pages, va, data)
            .map_err(|_| SyscallError::Inval)
    }

    /// Kernel-mode read from an environment's memory.
    pub fn copy_from_user(&self, id: EnvId, va: VirtAddr, out: &mut [u8]) -> Result<(), SyscallError> {
        let env = self.env(id).ok_or(SyscallError::BadEnv)?;
        env.space.read(&self.pages, va, out).map_err(|_| SyscallError::Inval)
    }
}

/// The kernel instance trap entry works on.
pub mod global {
    use spin::Mutex;

    use super::Kernel;
    use crate::env::EnvId;

    static KERNEL: Mutex<Option<Kernel>> = Mutex::new(None);

    /// Install the kernel, returning the one it replaces.
    pub fn install(kernel: Kernel) -> Option<Kernel> {
        KERNEL.lock().replace(kernel)
    }

    /// Remove the installed kernel.
    pub fn take() -> Option<Kernel> {
        KERNEL.lock().take()
    }

    /// Run `f` against the installed kernel, if any.
    pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
        KERNEL.lock().as_mut().map(f)
    }

    /// Synchronous exception entry for a syscall from EL0.
    pub fn handle_trap() -> Option<EnvId> {
        with_kernel(Kernel::handle_trap).flatten()
    }
}
