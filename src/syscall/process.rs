//! Environment management syscalls: identity, creation, destruction,
//! status, registers, upcalls, priority and yielding.

use log::debug;

use crate::cap::{resolve, Access};
use crate::env::{EnvId, EnvStatus, TrapFrame, PRIORITY_HIGHEST, PRIORITY_LOWEST, TRAPFRAME_SIZE};
use crate::error::{Error, SysResult, SyscallError};
use crate::kernel::Kernel;
use crate::mm::VirtAddr;

use super::Reply;

impl Kernel {
    /// The caller's id; a FlexSC worker answers with its partner's.
    pub(super) fn sys_getenvid(&mut self, caller: usize) -> SysResult<Reply> {
        let env = self.envs.slot(caller)?;
        Ok(Reply::Value(env.effective_id().as_i32()))
    }

    /// Destroy an environment (possibly the caller).
    ///
    /// Errors: `BadEnv` if `id` doesn't name a live environment the
    /// caller may act on.
    pub(super) fn sys_env_destroy(&mut self, caller: usize, id: EnvId) -> SysResult<Reply> {
        let target = resolve(&self.envs, caller, id, Access::Privileged)?;
        let caller_id = self.envs.slot(caller)?.id;
        debug!(
            "[{}] destroying {}",
            caller_id,
            self.envs.slot(target)?.id
        );

        self.destroy_env(target);

        match self.envs.get(caller) {
            Some(env) if env.id == caller_id => Ok(Reply::Value(0)),
            _ => Err(Error::Terminated),
        }
    }

    /// Give up the CPU. The caller sees 0 when it runs again.
    pub(super) fn sys_yield(&mut self, caller: usize) -> SysResult<Reply> {
        self.envs.slot_mut(caller)?.frame.set_return(0);
        self.schedule();
        Ok(Reply::Suspended)
    }

    /// Create a child with the caller's registers and an empty address
    /// space. The child is NOT_RUNNABLE and sees 0 from this call once
    /// started; the parent gets the child's id.
    ///
    /// Errors: `NoFreeEnv`, `NoMem`.
    pub(super) fn sys_exofork(&mut self, caller: usize) -> SysResult<Reply> {
        let (parent_id, frame) = {
            let parent = self.envs.slot(caller)?;
            (parent.id, parent.frame)
        };
        let child = self.envs.alloc(&mut self.pages, parent_id)?;
        let env = self.envs.slot_mut(child)?;
        env.status = EnvStatus::NotRunnable;
        env.frame = frame;
        env.frame.set_return(0);
        Ok(Reply::Value(env.id.as_i32()))
    }

    /// Errors: `Inval` unless `status` is RUNNABLE or NOT_RUNNABLE,
    /// `BadEnv`.
    pub(super) fn sys_env_set_status(&mut self, caller: usize, id: EnvId, status: u32) -> SysResult<Reply> {
        let status = match EnvStatus::from_raw(status) {
            Some(status @ (EnvStatus::Runnable | EnvStatus::NotRunnable)) => status,
            _ => return Err(SyscallError::Inval.into()),
        };
        let target = resolve(&self.envs, caller, id, Access::Privileged)?;
        self.envs.slot_mut(target)?.status = status;
        Ok(Reply::Value(0))
    }

    /// Replace an environment's registers with a frame read from the
    /// caller's memory. The installed frame always returns to EL0 with
    /// IRQs enabled.
    pub(super) fn sys_env_set_trapframe(&mut self, caller: usize, id: EnvId, va: VirtAddr) -> SysResult<Reply> {
        let buf = self.copy_in(caller, va, TRAPFRAME_SIZE)?;
        let target = resolve(&self.envs, caller, id, Access::Privileged)?;

        let mut image = [0u8; TRAPFRAME_SIZE];
        image.copy_from_slice(buf.as_bytes());
        let mut frame = TrapFrame::from_bytes(&image);
        frame.sanitize_for_user();
        self.envs.slot_mut(target)?.frame = frame;
        Ok(Reply::Value(0))
    }

    /// Record where `id` enters user mode after a page fault.
    pub(super) fn sys_env_set_pgfault_upcall(&mut self, caller: usize, id: EnvId, func: usize) -> SysResult<Reply> {
        let target = resolve(&self.envs, caller, id, Access::Privileged)?;
        self.envs.slot_mut(target)?.pgfault_upcall = func;
        Ok(Reply::Value(0))
    }

    /// Errors: `Inval` outside `[PRIORITY_HIGHEST, PRIORITY_LOWEST]`,
    /// `BadEnv`.
    pub(super) fn sys_env_set_priority(&mut self, caller: usize, id: EnvId, priority: u32) -> SysResult<Reply> {
        if !(PRIORITY_HIGHEST..=PRIORITY_LOWEST).contains(&priority) {
            return Err(SyscallError::Inval.into());
        }
        let target = resolve(&self.envs, caller, id, Access::Privileged)?;
        self.envs.slot_mut(target)?.priority = priority;
        Ok(Reply::Value(0))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::KernelConfig;
    use crate::drivers::LoopbackPlatform;
    use crate::env::{EnvId, EnvStatus, TrapFrame};
    use crate::error::SyscallError;
    use crate::kernel::Kernel;
    use crate::mm::{PteFlags, VirtAddr};
    use crate::syscall::Syscall;

    fn call(k: &mut Kernel, call: Syscall) -> Option<i32> {
        let (num, args) = call.encode();
        k.syscall(num, args)
    }

    fn setup() -> (Kernel, EnvId) {
        let mut k = Kernel::new(KernelConfig::default(), LoopbackPlatform::new()).unwrap();
        let id = k.env_create().unwrap();
        k.env_run(id).unwrap();
        (k, id)
    }

    #[test]
    fn test_exofork_child_state() {
        let (mut k, parent) = setup();
        let child = call(&mut k, Syscall::Exofork).unwrap();
        assert!(child > 0);

        let child = k.env(EnvId::new(child)).unwrap();
        assert_eq!(child.status, EnvStatus::NotRunnable);
        assert_eq!(child.parent, parent);
        assert_eq!(child.frame.return_value(), 0);
        assert_eq!(child.frame.syscall_args().0, crate::syscall::numbers::SYS_EXOFORK);
    }

    #[test]
    fn test_set_status_validates_value_first() {
        let (mut k, _) = setup();
        // bad status beats bad id
        assert_eq!(
            call(&mut k, Syscall::EnvSetStatus { env: EnvId::new(12345), status: 3 }),
            Some(SyscallError::Inval.code())
        );
        assert_eq!(
            call(&mut k, Syscall::EnvSetStatus { env: EnvId::new(12345), status: 2 }),
            Some(SyscallError::BadEnv.code())
        );
        let child = EnvId::new(call(&mut k, Syscall::Exofork).unwrap());
        assert_eq!(call(&mut k, Syscall::EnvSetStatus { env: child, status: 2 }), Some(0));
        assert_eq!(k.env(child).unwrap().status, EnvStatus::Runnable);
    }

    #[test]
    fn test_set_priority_range() {
        let (mut k, me) = setup();
        let child = EnvId::new(call(&mut k, Syscall::Exofork).unwrap());

        for priority in [8, u32::MAX] {
            assert_eq!(
                call(&mut k, Syscall::EnvSetPriority { env: child, priority }),
                Some(SyscallError::Inval.code())
            );
        }
        assert_eq!(call(&mut k, Syscall::EnvSetPriority { env: child, priority: 0 }), Some(0));
        assert_eq!(k.env(child).unwrap().priority, 0);
        assert_eq!(k.env(me).unwrap().priority, crate::env::PRIORITY_DEFAULT);
    }

    #[test]
    fn test_set_trapframe_sanitizes() {
        let (mut k, me) = setup();
        let child = EnvId::new(call(&mut k, Syscall::Exofork).unwrap());
        let perm = PteFlags::USER_RW.bits();
        let va = VirtAddr::new(0x4000);
        assert_eq!(call(&mut k, Syscall::PageAlloc { env: me, va, perm }), Some(0));

        let mut frame = TrapFrame::user(0x0080_0000, 0x5000);
        frame.spsr = 0x3C5;
        k.copy_to_user(me, va, &frame.to_bytes()).unwrap();

        assert_eq!(call(&mut k, Syscall::EnvSetTrapframe { env: child, frame: va }), Some(0));
        let installed = k.env(child).unwrap().frame;
        assert_eq!(installed.elr, 0x0080_0000);
        assert_eq!(installed.sp, 0x5000);
        assert_eq!(installed.spsr, 0x340);
    }

    #[test]
    fn test_set_trapframe_bad_pointer_is_fatal() {
        let (mut k, me) = setup();
        assert_eq!(
            call(&mut k, Syscall::EnvSetTrapframe { env: me, frame: VirtAddr::new(0x9000) }),
            None
        );
        assert!(k.env(me).is_none());
    }

    #[test]
    fn test_destroy_self_and_other() {
        let (mut k, me) = setup();
        let child = EnvId::new(call(&mut k, Syscall::Exofork).unwrap());
        assert_eq!(call(&mut k, Syscall::EnvDestroy { env: child }), Some(0));
        assert!(k.env(child).is_none());
        assert_eq!(
            call(&mut k, Syscall::EnvDestroy { env: child }),
            Some(SyscallError::BadEnv.code())
        );

        assert_eq!(call(&mut k, Syscall::EnvDestroy { env: EnvId::CURRENT }), None);
        assert!(k.env(me).is_none());
        assert_eq!(k.current(), None);
    }

    #[test]
    fn test_yield_switches() {
        let (mut k, me) = setup();
        let other = k.env_create().unwrap();
        assert_eq!(call(&mut k, Syscall::Yield), Some(0));
        assert_eq!(k.current(), Some(other));
        assert!(k.env(me).is_some());
    }

    #[test]
    fn test_pgfault_upcall() {
        let (mut k, me) = setup();
        assert_eq!(
            call(&mut k, Syscall::EnvSetPgfaultUpcall { env: me, func: 0x80_1234 }),
            Some(0)
        );
        assert_eq!(k.env(me).unwrap().pgfault_upcall, 0x80_1234);
    }
}
