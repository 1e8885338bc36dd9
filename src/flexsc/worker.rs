//! Worker Poll Loop
//!
//! A worker walks its syscall page cyclically. Each step looks at one
//! entry; a SUBMITTED entry is claimed, run on the worker's behalf and
//! completed. The loop never blocks. It runs in slices of
//! `KernelConfig::worker_slice` steps, after which the scheduler gets the
//! CPU back, so a worker with nothing to do cannot starve anyone.

use log::trace;

use super::page::{EntryStatus, SyscallEntry};
use super::pool::ScPageHandle;
use crate::env::{EnvId, EnvKind};
use crate::error::Error;
use crate::kernel::Kernel;
use crate::syscall::Reply;

impl Kernel {
    /// Run one slice of the current environment's poll loop, if it is a
    /// worker. Returns how many entries were serviced.
    ///
    /// The slice ends early if a serviced call takes the CPU away from
    /// the worker.
    pub fn run_worker(&mut self) -> usize {
        let Some(index) = self.current else {
            return 0;
        };
        let (id, handle) = match self.envs.get(index) {
            Some(env) if env.kind == EnvKind::FlexWorker => match env.scpage {
                Some(handle) => (env.id, handle),
                None => return 0,
            },
            _ => return 0,
        };

        let mut serviced = 0;
        for _ in 0..self.config.worker_slice {
            if self.poll_entry(index, handle) {
                serviced += 1;
            }
            if self.current() != Some(id) {
                return serviced;
            }
        }
        trace!("worker {} serviced {} entries", id, serviced);
        self.schedule();
        serviced
    }

    /// Examine the next entry. Returns whether it was SUBMITTED.
    fn poll_entry(&mut self, worker: usize, handle: ScPageHandle) -> bool {
        let Some((frame, slot)) = self.scpages.next_slot(handle) else {
            return false;
        };
        let entry = SyscallEntry::load(self.pages.bytes(frame), slot);
        if entry.status() != Some(EntryStatus::Submitted) {
            return false;
        }
        SyscallEntry::store_status(self.pages.bytes_mut(frame), slot, EntryStatus::Submitted.next());

        let ret = match self.invoke(worker, entry.num, entry.args) {
            Ok(Reply::Value(value)) => value,
            Ok(Reply::Suspended) => 0,
            Err(Error::Syscall(err)) => err.code(),
            // The worker is gone and the page may be too.
            Err(Error::Terminated) => return true,
        };
        SyscallEntry::store_result(self.pages.bytes_mut(frame), slot, ret);
        true
    }

    /// Keep the CPU busy until a NORMAL environment is chosen, running
    /// worker slices as workers come up. Gives up after `budget` slices.
    ///
    /// Returns the environment to enter, or `None` if the CPU went idle
    /// or the budget ran out.
    pub fn resume(&mut self, budget: usize) -> Option<EnvId> {
        for _ in 0..budget {
            if self.current.is_none() && self.schedule().is_none() {
                return None;
            }
            let env = self.current.and_then(|index| self.envs.get(index))?;
            if env.kind == EnvKind::Normal {
                return Some(env.id);
            }
            self.run_worker();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::config::KernelConfig;
    use crate::drivers::LoopbackPlatform;
    use crate::env::{EnvId, EnvStatus};
    use crate::error::SyscallError;
    use crate::flexsc::{EntryStatus, SyscallEntry, ENTRY_SIZE, SYSCALL_ENTRIES};
    use crate::kernel::Kernel;
    use crate::mm::{PteFlags, VirtAddr};
    use crate::syscall::Syscall;

    const SCPAGE: VirtAddr = VirtAddr::new(0x40_0000);

    fn call(k: &mut Kernel, call: Syscall) -> Option<i32> {
        let (num, args) = call.encode();
        k.syscall(num, args)
    }

    fn registered(worker_slice: usize) -> (Kernel, EnvId, EnvId) {
        let config = KernelConfig {
            max_envs: 8,
            max_pages: 64,
            worker_slice,
            ..KernelConfig::default()
        };
        let mut k = Kernel::new(config, LoopbackPlatform::new()).unwrap();
        let me = k.env_create().unwrap();
        k.env_run(me).unwrap();
        let perm = PteFlags::USER_RW.bits();
        assert_eq!(call(&mut k, Syscall::PageAlloc { env: me, va: SCPAGE, perm }), Some(0));
        assert_eq!(call(&mut k, Syscall::FlexscRegister { va: SCPAGE }), Some(0));
        let worker = k.env(me).unwrap().link.unwrap();
        (k, me, worker)
    }

    fn submit(k: &mut Kernel, id: EnvId, slot: usize, call: Syscall) {
        let entry = SyscallEntry::submitted(call);
        let va = VirtAddr::new(SCPAGE.as_usize() + SyscallEntry::offset(slot));
        k.copy_to_user(id, va, &entry.to_bytes()).unwrap();
    }

    fn entry(k: &Kernel, id: EnvId, slot: usize) -> SyscallEntry {
        let mut bytes = [0u8; ENTRY_SIZE];
        let va = VirtAddr::new(SCPAGE.as_usize() + SyscallEntry::offset(slot));
        k.copy_from_user(id, va, &mut bytes).unwrap();
        SyscallEntry::from_bytes(&bytes)
    }

    #[test]
    fn test_slice_services_submitted_entries() {
        let (mut k, me, worker) = registered(SYSCALL_ENTRIES);
        submit(&mut k, me, 0, Syscall::GetEnvId);
        submit(&mut k, me, 5, Syscall::EnvSetPriority { env: EnvId::CURRENT, priority: 99 });

        k.env_run(worker).unwrap();
        assert_eq!(k.run_worker(), 2);

        let first = entry(&k, me, 0);
        assert_eq!(first.status(), Some(EntryStatus::Done));
        // batched calls act as the process
        assert_eq!(first.ret, me.as_i32());
        let second = entry(&k, me, 5);
        assert_eq!(second.status(), Some(EntryStatus::Done));
        assert_eq!(second.ret, SyscallError::Inval.code());
        assert_eq!(entry(&k, me, 1).status(), Some(EntryStatus::Free));
    }

    #[test]
    fn test_done_entries_are_not_rerun() {
        let (mut k, me, worker) = registered(SYSCALL_ENTRIES);
        submit(&mut k, me, 0, Syscall::GetEnvId);
        k.env_run(worker).unwrap();
        assert_eq!(k.run_worker(), 1);

        k.env_run(worker).unwrap();
        assert_eq!(k.run_worker(), 0);
        assert_eq!(entry(&k, me, 0).status(), Some(EntryStatus::Done));
    }

    #[test]
    fn test_slice_is_bounded_and_cursor_persists() {
        let (mut k, me, worker) = registered(4);
        submit(&mut k, me, 6, Syscall::GetEnvId);

        k.env_run(worker).unwrap();
        assert_eq!(k.run_worker(), 0);
        assert_eq!(entry(&k, me, 6).status(), Some(EntryStatus::Submitted));

        k.env_run(worker).unwrap();
        assert_eq!(k.run_worker(), 1);
        assert_eq!(entry(&k, me, 6).status(), Some(EntryStatus::Done));
    }

    #[test]
    fn test_yield_from_worker_ends_slice() {
        let (mut k, me, worker) = registered(SYSCALL_ENTRIES);
        let other = k.env_create().unwrap();
        submit(&mut k, me, 0, Syscall::Yield);
        submit(&mut k, me, 1, Syscall::GetEnvId);

        k.env_run(worker).unwrap();
        assert_eq!(k.run_worker(), 1);
        assert_eq!(k.current(), Some(other));
        assert_eq!(entry(&k, me, 0).ret, 0);
        assert_eq!(entry(&k, me, 0).status(), Some(EntryStatus::Done));
        assert_eq!(entry(&k, me, 1).status(), Some(EntryStatus::Submitted));
    }

    #[test]
    fn test_fatal_call_stops_worker_without_completing() {
        let (mut k, me, worker) = registered(SYSCALL_ENTRIES);
        submit(&mut k, me, 0, Syscall::Cputs { buf: VirtAddr::new(0x90_0000), len: 8 });

        k.env_run(worker).unwrap();
        assert_eq!(k.run_worker(), 1);
        assert!(k.env(worker).is_none());
        assert_eq!(entry(&k, me, 0).status(), Some(EntryStatus::Busy));
        assert_eq!(k.env(me).unwrap().link, None);
    }

    #[test]
    fn test_recv_through_worker_blocks_process() {
        let (mut k, me, worker) = registered(SYSCALL_ENTRIES);
        submit(&mut k, me, 0, Syscall::IpcRecv { dst_va: VirtAddr::new(0x1000) });

        k.env_run(worker).unwrap();
        k.run_worker();
        let done = entry(&k, me, 0);
        assert_eq!(done.ret, SyscallError::Blocked.code());
        let process = k.env(me).unwrap();
        assert!(process.ipc.recving);
        assert_eq!(process.status, EnvStatus::NotRunnable);
    }

    #[test]
    fn test_destroying_worker_cancels_parked_recv() {
        let (mut k, me, worker) = registered(SYSCALL_ENTRIES);
        let sender = k.env_create().unwrap();
        submit(&mut k, me, 0, Syscall::IpcRecv { dst_va: VirtAddr::new(0x1000) });
        k.env_run(worker).unwrap();
        k.run_worker();
        assert!(k.env(me).unwrap().ipc.parked);

        k.env_destroy(worker).unwrap();
        let process = k.env(me).unwrap();
        assert!(!process.ipc.recving);
        assert!(!process.ipc.parked);
        assert_eq!(process.link, None);
        assert_eq!(process.status, EnvStatus::Runnable);
        assert_eq!(process.frame.return_value(), SyscallError::BadEnv.code());

        k.env_run(sender).unwrap();
        let send = Syscall::IpcTrySend { env: me, value: 1, src_va: VirtAddr::new(0), perm: 0 };
        assert_eq!(call(&mut k, send), Some(SyscallError::IpcNotRecv.code()));
    }

    #[test]
    fn test_resume_runs_worker_until_process_is_picked() {
        let (mut k, me, _) = registered(8);
        submit(&mut k, me, 0, Syscall::TimeMsec);

        // a runnable process is entered directly
        k.current = None;
        let first = k.schedule();
        assert_eq!(first, Some(me));
        assert_eq!(k.resume(4), Some(me));
        assert_eq!(entry(&k, me, 0).status(), Some(EntryStatus::Submitted));

        k.envs.get_mut(me.index()).unwrap().status = EnvStatus::NotRunnable;
        k.current = None;
        assert_eq!(k.resume(4), None);
        assert_eq!(entry(&k, me, 0).status(), Some(EntryStatus::Done));
    }

    #[test]
    fn test_run_worker_ignores_normal_env() {
        let (mut k, me, _) = registered(8);
        assert_eq!(k.current(), Some(me));
        assert_eq!(k.run_worker(), 0);
        assert_eq!(k.current(), Some(me));
    }
}
