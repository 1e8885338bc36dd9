//! Shared test infrastructure for integration tests.
//!
//! [`TestKernel`] wraps a hosted [`Kernel`] on a [`LoopbackPlatform`] and
//! issues syscalls through the same register path a trap takes.

#![allow(dead_code)]

use exokern::drivers::LoopbackPlatform;
use exokern::flexsc::{SyscallEntry, ENTRY_SIZE};
use exokern::mm::{PteFlags, VirtAddr};
use exokern::{EnvId, Kernel, KernelConfig, Syscall};

/// Read-write user permission bits as passed to mapping syscalls.
pub const RW: u32 = PteFlags::USER_RW.bits();
/// Read-only user permission bits.
pub const RO: u32 = PteFlags::REQUIRED.bits();

pub struct TestKernel {
    pub kernel: Kernel,
    pub platform: LoopbackPlatform,
}

impl Default for TestKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl TestKernel {
    /// Sixteen environments and a quarter megabyte of frames.
    pub fn new() -> Self {
        Self::with_config(KernelConfig {
            max_envs: 16,
            max_pages: 256,
            ..KernelConfig::default()
        })
    }

    pub fn with_config(config: KernelConfig) -> Self {
        let platform = LoopbackPlatform::new();
        let kernel = Kernel::new(config, platform.clone()).unwrap();
        Self { kernel, platform }
    }

    /// Create a runnable root environment.
    pub fn spawn(&mut self) -> EnvId {
        self.kernel.env_create().unwrap()
    }

    /// Issue `call` as the current environment.
    pub fn call(&mut self, call: Syscall) -> Option<i32> {
        let (num, args) = call.encode();
        self.kernel.syscall(num, args)
    }

    /// Put `id` on the CPU and issue `call` as it.
    pub fn call_as(&mut self, id: EnvId, call: Syscall) -> Option<i32> {
        self.kernel.env_run(id).unwrap();
        self.call(call)
    }

    /// Map a fresh page at `va` in `id`, as `id`.
    pub fn alloc(&mut self, id: EnvId, va: usize, perm: u32) {
        let call = Syscall::PageAlloc {
            env: EnvId::CURRENT,
            va: VirtAddr::new(va),
            perm,
        };
        assert_eq!(self.call_as(id, call), Some(0));
    }

    pub fn write(&mut self, id: EnvId, va: usize, data: &[u8]) {
        self.kernel.copy_to_user(id, VirtAddr::new(va), data).unwrap();
    }

    pub fn read(&self, id: EnvId, va: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        self.kernel.copy_from_user(id, VirtAddr::new(va), &mut out).unwrap();
        out
    }

    /// Frame and flags mapped at `va` in `id`.
    pub fn mapping(&self, id: EnvId, va: usize) -> Option<(exokern::mm::PhysAddr, PteFlags)> {
        self.kernel.env(id)?.space.lookup(VirtAddr::new(va))
    }

    /// Write a SUBMITTED entry into slot `slot` of the syscall page at
    /// `page` in `id`.
    pub fn submit(&mut self, id: EnvId, page: usize, slot: usize, call: Syscall) {
        let entry = SyscallEntry::submitted(call);
        self.write(id, page + SyscallEntry::offset(slot), &entry.to_bytes());
    }

    pub fn entry(&self, id: EnvId, page: usize, slot: usize) -> SyscallEntry {
        let bytes = self.read(id, page + SyscallEntry::offset(slot), ENTRY_SIZE);
        SyscallEntry::from_bytes(&bytes)
    }
}
