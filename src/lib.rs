//! exokern - Syscall Core of a Small Exokernel
//!
//! The privileged gateway between user environments and the kernel: the
//! syscall dispatcher, the permission checks guarding every cross-domain
//! memory operation, rendezvous IPC and FlexSC batched syscalls.
//!
//! # Components
//! - [`syscall`]: ABI decoding, dispatch and user memory validation
//! - [`cap`]: environment id resolution and permission masks
//! - [`mm`]: page pool, address spaces and the mapping syscalls
//! - [`ipc`]: one-value, one-page rendezvous messaging
//! - [`flexsc`]: shared syscall pages serviced by worker environments
//! - [`env`], [`sched`]: the environment table and the scheduler
//! - [`drivers`]: the [`drivers::Platform`] seam to console, clock and NIC
//!
//! # Execution Model
//! Single core, cooperative. A syscall runs to completion; it can only
//! give up the CPU by blocking in receive, waiting on FlexSC, yielding or
//! destroying its caller. [`Kernel::handle_trap`] is the trap glue: it
//! reads the syscall from the current environment's saved registers and
//! writes the result back to x0.
//!
//! # Security Features
//! - Every check precedes every mutation, so a failed syscall has no
//!   effect
//! - A bad user buffer destroys the environment that passed it
//! - Pages are reference counted across every address space mapping them

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod cap;
pub mod config;
pub mod drivers;
pub mod env;
pub mod error;
pub mod flexsc;
pub mod ipc;
pub mod kernel;
pub mod mm;
pub mod sched;
pub mod syscall;

pub use config::{ConfigError, KernelConfig};
pub use env::{EnvId, EnvKind, EnvStatus};
pub use error::{Error, SysResult, SyscallError, Terminated};
pub use kernel::{global, Kernel};
pub use syscall::{numbers, Reply, Syscall};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
