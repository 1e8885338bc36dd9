//! Environments
//!
//! An environment is a protection domain: a user process or a FlexSC
//! worker serving one. Each owns an address space, a saved trap frame and
//! its IPC receive state.
//!
//! # Identity
//! Ids are `generation << ENV_GEN_SHIFT | slot`. A slot's generation is
//! bumped on every reuse so stale ids never resolve to a new occupant.
//! Id 0 is reserved to mean "the calling environment".

mod table;
mod trapframe;

use core::fmt;

pub use table::{EnvTable, LinkViolation};
pub use trapframe::{TrapFrame, TRAPFRAME_SIZE};

use crate::flexsc::ScPageHandle;
use crate::mm::{AddressSpace, PteFlags, VirtAddr};

/// Bits of an id holding the slot index.
pub const ENV_GEN_SHIFT: u32 = 12;

/// Highest scheduling priority.
pub const PRIORITY_HIGHEST: u32 = 0;
/// Lowest scheduling priority.
pub const PRIORITY_LOWEST: u32 = 7;
/// Priority given to new environments.
pub const PRIORITY_DEFAULT: u32 = 4;

/// Environment identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct EnvId(i32);

impl EnvId {
    /// Alias for the calling environment.
    pub const CURRENT: Self = Self(0);

    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Slot index encoded in the id.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0 as u32 & ((1 << ENV_GEN_SHIFT) - 1)) as usize
    }
}

impl fmt::Debug for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvId({:08x})", self.0)
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Scheduling state. Values match the user-visible ABI.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Free = 0,
    /// Being torn down; no longer resolvable or schedulable.
    Dying = 1,
    Runnable = 2,
    NotRunnable = 4,
}

impl EnvStatus {
    /// Decode a status passed to `env_set_status`.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Free),
            1 => Some(Self::Dying),
            2 => Some(Self::Runnable),
            4 => Some(Self::NotRunnable),
            _ => None,
        }
    }
}

/// What an environment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    Normal,
    /// Polls a syscall page on behalf of its linked process.
    FlexWorker,
}

/// Rendezvous IPC state of a receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpcState {
    /// Blocked in receive and accepting one message.
    pub recving: bool,
    /// The receive was issued by this environment's FlexSC worker.
    pub parked: bool,
    /// Where an incoming page should be mapped, if one is wanted.
    pub dstva: Option<VirtAddr>,
    /// Last value received.
    pub value: u32,
    /// Sender of the last message.
    pub from: EnvId,
    /// Permissions of the page received with the last message; empty if
    /// none was transferred.
    pub perm: PteFlags,
}

/// A protection domain.
pub struct Env {
    pub id: EnvId,
    pub parent: EnvId,
    pub status: EnvStatus,
    pub kind: EnvKind,
    pub frame: TrapFrame,
    pub space: AddressSpace,
    pub pgfault_upcall: usize,
    pub priority: u32,
    pub ipc: IpcState,
    /// Partner in a FlexSC pair. Symmetric whenever set.
    pub link: Option<EnvId>,
    /// Syscall page shared by the pair.
    pub scpage: Option<ScPageHandle>,
    /// Times this environment has been switched to.
    pub runs: u32,
}

impl Env {
    /// Whether the environment can be named by id.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self.status, EnvStatus::Runnable | EnvStatus::NotRunnable)
    }

    /// The id a process observes for itself. A worker reports its
    /// partner's id so batched calls behave as if the partner made them.
    pub fn effective_id(&self) -> EnvId {
        match (self.kind, self.link) {
            (EnvKind::FlexWorker, Some(partner)) => partner,
            _ => self.id,
        }
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("status", &self.status)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("link", &self.link)
            .finish()
    }
}
