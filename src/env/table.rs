//! Environment Table
//!
//! Fixed arena of environment slots. Environments refer to each other
//! only by [`EnvId`], never by reference, so freeing one side of a
//! relation can leave at worst a stale id, which fails to resolve.

use alloc::vec::Vec;
use core::fmt;

use log::debug;

use super::{Env, EnvId, EnvKind, EnvStatus, IpcState, TrapFrame, ENV_GEN_SHIFT, PRIORITY_DEFAULT};
use crate::error::SyscallError;
use crate::mm::{AddressSpace, PagePool, USTACKTOP};

struct Slot {
    /// Id of the last occupant, used to derive the next generation.
    last_id: i32,
    env: Option<Env>,
}

/// A broken FlexSC link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkViolation {
    /// `env` links to an id that does not name a live environment.
    Dangling { env: EnvId, partner: EnvId },
    /// `env` links to `partner`, which does not link back.
    Asymmetric { env: EnvId, partner: EnvId },
    /// Both ends of a link have the same kind.
    SameKind { env: EnvId, partner: EnvId },
}

impl fmt::Display for LinkViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dangling { env, partner } => write!(f, "{} links to dead env {}", env, partner),
            Self::Asymmetric { env, partner } => {
                write!(f, "{} links to {} which does not link back", env, partner)
            }
            Self::SameKind { env, partner } => {
                write!(f, "{} and {} are linked but have the same kind", env, partner)
            }
        }
    }
}

pub struct EnvTable {
    slots: Vec<Slot>,
}

impl EnvTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            last_id: 0,
            env: None,
        });
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocate a RUNNABLE environment with an empty address space.
    ///
    /// Errors: `NoFreeEnv` if every slot is taken, `NoMem` if the page
    /// directory cannot be allocated.
    pub fn alloc(&mut self, pages: &mut PagePool, parent: EnvId) -> Result<usize, SyscallError> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.env.is_none())
            .ok_or(SyscallError::NoFreeEnv)?;
        let space = AddressSpace::new(pages)?;

        let slot = &mut self.slots[index];
        let mut generation = slot.last_id.wrapping_add(1 << ENV_GEN_SHIFT) & !((1 << ENV_GEN_SHIFT) - 1);
        if generation <= 0 {
            generation = 1 << ENV_GEN_SHIFT;
        }
        let id = EnvId::new(generation | index as i32);
        slot.last_id = id.as_i32();
        slot.env = Some(Env {
            id,
            parent,
            status: EnvStatus::Runnable,
            kind: EnvKind::Normal,
            frame: TrapFrame::user(0, USTACKTOP),
            space,
            pgfault_upcall: 0,
            priority: PRIORITY_DEFAULT,
            ipc: IpcState::default(),
            link: None,
            scpage: None,
            runs: 0,
        });

        debug!("[{}] new env {}", parent, id);
        Ok(index)
    }

    /// Slot of the live environment named by `id`.
    pub fn lookup(&self, id: EnvId) -> Option<usize> {
        match self.get(id.index()) {
            Some(env) if env.id == id && env.is_live() => Some(id.index()),
            _ => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Env> {
        self.slots.get(index).and_then(|slot| slot.env.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Env> {
        self.slots.get_mut(index).and_then(|slot| slot.env.as_mut())
    }

    /// Occupied slot, or `BadEnv`.
    pub fn slot(&self, index: usize) -> Result<&Env, SyscallError> {
        self.get(index).ok_or(SyscallError::BadEnv)
    }

    /// Occupied slot, or `BadEnv`.
    pub fn slot_mut(&mut self, index: usize) -> Result<&mut Env, SyscallError> {
        self.get_mut(index).ok_or(SyscallError::BadEnv)
    }

    /// Release a slot and every frame its address space holds.
    pub fn free(&mut self, pages: &mut PagePool, index: usize) {
        let Some(env) = self.slots.get_mut(index).and_then(|slot| slot.env.take()) else {
            return;
        };
        debug!("free env {}", env.id);
        env.space.destroy(pages);
    }

    /// Occupied slot indices in table order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.env.is_some())
            .map(|(index, _)| index)
    }

    /// Record `a` and `b` as partners.
    pub fn link(&mut self, a: usize, b: usize) -> Result<(), SyscallError> {
        let a_id = self.slot(a)?.id;
        let b_id = self.slot(b)?.id;
        self.slot_mut(a)?.link = Some(b_id);
        self.slot_mut(b)?.link = Some(a_id);
        Ok(())
    }

    /// Clear the partner's back-reference to `index`, returning the
    /// partner's slot if it was still present.
    pub fn unlink(&mut self, index: usize) -> Option<usize> {
        let env = self.get_mut(index)?;
        let partner = env.link.take()?;
        env.scpage = None;
        let id = env.id;

        let partner_index = partner.index();
        match self.get_mut(partner_index) {
            Some(other) if other.id == partner && other.link == Some(id) => {
                other.link = None;
                other.scpage = None;
                Some(partner_index)
            }
            _ => None,
        }
    }

    /// Check that every link is symmetric, names an occupied slot and
    /// joins a process to a worker.
    pub fn verify_links(&self) -> Result<(), LinkViolation> {
        for env in self.slots.iter().filter_map(|slot| slot.env.as_ref()) {
            let Some(partner) = env.link else {
                continue;
            };
            let other = match self.get(partner.index()) {
                Some(other) if other.id == partner => other,
                _ => {
                    return Err(LinkViolation::Dangling {
                        env: env.id,
                        partner,
                    })
                }
            };
            if other.link != Some(env.id) {
                return Err(LinkViolation::Asymmetric {
                    env: env.id,
                    partner,
                });
            }
            if other.kind == env.kind {
                return Err(LinkViolation::SameKind {
                    env: env.id,
                    partner,
                });
            }
        }
        Ok(())
    }
}
