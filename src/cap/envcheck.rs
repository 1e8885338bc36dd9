//! Environment Id Resolution
//!
//! Every syscall that names an environment resolves the id here. Id 0
//! names the caller. A privileged operation may only target the caller
//! itself, one of its children, or its FlexSC partner.

use crate::env::{EnvId, EnvTable};
use crate::error::SyscallError;

/// How much authority an operation needs over its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Any live environment may be named (IPC send).
    Any,
    /// Caller must be the target, its parent or its partner.
    Privileged,
}

/// Resolve `id` on behalf of the environment in slot `caller`.
pub fn resolve(envs: &EnvTable, caller: usize, id: EnvId, access: Access) -> Result<usize, SyscallError> {
    if id == EnvId::CURRENT {
        return Ok(caller);
    }

    let target = envs.lookup(id).ok_or(SyscallError::BadEnv)?;
    if access == Access::Any || target == caller {
        return Ok(target);
    }

    let caller_env = envs.slot(caller)?;
    let target_env = envs.slot(target)?;
    if target_env.parent == caller_env.id || target_env.link == Some(caller_env.id) {
        Ok(target)
    } else {
        Err(SyscallError::BadEnv)
    }
}
