//! Capability and Permission Checks
//!
//! The single trust boundary between environments. Two questions are
//! answered here before any syscall mutates state:
//! - may the caller act on the environment it named?
//! - is the permission mask it supplied legal?
//!
//! # Security Properties
//! - Unknown, stale or foreign ids fail with `BadEnv`
//! - Permission masks outside the syscall set fail with `Inval`
//! - Write access can never be granted over a read-only source

pub mod envcheck;
pub mod perm;

pub use envcheck::{resolve, Access};
pub use perm::{check_grant, check_perm};
