//! System Call Interface
//!
//! The single entry point from user space into the kernel.
//!
//! # Security Model
//! - Whitelist approach: only numbers in [`abi::numbers`] decode; anything
//!   else returns `Inval`
//! - Every environment id goes through [`crate::cap::resolve`]
//! - Every caller-supplied buffer is checked against the caller's page
//!   tables before it is touched; failing that check destroys the caller
//! - Handlers validate everything before they mutate anything

pub mod abi;
mod device;
mod handler;
mod process;
mod validate;

pub use abi::{numbers, Syscall};
pub use validate::UserBuffer;

/// Successful outcome of a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Non-negative value for the caller's x0.
    Value(i32),
    /// The caller gave up the CPU. Its saved frame already holds what it
    /// will observe when it next runs.
    Suspended,
}
