//! System Call ABI
//!
//! Numbers and argument decoding. Every request decodes into exactly one
//! [`Syscall`] variant, so the dispatcher's `match` is checked for
//! exhaustiveness by the compiler.

use crate::env::EnvId;
use crate::mm::VirtAddr;

/// System call numbers
pub mod numbers {
    pub const SYS_CPUTS: u32 = 0;
    pub const SYS_CGETC: u32 = 1;
    pub const SYS_GETENVID: u32 = 2;
    pub const SYS_ENV_DESTROY: u32 = 3;
    pub const SYS_PAGE_ALLOC: u32 = 4;
    pub const SYS_PAGE_MAP: u32 = 5;
    pub const SYS_PAGE_UNMAP: u32 = 6;
    pub const SYS_EXOFORK: u32 = 7;
    pub const SYS_ENV_SET_STATUS: u32 = 8;
    pub const SYS_ENV_SET_TRAPFRAME: u32 = 9;
    pub const SYS_ENV_SET_PGFAULT_UPCALL: u32 = 10;
    pub const SYS_YIELD: u32 = 11;
    pub const SYS_IPC_TRY_SEND: u32 = 12;
    pub const SYS_IPC_RECV: u32 = 13;
    pub const SYS_TIME_MSEC: u32 = 14;
    pub const SYS_NET_SEND: u32 = 15;
    pub const SYS_NET_RECV: u32 = 16;
    pub const SYS_ENV_SET_PRIORITY: u32 = 17;
    pub const SYS_FLEXSC_REGISTER: u32 = 18;
    pub const SYS_FLEXSC_WAIT: u32 = 19;
}

/// A decoded system call request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Cputs { buf: VirtAddr, len: usize },
    Cgetc,
    GetEnvId,
    EnvDestroy { env: EnvId },
    PageAlloc { env: EnvId, va: VirtAddr, perm: u32 },
    PageMap { src_env: EnvId, src_va: VirtAddr, dst_env: EnvId, dst_va: VirtAddr, perm: u32 },
    PageUnmap { env: EnvId, va: VirtAddr },
    Exofork,
    EnvSetStatus { env: EnvId, status: u32 },
    EnvSetTrapframe { env: EnvId, frame: VirtAddr },
    EnvSetPgfaultUpcall { env: EnvId, func: usize },
    Yield,
    IpcTrySend { env: EnvId, value: u32, src_va: VirtAddr, perm: u32 },
    IpcRecv { dst_va: VirtAddr },
    TimeMsec,
    NetSend { buf: VirtAddr, len: usize },
    NetRecv { buf: VirtAddr },
    EnvSetPriority { env: EnvId, priority: u32 },
    FlexscRegister { va: VirtAddr },
    FlexscWait,
}

impl Syscall {
    /// Decode a syscall number and its five argument words.
    pub fn decode(num: u32, args: [u32; 5]) -> Option<Self> {
        use numbers::*;

        let [a1, a2, a3, a4, a5] = args;
        let env = |raw: u32| EnvId::new(raw as i32);
        let va = |raw: u32| VirtAddr::new(raw as usize);

        let call = match num {
            SYS_CPUTS => Self::Cputs {
                buf: va(a1),
                len: a2 as usize,
            },
            SYS_CGETC => Self::Cgetc,
            SYS_GETENVID => Self::GetEnvId,
            SYS_ENV_DESTROY => Self::EnvDestroy { env: env(a1) },
            SYS_PAGE_ALLOC => Self::PageAlloc {
                env: env(a1),
                va: va(a2),
                perm: a3,
            },
            SYS_PAGE_MAP => Self::PageMap {
                src_env: env(a1),
                src_va: va(a2),
                dst_env: env(a3),
                dst_va: va(a4),
                perm: a5,
            },
            SYS_PAGE_UNMAP => Self::PageUnmap {
                env: env(a1),
                va: va(a2),
            },
            SYS_EXOFORK => Self::Exofork,
            SYS_ENV_SET_STATUS => Self::EnvSetStatus {
                env: env(a1),
                status: a2,
            },
            SYS_ENV_SET_TRAPFRAME => Self::EnvSetTrapframe {
                env: env(a1),
                frame: va(a2),
            },
            SYS_ENV_SET_PGFAULT_UPCALL => Self::EnvSetPgfaultUpcall {
                env: env(a1),
                func: a2 as usize,
            },
            SYS_YIELD => Self::Yield,
            SYS_IPC_TRY_SEND => Self::IpcTrySend {
                env: env(a1),
                value: a2,
                src_va: va(a3),
                perm: a4,
            },
            SYS_IPC_RECV => Self::IpcRecv { dst_va: va(a1) },
            SYS_TIME_MSEC => Self::TimeMsec,
            SYS_NET_SEND => Self::NetSend {
                buf: va(a1),
                len: a2 as usize,
            },
            SYS_NET_RECV => Self::NetRecv { buf: va(a1) },
            SYS_ENV_SET_PRIORITY => Self::EnvSetPriority {
                env: env(a1),
                priority: a2,
            },
            SYS_FLEXSC_REGISTER => Self::FlexscRegister { va: va(a1) },
            SYS_FLEXSC_WAIT => Self::FlexscWait,
            _ => return None,
        };
        Some(call)
    }

    /// Encode back into a number and argument words, as a user stub
    /// would place them in registers or a syscall page entry.
    pub fn encode(&self) -> (u32, [u32; 5]) {
        use numbers::*;

        let id = |env: &EnvId| env.as_i32() as u32;
        let addr = |va: &VirtAddr| va.as_usize() as u32;

        match self {
            Self::Cputs { buf, len } => (SYS_CPUTS, [addr(buf), *len as u32, 0, 0, 0]),
            Self::Cgetc => (SYS_CGETC, [0; 5]),
            Self::GetEnvId => (SYS_GETENVID, [0; 5]),
            Self::EnvDestroy { env } => (SYS_ENV_DESTROY, [id(env), 0, 0, 0, 0]),
            Self::PageAlloc { env, va, perm } => (SYS_PAGE_ALLOC, [id(env), addr(va), *perm, 0, 0]),
            Self::PageMap {
                src_env,
                src_va,
                dst_env,
                dst_va,
                perm,
            } => (
                SYS_PAGE_MAP,
                [id(src_env), addr(src_va), id(dst_env), addr(dst_va), *perm],
            ),
            Self::PageUnmap { env, va } => (SYS_PAGE_UNMAP, [id(env), addr(va), 0, 0, 0]),
            Self::Exofork => (SYS_EXOFORK, [0; 5]),
            Self::EnvSetStatus { env, status } => (SYS_ENV_SET_STATUS, [id(env), *status, 0, 0, 0]),
            Self::EnvSetTrapframe { env, frame } => {
                (SYS_ENV_SET_TRAPFRAME, [id(env), addr(frame), 0, 0, 0])
            }
            Self::EnvSetPgfaultUpcall { env, func } => {
                (SYS_ENV_SET_PGFAULT_UPCALL, [id(env), *func as u32, 0, 0, 0])
            }
            Self::Yield => (SYS_YIELD, [0; 5]),
            Self::IpcTrySend {
                env,
                value,
                src_va,
                perm,
            } => (SYS_IPC_TRY_SEND, [id(env), *value, addr(src_va), *perm, 0]),
            Self::IpcRecv { dst_va } => (SYS_IPC_RECV, [addr(dst_va), 0, 0, 0, 0]),
            Self::TimeMsec => (SYS_TIME_MSEC, [0; 5]),
            Self::NetSend { buf, len } => (SYS_NET_SEND, [addr(buf), *len as u32, 0, 0, 0]),
            Self::NetRecv { buf } => (SYS_NET_RECV, [addr(buf), 0, 0, 0, 0]),
            Self::EnvSetPriority { env, priority } => {
                (SYS_ENV_SET_PRIORITY, [id(env), *priority, 0, 0, 0])
            }
            Self::FlexscRegister { va } => (SYS_FLEXSC_REGISTER, [addr(va), 0, 0, 0, 0]),
            Self::FlexscWait => (SYS_FLEXSC_WAIT, [0; 5]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_numbers() {
        assert_eq!(Syscall::decode(20, [0; 5]), None);
        assert_eq!(Syscall::decode(u32::MAX, [0; 5]), None);
    }

    #[test]
    fn test_page_map_argument_order() {
        let call = Syscall::decode(numbers::SYS_PAGE_MAP, [1, 0x1000, 2, 0x2000, 7]).unwrap();
        assert_eq!(
            call,
            Syscall::PageMap {
                src_env: EnvId::new(1),
                src_va: VirtAddr::new(0x1000),
                dst_env: EnvId::new(2),
                dst_va: VirtAddr::new(0x2000),
                perm: 7,
            }
        );
        assert_eq!(call.encode(), (numbers::SYS_PAGE_MAP, [1, 0x1000, 2, 0x2000, 7]));
    }

    #[test]
    fn test_every_number_decodes() {
        for num in 0..=numbers::SYS_FLEXSC_WAIT {
            let call = Syscall::decode(num, [0; 5]).unwrap();
            assert_eq!(call.encode().0, num);
        }
    }
}
