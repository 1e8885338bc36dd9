//! AArch64 Trap Frame
//!
//! The register snapshot saved on every exception from EL0 and restored
//! on return.
//!
//! # Syscall Convention
//! - x8: system call number
//! - x0-x4: arguments
//! - x0: return value
//!
//! # Security Considerations
//! - A frame supplied by user space is sanitized before it is installed:
//!   the target always returns to EL0 with IRQs unmasked

use core::mem::size_of;

use crate::mm::{VirtAddr, USTACKTOP};

/// SPSR mode field (M[4:0]). Zero selects EL0t in AArch64 state.
const SPSR_MODE_MASK: u64 = 0x1F;
/// SPSR IRQ mask bit (DAIF.I).
const SPSR_IRQ_MASK: u64 = 1 << 7;

/// Saved user register state.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// User stack pointer (SP_EL0)
    pub sp: u64,
    /// Exception Link Register (return address)
    pub elr: u64,
    /// Saved Program Status Register
    pub spsr: u64,
}

/// Size of a trap frame as laid out in user memory.
pub const TRAPFRAME_SIZE: usize = size_of::<TrapFrame>();

const _: () = assert!(TRAPFRAME_SIZE == 34 * 8);

impl Default for TrapFrame {
    fn default() -> Self {
        Self {
            gpr: [0; 31],
            sp: USTACKTOP as u64,
            elr: 0,
            spsr: 0,
        }
    }
}

impl TrapFrame {
    /// Register holding the syscall number.
    pub const SYSCALL_NUM_REG: usize = 8;

    /// A fresh EL0 frame that starts at `entry` on the given stack.
    pub fn user(entry: usize, stack_top: usize) -> Self {
        Self {
            sp: stack_top as u64,
            elr: entry as u64,
            ..Self::default()
        }
    }

    /// Syscall number and the five argument registers.
    #[inline]
    pub fn syscall_args(&self) -> (u32, [u32; 5]) {
        let mut args = [0u32; 5];
        for (arg, reg) in args.iter_mut().zip(self.gpr.iter()) {
            *arg = *reg as u32;
        }
        (self.gpr[Self::SYSCALL_NUM_REG] as u32, args)
    }

    /// Load a syscall request into the registers, as the user stub would.
    pub fn set_syscall(&mut self, num: u32, args: [u32; 5]) {
        for (reg, arg) in self.gpr.iter_mut().zip(args.iter()) {
            *reg = *arg as u64;
        }
        self.gpr[Self::SYSCALL_NUM_REG] = num as u64;
    }

    /// Store a signed result in x0.
    #[inline]
    pub fn set_return(&mut self, value: i32) {
        self.gpr[0] = value as i64 as u64;
    }

    /// Value the environment observes in x0.
    #[inline]
    pub fn return_value(&self) -> i32 {
        self.gpr[0] as i32
    }

    /// Pass a single pointer argument in x0.
    #[inline]
    pub fn set_arg0(&mut self, va: VirtAddr) {
        self.gpr[0] = va.as_usize() as u64;
    }

    /// Force the frame to return to EL0 with IRQs enabled.
    pub fn sanitize_for_user(&mut self) {
        self.spsr &= !(SPSR_MODE_MASK | SPSR_IRQ_MASK);
    }

    /// Little-endian image of the frame as user space lays it out.
    pub fn to_bytes(&self) -> [u8; TRAPFRAME_SIZE] {
        let mut out = [0u8; TRAPFRAME_SIZE];
        let words = self.gpr.iter().copied().chain([self.sp, self.elr, self.spsr]);
        for (chunk, word) in out.chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Parse a frame from its user-space image.
    pub fn from_bytes(bytes: &[u8; TRAPFRAME_SIZE]) -> Self {
        let mut words = [0u64; 34];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }
        let mut gpr = [0u64; 31];
        gpr.copy_from_slice(&words[..31]);
        Self {
            gpr,
            sp: words[31],
            elr: words[32],
            spsr: words[33],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_registers() {
        let mut frame = TrapFrame::default();
        frame.set_syscall(12, [1, 2, 3, 4, 5]);
        assert_eq!(frame.syscall_args(), (12, [1, 2, 3, 4, 5]));

        frame.set_return(-3);
        assert_eq!(frame.return_value(), -3);
        assert_eq!(frame.gpr[0], u64::MAX - 2);
    }

    #[test]
    fn test_sanitize_drops_privilege_and_unmasks_irqs() {
        let mut frame = TrapFrame {
            spsr: 0x3C5, // EL1h, DAIF all masked
            ..TrapFrame::default()
        };
        frame.sanitize_for_user();
        assert_eq!(frame.spsr & SPSR_MODE_MASK, 0);
        assert_eq!(frame.spsr & SPSR_IRQ_MASK, 0);
        // FIQ, SError and debug masks are left alone
        assert_eq!(frame.spsr, 0x340);
    }

    #[test]
    fn test_byte_image() {
        let mut frame = TrapFrame::user(0x0080_0000, USTACKTOP);
        frame.gpr[30] = 0xDEAD_BEEF;
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[30 * 8..30 * 8 + 4], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(TrapFrame::from_bytes(&bytes), frame);
    }
}
