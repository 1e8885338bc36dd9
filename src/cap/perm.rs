//! Permission Bits
//!
//! Validation of the page permission masks user environments pass to the
//! mapping syscalls. A mask must carry both `USER` and `PRESENT`, may add
//! `WRITABLE` and the software `AVAIL` bits, and nothing else.

use crate::error::SyscallError;
use crate::mm::PteFlags;

/// Validate a raw permission mask from user space.
pub fn check_perm(raw: u32) -> Result<PteFlags, SyscallError> {
    let perm = PteFlags::from_bits(raw).ok_or(SyscallError::Inval)?;
    if !PteFlags::SYSCALL.contains(perm) || !perm.contains(PteFlags::REQUIRED) {
        return Err(SyscallError::Inval);
    }
    Ok(perm)
}

/// A mapping may not grant write access to a page its source maps
/// read-only.
pub fn check_grant(requested: PteFlags, source: PteFlags) -> Result<(), SyscallError> {
    if requested.contains(PteFlags::WRITABLE) && !source.contains(PteFlags::WRITABLE) {
        return Err(SyscallError::Inval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_minimal_masks() {
        assert_eq!(check_perm(0x5), Ok(PteFlags::REQUIRED));
        assert_eq!(check_perm(0x7), Ok(PteFlags::USER_RW));
        assert_eq!(check_perm(0x4), Err(SyscallError::Inval));
        assert_eq!(check_perm(0x1), Err(SyscallError::Inval));
        // cache-disable is a real flag but not one users may set
        assert_eq!(check_perm(0x15), Err(SyscallError::Inval));
        assert_eq!(check_perm(0x1005), Err(SyscallError::Inval));
    }

    #[test]
    fn test_grant() {
        assert!(check_grant(PteFlags::USER_RW, PteFlags::REQUIRED).is_err());
        assert!(check_grant(PteFlags::REQUIRED, PteFlags::REQUIRED).is_ok());
        assert!(check_grant(PteFlags::USER_RW, PteFlags::USER_RW).is_ok());
    }

    proptest! {
        #[test]
        fn accepted_masks_are_within_syscall_set(raw in any::<u32>()) {
            if let Ok(perm) = check_perm(raw) {
                prop_assert_eq!(perm.bits(), raw);
                prop_assert_eq!(raw & !PteFlags::SYSCALL.bits(), 0);
                prop_assert!(perm.contains(PteFlags::USER | PteFlags::PRESENT));
            }
        }

        #[test]
        fn every_syscall_mask_with_required_bits_is_accepted(extra in 0u32..0x1000) {
            let raw = (extra & PteFlags::SYSCALL.bits()) | PteFlags::REQUIRED.bits();
            prop_assert!(check_perm(raw).is_ok());
        }
    }
}
