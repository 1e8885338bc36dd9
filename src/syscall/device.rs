//! Console, clock and network syscalls.

use alloc::vec;

use crate::drivers::e1000::{PBUFSIZE, RBUFSIZE};
use crate::error::{SysResult, SyscallError};
use crate::kernel::Kernel;
use crate::mm::{PteFlags, VirtAddr};

use super::Reply;

impl Kernel {
    /// Print `len` bytes at `buf`. An unreadable buffer destroys the
    /// caller.
    pub(super) fn sys_cputs(&mut self, caller: usize, buf: VirtAddr, len: usize) -> SysResult<Reply> {
        let bytes = self.copy_in(caller, buf, len)?;
        self.platform.console_write(bytes.as_bytes());
        Ok(Reply::Value(0))
    }

    /// Next console byte, or 0 if none is waiting.
    pub(super) fn sys_cgetc(&mut self) -> SysResult<Reply> {
        let c = self.platform.console_getc().map_or(0, i32::from);
        Ok(Reply::Value(c))
    }

    /// Milliseconds since boot, wrapping to 0 after `i32::MAX` so the
    /// value is never mistaken for an error code.
    pub(super) fn sys_time_msec(&mut self) -> SysResult<Reply> {
        let now = self.platform.time_msec() & i32::MAX as u64;
        Ok(Reply::Value(now as i32))
    }

    /// Transmit one packet.
    ///
    /// Errors: `Inval` for a null or kernel buffer or a packet longer
    /// than [`PBUFSIZE`]; `TxRingFull`.
    pub(super) fn sys_net_send(&mut self, caller: usize, buf: VirtAddr, len: usize) -> SysResult<Reply> {
        if buf.as_usize() == 0 || !buf.is_user() || len > PBUFSIZE {
            return Err(SyscallError::Inval.into());
        }
        let packet = self.copy_in(caller, buf, len)?;
        self.platform
            .net_transmit(packet.as_bytes())
            .map_err(SyscallError::from)?;
        Ok(Reply::Value(0))
    }

    /// Receive one packet into a writable buffer of [`RBUFSIZE`] bytes,
    /// returning its length.
    ///
    /// Errors: `Inval` for a null buffer; `RxRingEmpty`.
    pub(super) fn sys_net_recv(&mut self, caller: usize, buf: VirtAddr) -> SysResult<Reply> {
        if buf.as_usize() == 0 {
            return Err(SyscallError::Inval.into());
        }
        self.user_mem_assert(caller, buf, RBUFSIZE, PteFlags::USER_RW)?;

        let mut packet = vec![0u8; RBUFSIZE];
        let len = self
            .platform
            .net_receive(&mut packet)
            .map_err(SyscallError::from)?;
        self.copy_out(caller, buf, &packet[..len])?;
        Ok(Reply::Value(len as i32))
    }
}
