//! In-memory platform for hosted runs.
//!
//! Console output is captured, console input is scripted, the clock only
//! moves when told to, and transmitted packets come back as received
//! packets once the transmit ring is processed. Clones share state, so a
//! test keeps one handle while the kernel owns another.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::warn;
use spin::Mutex;

use super::e1000::TxRing;
use super::{NetError, Platform};

#[derive(Default)]
struct LoopbackState {
    console_out: Vec<u8>,
    console_in: VecDeque<u8>,
    clock_ms: u64,
    tx: TxRing,
    rx: VecDeque<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct LoopbackPlatform {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written to the console so far.
    pub fn console_output(&self) -> Vec<u8> {
        self.state.lock().console_out.clone()
    }

    /// Queue bytes for `console_getc`.
    pub fn push_input(&self, bytes: &[u8]) {
        self.state.lock().console_in.extend(bytes.iter().copied());
    }

    pub fn advance_clock(&self, ms: u64) {
        let mut state = self.state.lock();
        state.clock_ms = state.clock_ms.saturating_add(ms);
    }

    /// Send every queued packet back to the receive side. Returns the
    /// number of packets looped back.
    pub fn process_tx(&self) -> usize {
        let mut state = self.state.lock();
        let LoopbackState { tx, rx, .. } = &mut *state;
        tx.process(|packet| rx.push_back(packet.to_vec()))
    }

    /// Make a packet available to `net_receive`.
    pub fn inject(&self, packet: &[u8]) {
        self.state.lock().rx.push_back(packet.to_vec());
    }

    /// Packets waiting on the transmit ring.
    pub fn tx_pending(&self) -> usize {
        self.state.lock().tx.pending()
    }
}

impl Platform for LoopbackPlatform {
    fn console_write(&mut self, bytes: &[u8]) {
        self.state.lock().console_out.extend_from_slice(bytes);
    }

    fn console_getc(&mut self) -> Option<u8> {
        self.state.lock().console_in.pop_front()
    }

    fn time_msec(&self) -> u64 {
        self.state.lock().clock_ms
    }

    fn net_transmit(&mut self, packet: &[u8]) -> Result<(), NetError> {
        self.state.lock().tx.transmit(packet)
    }

    fn net_receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let packet = self.state.lock().rx.pop_front().ok_or(NetError::RxRingEmpty)?;
        let len = packet.len();
        if len > buf.len() {
            warn!("loopback: dropping {} byte frame, buffer holds {}", len, buf.len());
            return Err(NetError::FrameTooLong(len));
        }
        buf[..len].copy_from_slice(&packet);
        Ok(len)
    }
}
