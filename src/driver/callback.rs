//! Callbacks the driver layer invokes from interrupt or completion context.
//!
//! These run at interrupt priority: they never block, never allocate and
//! never log. Each context is handed to the driver exactly once at bring-up
//! and its methods take `&mut self`, so a port buffer has a single
//! interrupt-side producer (receive) or consumer (transmit).

use crate::port::Channel;
use crate::types::Direction;
use std::sync::Arc;

/// Result of delivering received bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxOutcome {
    /// Bytes stored in the receive buffer
    pub accepted: usize,
    /// Free space left, for driver flow control
    pub headroom: usize,
    /// A waiting task was woken and should run on interrupt return
    pub need_yield: bool,
}

/// Result of pulling bytes to shift out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOutcome {
    /// Bytes copied into the driver's buffer
    pub supplied: usize,
    /// Bytes still queued for transmission
    pub remaining: usize,
    /// A waiting task was woken and should run on interrupt return
    pub need_yield: bool,
}

/// Receive-side callback of a byte-interrupt port
#[derive(Debug)]
pub struct RxContext {
    channel: Arc<Channel>,
}

impl RxContext {
    pub(crate) fn new(channel: Arc<Channel>) -> Self {
        Self { channel }
    }

    /// Stores bytes that arrived on the wire.
    ///
    /// Bytes are accepted all-or-nothing; on overflow `accepted` is 0 and the
    /// data is lost.
    pub fn on_rx_bytes(&mut self, bytes: &[u8]) -> RxOutcome {
        if !self.channel.is_valid() {
            debug_assert!(false, "receive callback bound to an invalid port");
            return RxOutcome::default();
        }

        let ring = &self.channel.ring;
        let accepted = match bytes {
            [byte] => ring.put_byte(*byte),
            _ => ring.put_data(bytes),
        };
        let need_yield = accepted > 0 && self.channel.signal.signal();

        RxOutcome {
            accepted,
            headroom: ring.free(),
            need_yield,
        }
    }
}

/// Transmit-side callback of a byte-interrupt port
#[derive(Debug)]
pub struct TxContext {
    channel: Arc<Channel>,
}

impl TxContext {
    pub(crate) fn new(channel: Arc<Channel>) -> Self {
        Self { channel }
    }

    /// Moves up to `out.len()` queued bytes into the driver's buffer
    pub fn on_tx_space_freed(&mut self, out: &mut [u8]) -> TxOutcome {
        if !self.channel.is_valid() {
            debug_assert!(false, "transmit callback bound to an invalid port");
            return TxOutcome::default();
        }

        let ring = &self.channel.ring;
        let supplied = ring.get_data(out);
        let need_yield = supplied > 0 && self.channel.signal.signal();

        TxOutcome {
            supplied,
            remaining: ring.used(),
            need_yield,
        }
    }
}

/// Completion callback of a DMA-mode port.
///
/// The buffer state of a DMA port is derived from the hardware counter, not
/// from these events. A completion only wakes a task blocked on the port so
/// it re-reads the counter early.
#[derive(Debug)]
pub struct DmaContext {
    channel: Arc<Channel>,
    direction: Direction,
}

impl DmaContext {
    pub(crate) fn new(channel: Arc<Channel>, direction: Direction) -> Self {
        Self { channel, direction }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Signals a finished (or half-finished) transfer. Returns the yield hint.
    pub fn on_complete(&mut self) -> bool {
        if !self.channel.is_valid() {
            debug_assert!(false, "DMA callback bound to an invalid port");
            return false;
        }
        self.channel.signal.signal()
    }
}
