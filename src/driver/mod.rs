//! Transport driver capability interface.
//!
//! The serial core never programs hardware itself. Each port is bound at
//! bring-up to one [`ComDriver`] implementation (UART, DMA-driven UART, CAN
//! bridge, ...) and talks to it only through this trait:
//! - the core hands the driver callback contexts ([`RxContext`],
//!   [`TxContext`], [`DmaContext`]) which the driver invokes from its
//!   interrupt or completion handlers
//! - the core kicks the driver with `rx_start` / `tx_start` whenever buffer
//!   space or pending data changes
//! - in DMA mode the core reads the driver's remaining-count register to
//!   find out how far the hardware has written
//!
//! Every method except [`ComDriver::capabilities`] has a default. Optional
//! capabilities default to "not supported", which the core treats as a no-op
//! rather than an error. Binding capabilities are advertised through
//! [`DriverCaps`] so that opening a port in a direction the driver cannot
//! serve fails up front.

pub mod callback;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use crate::buffer::RingBuffer;
use crate::types::{BaudRate, ControlLines, LowerId};
use bitflags::bitflags;
use std::sync::Arc;

pub use callback::{DmaContext, RxContext, RxOutcome, TxContext, TxOutcome};

bitflags! {
    /// Callback bindings a driver supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DriverCaps: u32 {
        const NONE = 0;
        /// Byte-interrupt receive callback
        const RX_CB = 1;
        /// Byte-interrupt transmit callback
        const TX_CB = 2;
        /// DMA receive completion callback
        const DMA_RX_CB = 4;
        /// DMA transmit completion callback
        const DMA_TX_CB = 8;
        /// Receive DMA remaining-count register
        const RX_DMA_COUNTER = 16;
    }
}

/// Control-line change notification, invoked by the driver
pub type CtrlLineCallback = Box<dyn Fn(ControlLines) + Send + Sync>;

/// Capability set of a transport driver.
///
/// All methods take `&self`; drivers keep their own interior state since the
/// same driver is called from task context and from its interrupt handlers.
pub trait ComDriver: Send + Sync {
    fn capabilities(&self) -> DriverCaps;

    /// Registers the receive callback for byte-interrupt mode
    fn bind_rx_cb(&self, _lower: LowerId, _ctx: RxContext) {}

    /// Registers the transmit callback for byte-interrupt mode
    fn bind_tx_cb(&self, _lower: LowerId, _ctx: TxContext) {}

    /// Registers the receive completion callback for DMA mode
    fn bind_dma_rx_cb(&self, _lower: LowerId, _ctx: DmaContext) {}

    /// Registers the transmit completion callback for DMA mode
    fn bind_dma_tx_cb(&self, _lower: LowerId, _ctx: DmaContext) {}

    /// (Re)enables reception, `headroom` bytes are free. Must be idempotent.
    fn rx_start(&self, _lower: LowerId, _headroom: usize) {}

    /// Begins or continues transmission of `pending` queued bytes. Must be
    /// idempotent.
    fn tx_start(&self, _lower: LowerId, _pending: usize) {}

    /// Starts circular receive DMA into the port's receive storage
    fn rx_dma_start(&self, _lower: LowerId, _target: DmaRxTarget) {}

    /// Bytes left before the receive DMA wraps. Counts down from the
    /// region length.
    fn rx_dma_remaining(&self, _lower: LowerId) -> usize {
        0
    }

    fn set_baud(&self, _lower: LowerId, _baud: BaudRate) {}

    /// Drives the lines in `mask` to the levels in `state`
    fn set_ctrl_line(&self, _lower: LowerId, _mask: ControlLines, _state: ControlLines) {}

    fn bind_ctrl_line_cb(&self, _lower: LowerId, _cb: CtrlLineCallback) {}

    /// Link state. Drivers without a link notion are always available.
    fn available(&self, _lower: LowerId) -> bool {
        true
    }
}

/// The receive storage of a DMA-mode port, as seen by the DMA engine.
///
/// The engine writes bytes at its own offset and reports progress only
/// through [`ComDriver::rx_dma_remaining`]; the core derives the buffer's
/// write index from that count before every read.
#[derive(Debug, Clone)]
pub struct DmaRxTarget {
    ring: Arc<RingBuffer>,
}

impl DmaRxTarget {
    pub(crate) fn new(ring: Arc<RingBuffer>) -> Self {
        Self { ring }
    }

    /// Region length in bytes
    pub fn len(&self) -> usize {
        self.ring.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.capacity() == 0
    }

    /// Stores `data` at `offset`, wrapping at the end of the region
    pub fn write(&self, offset: usize, data: &[u8]) {
        self.ring.write_raw(offset, data);
    }
}
