//! Simulated transports for exercising the serial core without hardware.
//!
//! [`MockUart`] plays a byte-interrupt UART: tests inject received bytes and
//! drain the transmit side by hand, or let `tx_start` shift everything out
//! immediately. [`MockDmaUart`] plays a UART whose receiver is a circular DMA
//! channel with a countdown register.

use super::{
    ComDriver, CtrlLineCallback, DmaContext, DmaRxTarget, DriverCaps, RxContext, RxOutcome,
    TxContext,
};
use crate::types::{BaudRate, ControlLines, LowerId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct UartState {
    rx: Option<RxContext>,
    tx: Option<TxContext>,
    wire: Vec<u8>,
    rx_start_calls: Vec<usize>,
    tx_start_calls: Vec<usize>,
    baud: Option<BaudRate>,
    lines: ControlLines,
    ctrl_cb: Option<CtrlLineCallback>,
}

/// Byte-interrupt UART simulation
pub struct MockUart {
    state: Mutex<UartState>,
    available: AtomicBool,
    auto_drain: AtomicBool,
    caps: DriverCaps,
}

impl MockUart {
    /// A UART that only moves bytes when the test asks it to
    pub fn new() -> Self {
        Self::with_caps(DriverCaps::RX_CB | DriverCaps::TX_CB)
    }

    /// A UART that transmits everything as soon as `tx_start` is called
    pub fn new_auto_drain() -> Self {
        let uart = Self::new();
        uart.set_auto_drain(true);
        uart
    }

    pub fn with_caps(caps: DriverCaps) -> Self {
        Self {
            state: Mutex::new(UartState::default()),
            available: AtomicBool::new(true),
            auto_drain: AtomicBool::new(false),
            caps,
        }
    }

    /// Simulates the link going up or down
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn set_auto_drain(&self, auto_drain: bool) {
        self.auto_drain.store(auto_drain, Ordering::Release);
    }

    /// Simulates the receive interrupt delivering `bytes`
    pub fn inject_rx(&self, bytes: &[u8]) -> RxOutcome {
        let mut state = lock(&self.state);
        match state.rx.as_mut() {
            Some(rx) => rx.on_rx_bytes(bytes),
            None => RxOutcome::default(),
        }
    }

    /// Simulates the transmit interrupt shifting out up to `max` bytes
    pub fn drain_tx(&self, max: usize) -> Vec<u8> {
        let mut state = lock(&self.state);
        Self::drain_locked(&mut state, max)
    }

    fn drain_locked(state: &mut UartState, max: usize) -> Vec<u8> {
        let mut out = vec![0u8; max];
        let supplied = match state.tx.as_mut() {
            Some(tx) => tx.on_tx_space_freed(&mut out).supplied,
            None => 0,
        };
        out.truncate(supplied);
        state.wire.extend_from_slice(&out);
        out
    }

    /// Everything shifted out so far
    pub fn sent(&self) -> Vec<u8> {
        lock(&self.state).wire.clone()
    }

    pub fn rx_start_calls(&self) -> Vec<usize> {
        lock(&self.state).rx_start_calls.clone()
    }

    pub fn tx_start_calls(&self) -> Vec<usize> {
        lock(&self.state).tx_start_calls.clone()
    }

    pub fn baud(&self) -> Option<BaudRate> {
        lock(&self.state).baud
    }

    pub fn lines(&self) -> ControlLines {
        lock(&self.state).lines
    }

    /// Simulates a modem-status interrupt reporting `lines`
    pub fn raise_ctrl_lines(&self, lines: ControlLines) -> bool {
        let state = lock(&self.state);
        match state.ctrl_cb.as_ref() {
            Some(cb) => {
                cb(lines);
                true
            }
            None => false,
        }
    }
}

impl Default for MockUart {
    fn default() -> Self {
        Self::new()
    }
}

impl ComDriver for MockUart {
    fn capabilities(&self) -> DriverCaps {
        self.caps
    }

    fn bind_rx_cb(&self, _lower: LowerId, ctx: RxContext) {
        lock(&self.state).rx = Some(ctx);
    }

    fn bind_tx_cb(&self, _lower: LowerId, ctx: TxContext) {
        lock(&self.state).tx = Some(ctx);
    }

    fn rx_start(&self, _lower: LowerId, headroom: usize) {
        lock(&self.state).rx_start_calls.push(headroom);
    }

    fn tx_start(&self, _lower: LowerId, pending: usize) {
        let mut state = lock(&self.state);
        state.tx_start_calls.push(pending);
        if self.auto_drain.load(Ordering::Acquire) && pending > 0 {
            Self::drain_locked(&mut state, pending);
        }
    }

    fn set_baud(&self, _lower: LowerId, baud: BaudRate) {
        lock(&self.state).baud = Some(baud);
    }

    fn set_ctrl_line(&self, _lower: LowerId, mask: ControlLines, state: ControlLines) {
        let mut uart = lock(&self.state);
        uart.lines = (uart.lines - mask) | (state & mask);
    }

    fn bind_ctrl_line_cb(&self, _lower: LowerId, cb: CtrlLineCallback) {
        lock(&self.state).ctrl_cb = Some(cb);
    }

    fn available(&self, _lower: LowerId) -> bool {
        self.available.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct DmaState {
    target: Option<DmaRxTarget>,
    rx_done: Option<DmaContext>,
    tx_done: Option<DmaContext>,
    offset: usize,
}

/// UART with a circular receive DMA channel
pub struct MockDmaUart {
    state: Mutex<DmaState>,
    remaining: AtomicUsize,
}

impl MockDmaUart {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DmaState::default()),
            remaining: AtomicUsize::new(0),
        }
    }

    /// Simulates the DMA engine storing `bytes` and counting down
    pub fn dma_receive(&self, bytes: &[u8]) {
        let mut state = lock(&self.state);
        let Some(target) = state.target.as_ref() else {
            return;
        };
        let len = target.len();
        target.write(state.offset, bytes);

        let end = state.offset + bytes.len();
        state.offset = end % len;
        // The counter hits zero at the end of a lap and reloads on the next byte
        let remaining = if state.offset == 0 && end > 0 {
            0
        } else {
            len - state.offset
        };
        self.remaining.store(remaining, Ordering::Release);
    }

    /// Overrides the remaining-count register
    pub fn set_remaining(&self, remaining: usize) {
        self.remaining.store(remaining, Ordering::Release);
    }

    /// Simulates the receive completion interrupt
    pub fn complete_rx(&self) -> bool {
        let mut state = lock(&self.state);
        match state.rx_done.as_mut() {
            Some(ctx) => ctx.on_complete(),
            None => false,
        }
    }

    /// Length of the region handed over by `rx_dma_start`, if started
    pub fn region_len(&self) -> Option<usize> {
        lock(&self.state).target.as_ref().map(DmaRxTarget::len)
    }

    pub fn has_tx_binding(&self) -> bool {
        lock(&self.state).tx_done.is_some()
    }
}

impl Default for MockDmaUart {
    fn default() -> Self {
        Self::new()
    }
}

impl ComDriver for MockDmaUart {
    fn capabilities(&self) -> DriverCaps {
        DriverCaps::DMA_RX_CB | DriverCaps::DMA_TX_CB | DriverCaps::RX_DMA_COUNTER
    }

    fn bind_dma_rx_cb(&self, _lower: LowerId, ctx: DmaContext) {
        lock(&self.state).rx_done = Some(ctx);
    }

    fn bind_dma_tx_cb(&self, _lower: LowerId, ctx: DmaContext) {
        lock(&self.state).tx_done = Some(ctx);
    }

    fn rx_dma_start(&self, _lower: LowerId, target: DmaRxTarget) {
        let mut state = lock(&self.state);
        self.remaining.store(target.len(), Ordering::Release);
        state.offset = 0;
        state.target = Some(target);
    }

    fn rx_dma_remaining(&self, _lower: LowerId) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}
