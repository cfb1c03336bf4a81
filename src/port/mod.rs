//! Serial ports: a driver binding plus one ring buffer per direction.
//!
//! A port is opened once at bring-up through [`PortRegistry::open_port`] and
//! lives for as long as its registry. Its capacity never changes. The
//! transfer operations live in [`transfer`], handle validation in
//! [`registry`].

pub mod registry;
pub mod transfer;


use crate::buffer::RingBuffer;
use crate::driver::{ComDriver, DriverCaps};
use crate::error::{ComError, Result};
use crate::sync::{SendLock, Signal, WaitBackend};
use crate::types::{Config, Direction, LowerId};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use registry::PortRegistry;

/// Tag stored in every live port and channel ("Comm")
pub(crate) const PORT_MAGIC: u32 = 0x436f_6d6d;

/// Ceiling on a single wait for transmit space during a blocking send
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(5000);
/// Bounded wait on the send lock for non-blocking sends
pub const DEFAULT_SEND_LOCK_WAIT: Duration = Duration::from_millis(1);
/// Bounded wait on the send lock for blocking sends
pub const DEFAULT_BLOCKING_LOCK_WAIT: Duration = Duration::from_millis(5);

/// How the transport moves bytes between wire and buffers.
///
/// The receive write index is event-driven in byte-interrupt mode (advanced
/// by the receive callback) and computed in DMA mode (derived from the DMA
/// remaining count). [`TransferMode::resync_rx`] reconciles the buffer with
/// the hardware before any used/free query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    ByteInterrupt,
    Dma,
}

impl TransferMode {
    pub(crate) fn resync_rx(&self, driver: &dyn ComDriver, lower: LowerId, ring: &RingBuffer) {
        match self {
            TransferMode::ByteInterrupt => {}
            TransferMode::Dma => {
                let remaining = driver.rx_dma_remaining(lower).min(ring.capacity());
                ring.set_write_index(ring.capacity() - remaining);
            }
        }
    }

    fn required_caps(&self, direction: Direction) -> (DriverCaps, &'static str) {
        match (self, direction) {
            (TransferMode::ByteInterrupt, Direction::Rx) => (DriverCaps::RX_CB, "bind_rx_cb"),
            (TransferMode::ByteInterrupt, Direction::Tx) => (DriverCaps::TX_CB, "bind_tx_cb"),
            (TransferMode::Dma, Direction::Rx) => (
                DriverCaps::DMA_RX_CB | DriverCaps::RX_DMA_COUNTER,
                "bind_dma_rx_cb and rx_dma_remaining",
            ),
            (TransferMode::Dma, Direction::Tx) => (DriverCaps::DMA_TX_CB, "bind_dma_tx_cb"),
        }
    }
}

/// Timeouts of the send path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTiming {
    pub send_timeout: Duration,
    pub send_lock_wait: Duration,
    pub blocking_lock_wait: Duration,
}

impl Default for TransferTiming {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            send_lock_wait: DEFAULT_SEND_LOCK_WAIT,
            blocking_lock_wait: DEFAULT_BLOCKING_LOCK_WAIT,
        }
    }
}

/// Port configuration. A zero capacity leaves that direction out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub rx_capacity: usize,
    pub tx_capacity: usize,
    pub mode: TransferMode,
    pub timing: TransferTiming,
    pub wait: WaitBackend,
}

impl PortConfig {
    pub fn duplex(rx_capacity: usize, tx_capacity: usize) -> Self {
        Self {
            rx_capacity,
            tx_capacity,
            ..Default::default()
        }
    }

    pub fn rx_only(rx_capacity: usize) -> Self {
        Self::duplex(rx_capacity, 0)
    }

    pub fn tx_only(tx_capacity: usize) -> Self {
        Self::duplex(0, tx_capacity)
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_wait(mut self, wait: WaitBackend) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_timing(mut self, timing: TransferTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn has_rx(&self) -> bool {
        self.rx_capacity > 0
    }

    pub fn has_tx(&self) -> bool {
        self.tx_capacity > 0
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            rx_capacity: 128,
            tx_capacity: 128,
            mode: TransferMode::ByteInterrupt,
            timing: TransferTiming::default(),
            wait: WaitBackend::Condvar,
        }
    }
}

impl Config for PortConfig {
    fn validate(&self) -> Result<()> {
        if !self.has_rx() && !self.has_tx() {
            return Err(ComError::InvalidParameter(
                "port needs a receive or transmit buffer",
            ));
        }
        if self.timing.send_timeout.is_zero() {
            return Err(ComError::InvalidParameter("send timeout must be positive"));
        }
        if let WaitBackend::Poll { interval } = self.wait {
            if interval.is_zero() {
                return Err(ComError::InvalidParameter("poll interval must be positive"));
            }
        }
        Ok(())
    }
}

/// One direction of a port: its buffer and the wake signal for tasks
/// blocked on it ("data arrived" for receive, "space freed" for transmit).
pub(crate) struct Channel {
    magic: u32,
    pub(crate) ring: Arc<RingBuffer>,
    pub(crate) signal: Box<dyn Signal>,
}

impl Channel {
    fn new(capacity: usize, wait: &WaitBackend) -> Result<Self> {
        Ok(Self {
            magic: PORT_MAGIC,
            ring: Arc::new(RingBuffer::new(capacity)?),
            signal: wait.build(),
        })
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.magic == PORT_MAGIC
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("ring", &self.ring)
            .finish_non_exhaustive()
    }
}

/// An opened port
pub struct Port {
    magic: u32,
    lower: LowerId,
    driver: Arc<dyn ComDriver>,
    mode: TransferMode,
    timing: TransferTiming,
    rx: Option<Arc<Channel>>,
    tx: Option<Arc<Channel>>,
    // Serializes task-side readers, and the DMA write-index resync with them
    rx_lock: Mutex<()>,
    send_lock: SendLock,
}

impl Port {
    /// Checks the driver can serve the requested directions and builds the
    /// buffers. Callbacks are bound separately by [`Port::bring_up`].
    pub(crate) fn new(driver: Arc<dyn ComDriver>, lower: LowerId, config: &PortConfig) -> Result<Self> {
        config.validate()?;

        let caps = driver.capabilities();
        for (wanted, direction) in [(config.has_rx(), Direction::Rx), (config.has_tx(), Direction::Tx)] {
            let (required, name) = config.mode.required_caps(direction);
            if wanted && !caps.contains(required) {
                return Err(ComError::MissingCapability(name));
            }
        }

        let rx = config
            .has_rx()
            .then(|| Channel::new(config.rx_capacity, &config.wait).map(Arc::new))
            .transpose()?;
        let tx = config
            .has_tx()
            .then(|| Channel::new(config.tx_capacity, &config.wait).map(Arc::new))
            .transpose()?;

        Ok(Self {
            magic: PORT_MAGIC,
            lower,
            driver,
            mode: config.mode,
            timing: config.timing,
            rx,
            tx,
            rx_lock: Mutex::new(()),
            send_lock: SendLock::new(),
        })
    }

    /// Hands the callbacks to the driver and starts the receiver
    pub(crate) fn bring_up(&self) {
        use crate::driver::{DmaContext, DmaRxTarget, RxContext, TxContext};

        if let Some(rx) = &self.rx {
            match self.mode {
                TransferMode::ByteInterrupt => {
                    self.driver.bind_rx_cb(self.lower, RxContext::new(rx.clone()));
                    self.driver.rx_start(self.lower, rx.ring.free());
                }
                TransferMode::Dma => {
                    self.driver
                        .bind_dma_rx_cb(self.lower, DmaContext::new(rx.clone(), Direction::Rx));
                    self.driver
                        .rx_dma_start(self.lower, DmaRxTarget::new(rx.ring.clone()));
                }
            }
        }

        if let Some(tx) = &self.tx {
            match self.mode {
                TransferMode::ByteInterrupt => {
                    self.driver.bind_tx_cb(self.lower, TxContext::new(tx.clone()));
                }
                TransferMode::Dma => {
                    self.driver
                        .bind_dma_tx_cb(self.lower, DmaContext::new(tx.clone(), Direction::Tx));
                }
            }
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.magic == PORT_MAGIC
    }

    pub fn lower_id(&self) -> LowerId {
        self.lower
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn timing(&self) -> &TransferTiming {
        &self.timing
    }

    pub fn has_rx(&self) -> bool {
        self.rx.is_some()
    }

    pub fn has_tx(&self) -> bool {
        self.tx.is_some()
    }

    /// Receive buffer. In DMA mode its write index is only current after a
    /// receive-side query such as [`Port::receive_byte_len`].
    pub fn rx_buffer(&self) -> Option<&RingBuffer> {
        self.rx.as_deref().map(|channel| channel.ring.as_ref())
    }

    pub fn tx_buffer(&self) -> Option<&RingBuffer> {
        self.tx.as_deref().map(|channel| channel.ring.as_ref())
    }

    /// True while some task holds the send lock
    pub fn is_sending(&self) -> bool {
        self.send_lock.is_locked()
    }

    pub(crate) fn driver(&self) -> &dyn ComDriver {
        self.driver.as_ref()
    }

    pub(crate) fn send_lock(&self) -> &SendLock {
        &self.send_lock
    }

    pub(crate) fn rx_lock(&self) -> &Mutex<()> {
        &self.rx_lock
    }

    // Calling a direction the port was opened without is a programming error
    pub(crate) fn rx_channel(&self) -> Result<&Channel> {
        match self.rx.as_deref() {
            Some(channel) => Ok(channel),
            None => {
                debug_assert!(false, "receive on a port opened without a receive buffer");
                Err(ComError::DirectionUnsupported(Direction::Rx))
            }
        }
    }

    pub(crate) fn tx_channel(&self) -> Result<&Channel> {
        match self.tx.as_deref() {
            Some(channel) => Ok(channel),
            None => {
                debug_assert!(false, "send on a port opened without a transmit buffer");
                Err(ComError::DirectionUnsupported(Direction::Tx))
            }
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("lower", &self.lower)
            .field("mode", &self.mode)
            .field("rx", &self.rx)
            .field("tx", &self.tx)
            .finish_non_exhaustive()
    }
}
