//! Fixed-capacity table of opened ports.
//!
//! Ports are stored in slots that are filled once and never emptied.
//! [`PortId`] handles carry the registry they came from and the slot index;
//! every operation resolves the handle through [`PortRegistry::port`], which
//! rejects default handles, handles from another registry and slots that do
//! not hold a live port. Nothing is ever dereferenced through an unchecked
//! handle.

use super::{Port, PortConfig};
use crate::driver::{ComDriver, CtrlLineCallback};
use crate::error::{ComError, Result};
use crate::types::{BaudRate, ControlLines, LowerId, PortId, SendMode};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

/// Slot count of [`PortRegistry::default`]
pub const DEFAULT_MAX_PORTS: usize = 8;

// Registry tag 0 is reserved for unbound handles. Tags repeat only after
// u32::MAX registries have been created in one process.
static NEXT_REGISTRY: AtomicU32 = AtomicU32::new(1);

fn next_registry_tag() -> u32 {
    loop {
        let tag = NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed);
        if tag != 0 {
            return tag;
        }
    }
}

pub struct PortRegistry {
    tag: u32,
    slots: Box<[OnceLock<Port>]>,
    next_slot: AtomicUsize,
}

impl PortRegistry {
    pub fn new(max_ports: usize) -> Result<Self> {
        if max_ports == 0 || max_ports > usize::from(u16::MAX) + 1 {
            return Err(ComError::InvalidParameter("registry size out of range"));
        }
        Ok(Self {
            tag: next_registry_tag(),
            slots: (0..max_ports).map(|_| OnceLock::new()).collect(),
            next_slot: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of ports opened so far
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a port on `driver`'s device `lower`.
    ///
    /// Fails if the configuration has no buffer at all, if the driver cannot
    /// bind a callback for a requested direction, or if every slot is taken.
    /// On success the driver has its callbacks and the receiver is started.
    pub fn open_port(
        &self,
        driver: Arc<dyn ComDriver>,
        lower: LowerId,
        config: PortConfig,
    ) -> Result<PortId> {
        let port = Port::new(driver, lower, &config)?;

        let capacity = self.capacity();
        let slot = self
            .next_slot
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < capacity).then_some(next + 1)
            })
            .map_err(|_| ComError::RegistryFull { capacity })?;

        port.bring_up();
        // Slots are claimed exactly once through next_slot
        let stored = self.slots[slot].set(port).is_ok();
        debug_assert!(stored, "port slot {slot} claimed twice");

        debug!(
            slot,
            lower,
            mode = ?config.mode,
            rx_capacity = config.rx_capacity,
            tx_capacity = config.tx_capacity,
            "opened port"
        );

        Ok(PortId {
            registry: self.tag,
            slot: slot as u16,
        })
    }

    /// Resolves a handle to its live port
    pub fn port(&self, id: PortId) -> Result<&Port> {
        if id.is_unbound() || id.registry != self.tag {
            return Err(ComError::PortInvalid);
        }
        self.slots
            .get(id.slot())
            .and_then(OnceLock::get)
            .filter(|port| port.is_valid())
            .ok_or(ComError::PortInvalid)
    }

    pub fn is_valid(&self, id: PortId) -> bool {
        self.port(id).is_ok()
    }

    pub fn send(&self, id: PortId, data: &[u8], mode: SendMode) -> Result<usize> {
        self.port(id)?.send(data, mode)
    }

    pub fn send_nonblocking(&self, id: PortId, data: &[u8]) -> Result<usize> {
        self.port(id)?.send_nonblocking(data)
    }

    pub fn send_blocking(&self, id: PortId, data: &[u8]) -> Result<usize> {
        self.port(id)?.send_blocking(data)
    }

    pub fn send_char(&self, id: PortId, byte: u8) -> Result<usize> {
        self.port(id)?.send_char(byte)
    }

    pub fn send_char_nonblocking(&self, id: PortId, byte: u8) -> Result<usize> {
        self.port(id)?.send_char_nonblocking(byte)
    }

    pub fn send_str(&self, id: PortId, text: &str) -> Result<usize> {
        self.port(id)?.send_str(text)
    }

    pub fn send_str_nonblocking(&self, id: PortId, text: &str) -> Result<usize> {
        self.port(id)?.send_str_nonblocking(text)
    }

    pub fn receive(&self, id: PortId, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.port(id)?.receive(buf, timeout)
    }

    pub fn receive_byte_len(&self, id: PortId) -> Result<usize> {
        self.port(id)?.receive_byte_len()
    }

    pub fn receive_byte_peek(&self, id: PortId) -> Result<Option<u8>> {
        self.port(id)?.receive_byte_peek()
    }

    pub fn flush_rx(&self, id: PortId) -> Result<()> {
        self.port(id)?.flush_rx()
    }

    pub fn flush_tx(&self, id: PortId) -> Result<()> {
        self.port(id)?.flush_tx()
    }

    pub fn change_baud(&self, id: PortId, baud: BaudRate) -> Result<()> {
        self.port(id)?.change_baud(baud)
    }

    pub fn set_ctrl_line(&self, id: PortId, mask: ControlLines, state: ControlLines) -> Result<()> {
        self.port(id)?.set_ctrl_line(mask, state)
    }

    pub fn register_ctrl_line_callback(&self, id: PortId, cb: CtrlLineCallback) -> Result<()> {
        self.port(id)?.register_ctrl_line_callback(cb)
    }

    /// Link state; an invalid handle is never available
    pub fn available(&self, id: PortId) -> bool {
        self.port(id).map(Port::available).unwrap_or(false)
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self {
            tag: next_registry_tag(),
            slots: (0..DEFAULT_MAX_PORTS).map(|_| OnceLock::new()).collect(),
            next_slot: AtomicUsize::new(0),
        }
    }
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("tag", &self.tag)
            .field("capacity", &self.capacity())
            .field("open", &self.len())
            .finish()
    }
}
