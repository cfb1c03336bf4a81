use bitflags::bitflags;
use std::fmt;

/// Opaque identifier of the lower-level device, passed through to the driver
pub type LowerId = u32;

/// Baud rate in bits per second
pub type BaudRate = u32;

/// Handle to an opened port.
///
/// Handles are plain values and can be copied freely. A default handle is
/// never bound to a port, so boards without a given peripheral can keep one
/// around and every operation on it fails cleanly with `PortInvalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortId {
    pub(crate) registry: u32,
    pub(crate) slot: u16,
}

impl PortId {
    /// A handle that never refers to a live port
    pub const UNBOUND: PortId = PortId {
        registry: 0,
        slot: 0,
    };

    pub fn is_unbound(&self) -> bool {
        self.registry == 0
    }

    /// Slot index inside the owning registry
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

/// Send discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Wait for buffer space, bounded by the port's send timeout
    Blocking,
    /// Enqueue everything now or fail
    NonBlocking,
}

/// Transfer direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "receive"),
            Direction::Tx => write!(f, "transmit"),
        }
    }
}

bitflags! {
    /// Modem control lines
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControlLines: u32 {
        const DTR = 1;
        const RTS = 2;
        const CTS = 4;
        const DSR = 8;
        const DCD = 16;
        const RI = 32;
    }
}

/// Configuration trait that must be implemented by all port configurations
pub trait Config: Send + Sync {
    fn validate(&self) -> crate::error::Result<()>;
}
