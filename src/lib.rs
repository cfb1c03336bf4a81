//! Buffered serial communication layer for embedded transports.
//!
//! Application code talks to opaque port handles; each port is backed by a
//! transport driver (UART, DMA-driven UART, CAN bridge) and a fixed-capacity
//! ring buffer per direction. Drivers move bytes between the wire and the
//! buffers from interrupt context through callbacks; tasks send and receive
//! through blocking or non-blocking calls.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use libserialcom::driver::{ComDriver, DriverCaps};
//! use libserialcom::port::{PortConfig, PortRegistry};
//!
//! struct NullUart;
//!
//! impl ComDriver for NullUart {
//!     fn capabilities(&self) -> DriverCaps {
//!         DriverCaps::RX_CB | DriverCaps::TX_CB
//!     }
//! }
//!
//! let registry = PortRegistry::default();
//! let port = registry
//!     .open_port(Arc::new(NullUart), 1, PortConfig::duplex(64, 64))
//!     .unwrap();
//!
//! assert_eq!(registry.send_nonblocking(port, b"ping").unwrap(), 4);
//!
//! let mut buf = [0u8; 16];
//! assert_eq!(registry.receive(port, &mut buf, Duration::ZERO).unwrap(), 0);
//! ```

pub mod buffer; // Ring buffer shared by interrupt and task context
pub mod driver; // Transport driver capabilities and callbacks
pub mod port; // Ports, registry and transfer engine
pub mod sync; // Wait primitives

// Common types and traits
pub mod error;
pub mod types;

// Re-exports for convenience
pub use buffer::RingBuffer;
pub use driver::ComDriver;
pub use error::{ComError, Result};
pub use port::{Port, PortConfig, PortRegistry, TransferMode};
pub use types::{PortId, SendMode};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
