//! Fixed-capacity byte ring buffer shared between interrupt and task context.
//!
//! Each buffer has exactly one producer and one consumer:
//! - receive buffers are filled by the driver callback (or by the DMA engine)
//!   and drained by the task calling `receive`
//! - transmit buffers are filled by the task calling `send` and drained by the
//!   driver callback
//!
//! No lock lives inside the buffer. The producer owns the write position and
//! the consumer owns the read position; each side publishes its position with
//! release ordering and reads the other side's with acquire ordering. Byte
//! slots are `AtomicU8` so a misbehaving caller can corrupt data but never
//! cause a data race.
//!
//! Positions run over `[0, 2 * capacity)` so a full buffer and an empty one
//! are distinguishable without sacrificing a slot; the storage index is the
//! position folded into `[0, capacity)`. Capacity does not need to be a power
//! of two. With a power of two the `%` below reduces to a mask; any other
//! capacity costs an integer division per index update.

use crate::error::{ComError, Result};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};


/// Largest capacity whose position arithmetic cannot overflow
pub const MAX_CAPACITY: usize = usize::MAX / 4;

pub struct RingBuffer {
    storage: Box<[AtomicU8]>,
    write: AtomicUsize,
    read: AtomicUsize,
}

impl RingBuffer {
    /// Allocates the backing storage once. Capacity never changes afterwards.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ComError::InvalidParameter("ring buffer capacity must be positive"));
        }
        // Positions stay below 2 * capacity and `distance` adds another
        // 2 * capacity, so both must fit in a usize
        if capacity > MAX_CAPACITY {
            return Err(ComError::InvalidParameter("ring buffer capacity too large"));
        }
        Ok(Self {
            storage: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of unread bytes
    pub fn used(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        self.distance(read, write)
    }

    /// Remaining space (headroom)
    pub fn free(&self) -> usize {
        self.capacity() - self.used()
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// Appends one byte. Returns 1 on success, 0 if the buffer is full.
    pub fn put_byte(&self, byte: u8) -> usize {
        self.put_data(&[byte])
    }

    /// Appends all of `data` or nothing. Returns the number of bytes accepted.
    pub fn put_data(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        let free = self.capacity() - self.distance(read, write);
        if data.len() > free {
            return 0;
        }

        let cap = self.capacity();
        let start = self.slot(write);
        for (i, &byte) in data.iter().enumerate() {
            self.storage[(start + i) % cap].store(byte, Ordering::Relaxed);
        }
        self.write
            .store(self.advance(write, data.len()), Ordering::Release);
        data.len()
    }

    /// Moves up to `out.len()` bytes out of the buffer. Never blocks.
    pub fn get_data(&self, out: &mut [u8]) -> usize {
        let cap = self.capacity();
        loop {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);
            let count = out.len().min(self.distance(read, write));
            if count == 0 {
                return 0;
            }

            let start = self.slot(read);
            for (i, byte) in out[..count].iter_mut().enumerate() {
                *byte = self.storage[(start + i) % cap].load(Ordering::Relaxed);
            }

            // A concurrent flush moves the read position; the copy is stale then.
            if self
                .read
                .compare_exchange(
                    read,
                    self.advance(read, count),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return count;
            }
        }
    }

    /// Returns the next unread byte without consuming it
    pub fn peek_byte(&self) -> Option<u8> {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        if self.distance(read, write) == 0 {
            return None;
        }
        Some(self.storage[self.slot(read)].load(Ordering::Relaxed))
    }

    /// Discards all unread bytes by moving the read position to the write position
    pub fn flush(&self) {
        let write = self.write.load(Ordering::Acquire);
        self.read.store(write, Ordering::Release);
    }

    /// Storage index of the write position
    pub fn write_index(&self) -> usize {
        self.slot(self.write.load(Ordering::Acquire))
    }

    /// Storage index of the read position
    pub fn read_index(&self) -> usize {
        self.slot(self.read.load(Ordering::Acquire))
    }

    /// Moves the write position to storage index `index`, as reported by a DMA
    /// engine that filled the storage directly.
    ///
    /// A DMA engine exposes only its current offset, so a completely full
    /// buffer reads back as empty here. Callers in DMA mode accept that lap
    /// ambiguity.
    pub(crate) fn set_write_index(&self, index: usize) {
        let cap = self.capacity();
        let index = if index >= cap { 0 } else { index };
        let read = self.read.load(Ordering::Acquire);
        let used = (index + cap - self.slot(read)) % cap;
        self.write
            .store(self.advance(read, used), Ordering::Release);
    }

    /// Writes `data` into storage starting at storage index `offset`, wrapping
    /// at the end. Positions are left alone; this is the DMA engine's view of
    /// the memory.
    pub(crate) fn write_raw(&self, offset: usize, data: &[u8]) {
        let cap = self.capacity();
        for (i, &byte) in data.iter().enumerate() {
            self.storage[(offset + i) % cap].store(byte, Ordering::Relaxed);
        }
    }

    fn slot(&self, position: usize) -> usize {
        let cap = self.capacity();
        if position >= cap {
            position - cap
        } else {
            position
        }
    }

    fn advance(&self, position: usize, count: usize) -> usize {
        (position + count) % (2 * self.capacity())
    }

    fn distance(&self, read: usize, write: usize) -> usize {
        let span = 2 * self.capacity();
        (write + span - read) % span
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("read_index", &self.read_index())
            .field("write_index", &self.write_index())
            .finish()
    }
}
