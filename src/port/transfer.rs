//! Send and receive paths of a port.
//!
//! Send side:
//! - a non-blocking send takes the port's send lock with a short bounded
//!   wait, enqueues all bytes or none, and kicks the driver
//! - a blocking send holds the send lock for the whole call, splits the data
//!   into chunks no larger than the transmit buffer and waits on the "space
//!   freed" signal whenever a chunk does not fit
//! - a link that reports itself unavailable swallows outgoing data: the
//!   transmit buffer is flushed and the send reports full success
//!
//! Receive side pulls from the receive buffer and, while it is empty, waits on
//! the "data arrived" signal until the caller's timeout budget runs out.

use super::{Channel, Port, TransferMode};
use crate::driver::CtrlLineCallback;
use crate::error::{ComError, Result};
use crate::types::{BaudRate, ControlLines, SendMode};
use std::sync::PoisonError;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

impl Port {
    /// Sends `data` with the given discipline. Returns the bytes accepted.
    pub fn send(&self, data: &[u8], mode: SendMode) -> Result<usize> {
        match mode {
            SendMode::Blocking => self.send_blocking(data),
            SendMode::NonBlocking => self.send_nonblocking(data),
        }
    }

    /// Queues all of `data` or fails with `BufferFull` (retry later) or
    /// `SenderBusy` (another task holds the send lock, retry now).
    pub fn send_nonblocking(&self, data: &[u8]) -> Result<usize> {
        let tx = self.tx_channel()?;
        if data.is_empty() {
            return Ok(0);
        }
        if let Some(sunk) = self.sink_if_link_down(tx, data.len()) {
            return Ok(sunk);
        }

        let _guard = self
            .send_lock()
            .try_lock_for(self.timing().send_lock_wait)
            .ok_or(ComError::SenderBusy)?;
        self.enqueue(tx, data)
    }

    /// Queues all of `data`, waiting for transmit space as needed.
    ///
    /// Each wait for space is bounded by the port's send timeout; expiry
    /// aborts the whole call with `SendTimeout`. Bytes queued before the
    /// timeout stay queued.
    pub fn send_blocking(&self, data: &[u8]) -> Result<usize> {
        let tx = self.tx_channel()?;
        let _guard = self
            .send_lock()
            .try_lock_for(self.timing().blocking_lock_wait)
            .ok_or(ComError::LockUnavailable)?;

        let max_chunk = tx.ring.capacity();
        let mut remaining = data;
        while !remaining.is_empty() {
            let chunk = &remaining[..remaining.len().min(max_chunk)];
            let result = match self.sink_if_link_down(tx, chunk.len()) {
                Some(sunk) => Ok(sunk),
                None => self.enqueue(tx, chunk),
            };

            match result {
                Ok(queued) => remaining = &remaining[queued..],
                Err(ComError::BufferFull) => {
                    // Keep the transmitter running while we wait for space
                    self.driver().tx_start(self.lower_id(), tx.ring.used());
                    if !tx.signal.wait_timeout(self.timing().send_timeout) {
                        warn!(
                            lower = self.lower_id(),
                            unsent = remaining.len(),
                            "blocking send timed out"
                        );
                        return Err(ComError::SendTimeout);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Ok(data.len())
    }

    pub fn send_char(&self, byte: u8) -> Result<usize> {
        self.send_blocking(&[byte])
    }

    pub fn send_char_nonblocking(&self, byte: u8) -> Result<usize> {
        self.send_nonblocking(&[byte])
    }

    pub fn send_str(&self, text: &str) -> Result<usize> {
        self.send_blocking(text.as_bytes())
    }

    pub fn send_str_nonblocking(&self, text: &str) -> Result<usize> {
        self.send_nonblocking(text.as_bytes())
    }

    /// Reads up to `buf.len()` bytes, waiting at most `timeout` for the first
    /// byte. Returns 0 when nothing arrived in time; a zero timeout never
    /// blocks.
    ///
    /// `timeout` is a single deadline. A wake that finds the buffer still
    /// empty (a stale event) goes back to waiting for whatever budget is
    /// left instead of giving up after one retry. A timeout too large to
    /// form a deadline, such as `Duration::MAX`, waits until data arrives.
    pub fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let rx = self.rx_channel()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now().checked_add(timeout);
        loop {
            let read = self.pull(rx, buf);
            if read > 0 {
                trace!(lower = self.lower_id(), read, "received");
                return Ok(read);
            }

            if self.mode() == TransferMode::ByteInterrupt {
                // Room was just made; make sure the receiver is running
                self.driver().rx_start(self.lower_id(), rx.ring.free());
            }

            let budget = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if budget.is_zero() {
                return Ok(0);
            }
            rx.signal.wait_timeout(budget);
        }
    }

    /// Number of received bytes waiting to be read
    pub fn receive_byte_len(&self) -> Result<usize> {
        let rx = self.rx_channel()?;
        let _reader = self.lock_rx();
        self.resync_rx(rx);
        Ok(rx.ring.used())
    }

    /// Next received byte without consuming it, if any
    pub fn receive_byte_peek(&self) -> Result<Option<u8>> {
        let rx = self.rx_channel()?;
        let _reader = self.lock_rx();
        self.resync_rx(rx);
        Ok(rx.ring.peek_byte())
    }

    /// Drops all unread received bytes
    pub fn flush_rx(&self) -> Result<()> {
        let rx = self.rx_channel()?;
        let _reader = self.lock_rx();
        self.resync_rx(rx);
        rx.ring.flush();
        Ok(())
    }

    /// Drops all queued, not yet transmitted bytes
    pub fn flush_tx(&self) -> Result<()> {
        let tx = self.tx_channel()?;
        tx.ring.flush();
        Ok(())
    }

    pub fn change_baud(&self, baud: BaudRate) -> Result<()> {
        debug!(lower = self.lower_id(), baud, "changing baud rate");
        self.driver().set_baud(self.lower_id(), baud);
        Ok(())
    }

    pub fn set_ctrl_line(&self, mask: ControlLines, state: ControlLines) -> Result<()> {
        self.driver().set_ctrl_line(self.lower_id(), mask, state);
        Ok(())
    }

    pub fn register_ctrl_line_callback(&self, cb: CtrlLineCallback) -> Result<()> {
        self.driver().bind_ctrl_line_cb(self.lower_id(), cb);
        Ok(())
    }

    /// Link state as reported by the driver
    pub fn available(&self) -> bool {
        self.driver().available(self.lower_id())
    }

    /// Flushes the transmit buffer and reports `len` bytes as sent when the
    /// driver says the link is down.
    fn sink_if_link_down(&self, tx: &Channel, len: usize) -> Option<usize> {
        if self.available() {
            return None;
        }
        debug!(lower = self.lower_id(), len, "link down, discarding outgoing data");
        tx.ring.flush();
        Some(len)
    }

    /// Enqueue step shared by both send disciplines. Caller holds the send lock.
    fn enqueue(&self, tx: &Channel, data: &[u8]) -> Result<usize> {
        match self.mode() {
            // TODO: add a tx_dma_start capability to ComDriver and hand the
            // queued region to it here
            TransferMode::Dma => Err(ComError::DmaTxUnsupported),
            TransferMode::ByteInterrupt => {
                if data.len() > tx.ring.free() {
                    return Err(ComError::BufferFull);
                }
                let queued = tx.ring.put_data(data);
                if queued > 0 {
                    self.driver().tx_start(self.lower_id(), tx.ring.used());
                }
                trace!(lower = self.lower_id(), queued, "queued for transmit");
                Ok(queued)
            }
        }
    }

    fn pull(&self, rx: &Channel, buf: &mut [u8]) -> usize {
        let _reader = self.lock_rx();
        self.resync_rx(rx);
        rx.ring.get_data(buf)
    }

    fn resync_rx(&self, rx: &Channel) {
        self.mode().resync_rx(self.driver(), self.lower_id(), &rx.ring);
    }

    fn lock_rx(&self) -> std::sync::MutexGuard<'_, ()> {
        self.rx_lock().lock().unwrap_or_else(PoisonError::into_inner)
    }
}
