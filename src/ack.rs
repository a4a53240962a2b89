//! Rolling search window for acknowledgment frames.
//!
//! While waiting for an ACK the host keeps draining the port. Telemetry may
//! arrive before, after or around the ACK, so the sentinel is searched for
//! anywhere in the accumulated bytes rather than only at the start.

use crate::frame::find_ack;

#[derive(Debug, Clone)]
pub struct AckWindow {
    buffer: Vec<u8>,
    limit: usize,
}

impl AckWindow {
    /// `limit` bounds how many of the most recent bytes are retained
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit * 2),
            limit: limit.max(3),
        }
    }

    /// Append freshly read bytes; returns true once an ACK is present
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        self.buffer.extend_from_slice(bytes);
        if let Some(offset) = find_ack(&self.buffer) {
            log::debug!("Found ACK at position {}", offset);
            return true;
        }
        if self.buffer.len() > self.limit {
            let excess = self.buffer.len() - self.limit;
            self.buffer.drain(..excess);
        }
        false
    }
}
