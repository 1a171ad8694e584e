//! Reception buffer
//!
//! Chunks from the transport are appended until a response is complete. The
//! buffer has a fixed capacity; when the next chunk does not fit, the partial
//! response is moved to the start first so no byte is lost across a refill.

use crate::modbus::is_complete_response;

/// Response line terminator
pub const LINE_TERMINATOR: u8 = b'\n';

#[derive(Debug)]
pub struct ReceptionBuffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
}

impl ReceptionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(2)],
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes of the response being assembled
    pub fn pending(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Drop everything, including stale bytes from an earlier exchange
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    pub fn append(&mut self, chunk: &[u8]) {
        if self.end + chunk.len() > self.data.len() {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;

            // A single response larger than the buffer
            if self.end + chunk.len() > self.data.len() {
                self.data.resize(self.end + chunk.len(), 0);
            }
        }

        self.data[self.end..self.end + chunk.len()].copy_from_slice(chunk);
        self.end += chunk.len();
    }

    /// Whether the pending bytes form a complete response
    ///
    /// Text responses end with the line terminator on the latest chunk; binary
    /// requests also complete once a whole RTU frame has arrived.
    pub fn is_complete(&self, last_chunk: &[u8], binary_function: Option<u8>) -> bool {
        if last_chunk.last() == Some(&LINE_TERMINATOR) {
            return true;
        }
        binary_function.is_some_and(|code| is_complete_response(code, self.pending()))
    }

    /// Hand out the complete response and start a new one after it
    pub fn take(&mut self) -> Vec<u8> {
        let response = self.pending().to_vec();
        self.start = self.end;
        response
    }
}
