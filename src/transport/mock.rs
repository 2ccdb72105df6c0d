//! Mock transport for testing
//!
//! Replies can be scripted per write: each call to `write` releases the next
//! queued reply into the read buffer, which is how the module answers a
//! command.

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Mock transport for unit and integration testing
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    /// Upper bound on bytes handed out per read
    read_chunk: usize,
    fail_reads: bool,
    closed: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                replies: VecDeque::new(),
                read_chunk: usize::MAX,
                fail_reads: false,
                closed: false,
            })),
        }
    }

    /// Inject data to be read immediately
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Queue bytes released into the read buffer by the next write.
    ///
    /// An empty reply leaves that write unanswered.
    pub fn queue_reply(&self, data: &[u8]) {
        self.inner.lock().replies.push_back(data.to_vec());
    }

    /// Limit how many bytes a single read returns
    pub fn set_read_chunk(&self, max: usize) {
        self.inner.lock().read_chunk = max.max(1);
    }

    /// Make every following read fail with an I/O error
    pub fn fail_reads(&self) {
        self.inner.lock().fail_reads = true;
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Closed);
        }
        if inner.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure").into());
        }

        let available = inner
            .read_buffer
            .len()
            .min(buffer.len())
            .min(inner.read_chunk);
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }

        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Closed);
        }
        inner.write_buffer.extend_from_slice(data);
        if let Some(reply) = inner.replies.pop_front() {
            inner.read_buffer.extend(reply);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_released_on_write() {
        let mock = MockTransport::new();
        let mut transport = mock.clone();
        mock.queue_reply(&[0xAA, 0xBB]);

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 0);

        transport.write(&[0x01]).unwrap();
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xAA, 0xBB]);
        assert_eq!(mock.get_written(), vec![0x01]);
    }

    #[test]
    fn test_read_chunk_limit() {
        let mock = MockTransport::new();
        let mut transport = mock.clone();
        mock.set_read_chunk(2);
        mock.inject_read(&[1, 2, 3]);

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(transport.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn test_closed_transport_rejects_io() {
        let mock = MockTransport::new();
        let mut transport = mock.clone();
        transport.close().unwrap();

        assert!(mock.is_closed());
        assert!(matches!(transport.write(&[0x01]), Err(Error::Closed)));
    }
}
