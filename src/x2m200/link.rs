//! Frame-level access to the transport
//!
//! `FrameLink` owns the transport exclusively and keeps a reassembly buffer,
//! so a frame split across several reads (or several frames delivered by one
//! read) is handled transparently.

use super::constants::{POLL_INTERVAL, READ_CHUNK};
use super::frame::{self, Decoded};
use crate::error::{Error, Result};
use crate::transport::Transport;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Framed duplex channel to the module
pub struct FrameLink {
    transport: Box<dyn Transport>,
    buffer: Vec<u8>,
}

impl FrameLink {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Frame and write a command payload
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let packet = frame::encode(payload);
        log::debug!("X2M200: TX {} bytes: {:02X?}", packet.len(), &packet);

        let mut written = 0;
        while written < packet.len() {
            let n = self.transport.write(&packet[written..])?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "transport accepted no bytes").into());
            }
            written += n;
        }
        self.transport.flush()?;
        Ok(())
    }

    /// Return the next frame if one is complete after at most one read.
    ///
    /// `Ok(None)` means the transport had nothing ready (zero-byte read) or
    /// only part of a frame has arrived; call again later.
    pub fn poll_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(result) = self.take_buffered() {
            return result.map(Some);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = self.transport.read(&mut chunk)?;
        if n == 0 {
            // Line went quiet, so a frame pending on the next byte is finished
            return match self.take_settled() {
                Some(result) => result.map(Some),
                None => Ok(None),
            };
        }
        self.buffer.extend_from_slice(&chunk[..n]);

        match self.take_buffered() {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    /// Block until a frame arrives.
    ///
    /// With `timeout` set, gives up with [`Error::Timeout`] once it elapses.
    pub fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let start = Instant::now();
        loop {
            if let Some(payload) = self.poll_frame()? {
                return Ok(payload);
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return Err(Error::Timeout {
                        operation: "frame read",
                        after: limit,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Release the transport
    pub fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        self.transport.close()
    }

    /// Decode the first buffered frame and drop the bytes it used
    fn take_buffered(&mut self) -> Option<Result<Vec<u8>>> {
        let decoded = frame::decode(&self.buffer);
        self.consume(decoded)
    }

    /// Like `take_buffered`, treating the buffer end as the end of input
    fn take_settled(&mut self) -> Option<Result<Vec<u8>>> {
        if self.buffer.is_empty() {
            return None;
        }
        let decoded = frame::decode_complete(&self.buffer);
        self.consume(decoded)
    }

    fn consume(&mut self, decoded: Decoded) -> Option<Result<Vec<u8>>> {
        match decoded {
            Decoded::Incomplete => None,
            Decoded::Frame { consumed, result } => {
                self.buffer.drain(..consumed);
                match &result {
                    Ok(payload) => log::debug!("X2M200: RX payload {:02X?}", payload),
                    Err(e) => log::debug!("X2M200: RX rejected ({} bytes): {}", consumed, e),
                }
                Some(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::transport::MockTransport;

    #[test]
    fn test_send_writes_frame() {
        let mock = MockTransport::new();
        let mut link = FrameLink::new(Box::new(mock.clone()));

        link.send(&[0x22]).unwrap();
        assert_eq!(mock.get_written(), vec![0x7D, 0x22, 0x5F, 0x7E]);
    }

    #[test]
    fn test_zero_byte_read_is_not_eof() {
        let mock = MockTransport::new();
        let mut link = FrameLink::new(Box::new(mock.clone()));

        assert!(link.poll_frame().unwrap().is_none());
        mock.inject_read(&frame::encode(&[0x10]));
        assert_eq!(link.poll_frame().unwrap(), Some(vec![0x10]));
    }

    #[test]
    fn test_reassembles_split_frame() {
        let mock = MockTransport::new();
        mock.set_read_chunk(3);
        mock.inject_read(&frame::encode(&[0x50, 0x7E, 0x01, 0x02]));
        let mut link = FrameLink::new(Box::new(mock));

        let payload = link.read_frame(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(payload, vec![0x50, 0x7E, 0x01, 0x02]);
        assert_eq!(link.buffered(), 0);
    }

    #[test]
    fn test_split_escape_in_small_reads() {
        let mock = MockTransport::new();
        mock.set_read_chunk(4);
        let mut bytes = frame::encode(&[0x02, 0x7E, 0x01]);
        bytes.extend(frame::encode(&[0x02, 0x7E, 0x7D, 0x10, 0x20]));
        mock.inject_read(&bytes);
        let mut link = FrameLink::new(Box::new(mock));

        let timeout = Some(Duration::from_millis(100));
        assert_eq!(link.read_frame(timeout).unwrap(), vec![0x02, 0x7E, 0x01]);
        assert_eq!(
            link.read_frame(timeout).unwrap(),
            vec![0x02, 0x7E, 0x7D, 0x10, 0x20]
        );
        assert_eq!(link.buffered(), 0);
    }

    #[test]
    fn test_quiet_line_finishes_esc_crc_frame() {
        let mock = MockTransport::new();
        mock.inject_read(&frame::encode(&[0x02]));
        let mut link = FrameLink::new(Box::new(mock));

        // First read leaves the frame open, the empty read that follows closes it
        assert_eq!(link.poll_frame().unwrap(), None);
        assert_eq!(link.poll_frame().unwrap(), Some(vec![0x02]));
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mock = MockTransport::new();
        let mut bytes = frame::encode(&[0x30, 0x10]);
        bytes.extend(frame::encode(&[0x30, 0x11]));
        mock.inject_read(&bytes);
        let mut link = FrameLink::new(Box::new(mock));

        assert_eq!(link.poll_frame().unwrap(), Some(vec![0x30, 0x10]));
        assert_eq!(link.poll_frame().unwrap(), Some(vec![0x30, 0x11]));
        assert_eq!(link.poll_frame().unwrap(), None);
    }

    #[test]
    fn test_resyncs_after_garbage() {
        let mock = MockTransport::new();
        let mut bytes = vec![0x00, 0x13];
        bytes.extend(frame::encode(&[0x10]));
        mock.inject_read(&bytes);
        let mut link = FrameLink::new(Box::new(mock));

        assert!(matches!(
            link.poll_frame(),
            Err(Error::Frame(FrameError::NoStartByte(0x00)))
        ));
        assert_eq!(link.poll_frame().unwrap(), Some(vec![0x10]));
    }

    #[test]
    fn test_read_frame_timeout() {
        let mut link = FrameLink::new(Box::new(MockTransport::new()));
        assert!(matches!(
            link.read_frame(Some(Duration::from_millis(5))),
            Err(Error::Timeout { .. })
        ));
    }

    #[test]
    fn test_transport_error_surfaces() {
        let mock = MockTransport::new();
        mock.fail_reads();
        let mut link = FrameLink::new(Box::new(mock));
        assert!(matches!(link.poll_frame(), Err(Error::Io(_))));
    }

    #[test]
    fn test_close_releases_transport() {
        let mock = MockTransport::new();
        let mut link = FrameLink::new(Box::new(mock.clone()));
        link.close().unwrap();
        assert!(mock.is_closed());
    }
}
