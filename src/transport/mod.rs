//! Transport layer for I/O abstraction
//!
//! The driver never opens or configures physical ports itself; callers hand
//! an opened duplex channel to [`crate::x2m200::Session::open`].

use crate::error::Result;

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Duplex byte channel to the module
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read.
    ///
    /// Returning `Ok(0)` means no data was ready yet; it is not end of stream.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Release the underlying channel
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
