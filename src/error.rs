//! Error types for the X2M200 driver

use std::fmt;
use std::time::Duration;

use crate::x2m200::payload::BaseBandHeader;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error code carried by a module response whose first byte is the error indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorCode {
    /// Command not recognised by the module (0x01)
    NotRecognised,
    /// Module rejected our checksum (0x02)
    CrcFailed,
    /// Load requested an application the module does not carry (0x03)
    InvalidAppId,
    /// Any other code byte
    Unknown(u8),
}

impl ProtocolErrorCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => ProtocolErrorCode::NotRecognised,
            0x02 => ProtocolErrorCode::CrcFailed,
            0x03 => ProtocolErrorCode::InvalidAppId,
            other => ProtocolErrorCode::Unknown(other),
        }
    }
}

impl fmt::Display for ProtocolErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolErrorCode::NotRecognised => write!(f, "command not recognised"),
            ProtocolErrorCode::CrcFailed => write!(f, "command checksum failed"),
            ProtocolErrorCode::InvalidAppId => write!(f, "invalid application id"),
            ProtocolErrorCode::Unknown(code) => write!(f, "unknown error code {:#04x}", code),
        }
    }
}

/// Framing errors raised while isolating a frame from the byte stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Buffer did not begin with the start byte
    #[error("Frame does not begin with start byte (got {0:#04x})")]
    NoStartByte(u8),

    /// No terminator found within the maximum frame length
    #[error("Frame has no end byte")]
    NoEndByte,

    /// Checksum mismatch
    #[error("Checksum error: expected {expected:#04x}, got {actual:#04x}")]
    BadCrc {
        /// Checksum computed over the received bytes
        expected: u8,
        /// Checksum byte carried by the frame
        actual: u8,
    },

    /// Terminated frame too short to carry a checksum
    #[error("Frame too short ({0} bytes)")]
    Runt(usize),

    /// Candidate frame is incomplete and needs more bytes
    #[error("Frame candidate is incomplete")]
    NotLongEnough,
}

/// Errors raised while decoding an unframed payload
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("No data to decode")]
    NoData,

    /// Payload with an unknown discriminator, raw bytes kept for diagnostics
    #[error("Payload not implemented: {0:02X?}")]
    NotImplemented(Vec<u8>),

    #[error("{kind}: not enough bytes (expected {expected}, got {actual})")]
    NotEnoughBytes {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{kind}: unexpected trailing bytes (expected {expected}, got {actual})")]
    TrailingBytes {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Baseband packet shorter than its bin count requires.
    ///
    /// The header fields are valid and kept so callers can still inspect `bins`.
    #[error("{kind}: incomplete packet ({} bins need {needed} bytes, got {actual})", .header.bins)]
    IncompletePacket {
        kind: &'static str,
        header: BaseBandHeader,
        needed: usize,
        actual: usize,
    },
}

/// Ping response validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PingError {
    #[error("Ping response too short ({0} bytes)")]
    NotEnoughBytes(usize),

    #[error("Ping response too long ({0} bytes)")]
    TooManyBytes(usize),

    #[error("Ping response has wrong command byte {0:#04x}")]
    WrongCommand(u8),

    #[error("Ping response {0:#010x} not recognised")]
    UnrecognisedResponse(u32),
}

/// X2M200 driver error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Error response reported by the module
    #[error("Module reported {code} (payload {payload:02X?})")]
    Protocol {
        code: ProtocolErrorCode,
        /// Payload with the start byte stripped
        payload: Vec<u8>,
    },

    /// Payload decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Ping response could not be interpreted
    #[error("Ping error: {0}")]
    Ping(#[from] PingError),

    /// Bounded wait exceeded
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// No acknowledgement within the read budget
    #[error("Failed to {operation}: no acknowledgement after {attempts} reads")]
    CommandFailed { operation: String, attempts: usize },

    /// Reset could not bring the module to a ready state
    #[error("Reset failed: {0}")]
    ResetFailed(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Worker thread ended without reporting a result
    #[error("{0} worker exited without a result")]
    WorkerLost(&'static str),

    /// Transport already closed
    #[error("Transport closed")]
    Closed,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
