//! Constants for the X2M200 serial protocol

use std::time::Duration;

// Framing bytes
pub const START_BYTE: u8 = 0x7D;
pub const END_BYTE: u8 = 0x7E;
pub const ESC_BYTE: u8 = 0x7F;
pub const ERROR_BYTE: u8 = 0x20; // First payload byte of a module error response

// Bring-up commands
pub const CMD_PING: u8 = 0x01;
pub const PING_SEED: u32 = 0xEEAA_EAAE; // Big-endian on the wire
pub const PING_READY: u32 = 0xAAEE_AEEA;
pub const PING_NOT_READY: u32 = 0xAEEA_EEAA;
pub const CMD_RESET: u8 = 0x22;

// Responses
pub const ACK_BYTE: u8 = 0x10;
pub const SYSTEM_MESSAGE: u8 = 0x30;
pub const SYSTEM_BOOTING: u8 = 0x10;
pub const SYSTEM_READY: u8 = 0x11;

// Application data discriminators
pub const APP_DATA: u8 = 0x50;
pub const APP_RESPIRATION: u8 = 0x26;
pub const APP_SLEEP: u8 = 0x6C;
pub const APP_BASEBAND_AP: u8 = 0x0D;
pub const APP_BASEBAND_IQ: u8 = 0x0C;

// Configuration commands
pub const CMD_LOAD_APP: u8 = 0x21;
pub const CMD_LED_CONTROL: u8 = 0x24;
pub const CMD_APP_COMMAND: u8 = 0x10;
pub const APP_SET: u8 = 0x10;
pub const ID_DETECTION_ZONE: [u8; 4] = [0x1C, 0x0A, 0xA1, 0x96]; // 0x96A10A1C little-endian
pub const ID_SENSITIVITY: [u8; 4] = [0x2B, 0x11, 0xA5, 0x10]; // 0x10A5112B little-endian
pub const CMD_SET_MODE: u8 = 0x20;
pub const MODE_RUN: u8 = 0x01;
pub const MODE_IDLE: u8 = 0x11;
pub const CMD_DIRECT: u8 = 0x90;
pub const DIRECT_APP_SET_INT: u8 = 0x71;
// Output register ids as the module firmware expects them per feed
pub const SACR_OUTPUT_BASEBAND_AP: u32 = 0x10;
pub const SACR_OUTPUT_BASEBAND_IQ: u32 = 0x02;

// Application identifiers
pub const APP_ID_RESPIRATION: [u8; 4] = [0xD6, 0xA2, 0x23, 0x14];
pub const APP_ID_SLEEP: [u8; 4] = [0x17, 0x7B, 0xF1, 0x00];
pub const APP_ID_BASEBAND: [u8; 4] = [0x14, 0x23, 0xA2, 0xD6];

// Payload sizes
pub const RESPIRATION_LEN: usize = 29;
pub const SLEEP_LEN: usize = 33;
pub const BASEBAND_HEADER_LEN: usize = 29;
pub const PING_RESPONSE_LEN: usize = 5;

// Limits
pub const MAX_FRAME_LEN: usize = 8192; // Largest baseband frame is well under this
pub const READ_CHUNK: usize = 2048;
pub const MAX_SENSITIVITY: i32 = 9;
pub const COMMAND_READ_ATTEMPTS: usize = 20;
pub const MAX_RESET_RESENDS: usize = 3;

// Timing
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(5);
