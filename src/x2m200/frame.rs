//! X2M200 frame codec
//!
//! Frame format: [0x7D] [PAYLOAD...] [CRC] [0x7E]
//!
//! - CRC: XOR of the start byte and every payload byte, taken before escaping
//! - Payload bytes equal to 0x7E are preceded by 0x7F on the wire; no other
//!   byte is escaped
//! - The CRC byte is written as-is, so it may itself be 0x7E or 0x7F
//!
//! `decode` works on the front of a receive buffer and reports how many bytes
//! it used, so partial frames can be completed by later reads.
//!
//! Because the CRC is unescaped, `7F 7E` is either an escaped payload END or
//! an ESC-valued CRC followed by the terminator. The decoder keeps reading
//! and only closes the frame at the ESC when a valid frame starts right after
//! it, when the longer reading fails its CRC, or when the caller says no more
//! bytes are coming (`decode_complete`).

use super::constants::{END_BYTE, ERROR_BYTE, ESC_BYTE, MAX_FRAME_LEN, START_BYTE};
use crate::error::{Error, FrameError, ProtocolErrorCode, Result};

/// Smallest buffer that can hold a frame: START + CRC + END
const MIN_FRAME_LEN: usize = 3;

/// XOR checksum
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &b| acc ^ b)
}

/// Encode a command payload into a wire frame
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(START_BYTE);

    let mut crc = START_BYTE;
    for &byte in payload {
        crc ^= byte;
        if byte == END_BYTE {
            frame.push(ESC_BYTE);
        }
        frame.push(byte);
    }

    frame.push(crc);
    frame.push(END_BYTE);
    frame
}

/// Outcome of decoding the front of a receive buffer
#[derive(Debug)]
pub enum Decoded {
    /// No complete frame yet; append more bytes and retry
    Incomplete,
    /// A frame (or leading garbage) was isolated
    Frame {
        /// Bytes to drop from the front of the buffer
        consumed: usize,
        /// Payload with start byte and CRC stripped
        result: Result<Vec<u8>>,
    },
}

/// Decode the first frame in `buf`, which may still be growing
pub fn decode(buf: &[u8]) -> Decoded {
    scan(buf, false, 0)
}

/// Decode the first frame in `buf` knowing nothing more will be appended
pub fn decode_complete(buf: &[u8]) -> Decoded {
    scan(buf, true, 0)
}

/// Decode a buffer holding exactly one complete frame
pub fn decode_frame(frame: &[u8]) -> Result<Vec<u8>> {
    match decode_complete(frame) {
        Decoded::Incomplete => Err(FrameError::NotLongEnough.into()),
        Decoded::Frame { result, .. } => result,
    }
}

/// Frames following an ESC-valued CRC that are checked before splitting there
const MAX_LOOKAHEAD: usize = 4;

fn scan(buf: &[u8], at_end: bool, depth: usize) -> Decoded {
    let Some(&first) = buf.first() else {
        return Decoded::Incomplete;
    };
    if first != START_BYTE {
        let skip = buf
            .iter()
            .position(|&b| b == START_BYTE)
            .unwrap_or(buf.len());
        return Decoded::Frame {
            consumed: skip,
            result: Err(FrameError::NoStartByte(first).into()),
        };
    }
    if buf.len() < MIN_FRAME_LEN {
        return Decoded::Incomplete;
    }

    let mut unescaped = Vec::with_capacity(buf.len());
    unescaped.push(START_BYTE);
    let mut escaping = false;
    // Last place where ESC could have been the CRC: (unescaped length, consumed)
    let mut split: Option<(usize, usize)> = None;

    for (index, &byte) in buf.iter().enumerate().skip(1) {
        let next = buf.get(index + 1).copied();

        if escaping {
            escaping = false;
            if byte == END_BYTE {
                let crc = checksum(&unescaped);
                // Literal ESC in the payload followed by an END-valued CRC
                if crc ^ ESC_BYTE == END_BYTE {
                    match next {
                        None if !at_end => return Decoded::Incomplete,
                        Some(END_BYTE) => {
                            unescaped.extend_from_slice(&[ESC_BYTE, END_BYTE]);
                            return finish(unescaped, index + 2);
                        }
                        _ => {}
                    }
                }
                // ESC may be the CRC with this END closing the frame, or an
                // escaped END in the payload. The longer reading wins unless
                // a valid frame starts right after.
                if crc == ESC_BYTE {
                    match next {
                        None if !at_end => return Decoded::Incomplete,
                        None => {
                            unescaped.push(ESC_BYTE);
                            return finish(unescaped, index + 1);
                        }
                        Some(START_BYTE) => match frame_follows(&buf[index + 1..], at_end, depth) {
                            None => return Decoded::Incomplete,
                            Some(true) => {
                                unescaped.push(ESC_BYTE);
                                return finish(unescaped, index + 1);
                            }
                            Some(false) => split = Some((unescaped.len(), index + 1)),
                        },
                        Some(_) => {}
                    }
                }
                unescaped.push(END_BYTE);
                continue;
            }
            unescaped.push(ESC_BYTE);
        }

        match byte {
            ESC_BYTE => escaping = true,
            END_BYTE => {
                let mut consumed = index + 1;
                // An END-valued CRC is sent unescaped, so the real terminator follows it
                if !crc_matches(&unescaped) && checksum(&unescaped) == END_BYTE {
                    match next {
                        None if !at_end => return Decoded::Incomplete,
                        Some(END_BYTE) => {
                            unescaped.push(END_BYTE);
                            consumed = index + 2;
                        }
                        _ => {}
                    }
                }
                let result = validate(&unescaped);
                if let (Err(Error::Frame(_)), Some(point)) = (&result, split) {
                    return split_at(unescaped, point);
                }
                return Decoded::Frame { consumed, result };
            }
            _ => unescaped.push(byte),
        }
    }

    if let Some(point) = split {
        if at_end || buf.len() > MAX_FRAME_LEN {
            return split_at(unescaped, point);
        }
    }
    if buf.len() > MAX_FRAME_LEN {
        // Drop the start byte so the caller resyncs on the next one
        return Decoded::Frame {
            consumed: 1,
            result: Err(FrameError::NoEndByte.into()),
        };
    }
    Decoded::Incomplete
}

/// Whether `rest` opens with a frame that passes its CRC; `None` until enough
/// bytes have arrived to tell
fn frame_follows(rest: &[u8], at_end: bool, depth: usize) -> Option<bool> {
    if depth >= MAX_LOOKAHEAD {
        return Some(false);
    }
    match scan(rest, at_end, depth + 1) {
        Decoded::Incomplete if at_end => Some(false),
        Decoded::Incomplete => None,
        Decoded::Frame { result, .. } => Some(!matches!(result, Err(Error::Frame(_)))),
    }
}

/// Close the frame at an earlier ESC-valued CRC
fn split_at(mut unescaped: Vec<u8>, (len, consumed): (usize, usize)) -> Decoded {
    unescaped.truncate(len);
    unescaped.push(ESC_BYTE);
    finish(unescaped, consumed)
}

/// Last byte of `frame` is the XOR of everything before it
fn crc_matches(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&crc, body)) if !body.is_empty() => checksum(body) == crc,
        _ => false,
    }
}

fn finish(frame: Vec<u8>, consumed: usize) -> Decoded {
    Decoded::Frame {
        consumed,
        result: validate(&frame),
    }
}

/// Verify CRC, strip START and CRC, and surface module error responses
fn validate(frame: &[u8]) -> Result<Vec<u8>> {
    let (actual, body) = match frame.split_last() {
        Some((&crc, body)) if !body.is_empty() => (crc, body),
        _ => return Err(FrameError::Runt(frame.len()).into()),
    };

    let expected = checksum(body);
    if expected != actual {
        return Err(FrameError::BadCrc { expected, actual }.into());
    }

    let payload = body[1..].to_vec();
    if payload.first() == Some(&ERROR_BYTE) {
        let code = ProtocolErrorCode::from_byte(payload.get(1).copied().unwrap_or(0));
        return Err(Error::Protocol { code, payload });
    }
    Ok(payload)
}
