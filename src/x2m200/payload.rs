//! Application payload decoding
//!
//! Payloads arrive unframed (start byte and CRC already stripped). Byte 0
//! selects the message family, byte 1 the application:
//!
//! | Bytes       | Payload                      | Length          |
//! |-------------|------------------------------|-----------------|
//! | `50 26`     | Respiration                  | 29              |
//! | `50 6C`     | Sleep                        | 33              |
//! | `50 0D`     | Baseband amplitude/phase     | 29 + bins * 8   |
//! | `50 0C`     | Baseband I/Q                 | 29 + bins * 8   |
//! | `30 10`     | System booting               |                 |
//! | `30 11`     | System ready                 |                 |
//! | `10`        | Command acknowledged         |                 |
//!
//! All multi-byte fields are little-endian. The status word spans bytes 1..5
//! and therefore includes the application discriminator.

use super::constants::{
    ACK_BYTE, APP_BASEBAND_AP, APP_BASEBAND_IQ, APP_DATA, APP_RESPIRATION, APP_SLEEP,
    BASEBAND_HEADER_LEN, RESPIRATION_LEN, SLEEP_LEN, SYSTEM_BOOTING, SYSTEM_MESSAGE, SYSTEM_READY,
};
use crate::error::DecodeError;
use serde::Serialize;
use std::fmt;

/// Sensor state reported by the respiration and sleep applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RespirationState {
    Breathing,
    Movement,
    Tracking,
    NoMovement,
    Initializing,
    Reserved,
    Unknown,
    Other(u32),
}

impl RespirationState {
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => RespirationState::Breathing,
            1 => RespirationState::Movement,
            2 => RespirationState::Tracking,
            3 => RespirationState::NoMovement,
            4 => RespirationState::Initializing,
            5 => RespirationState::Reserved,
            6 => RespirationState::Unknown,
            other => RespirationState::Other(other),
        }
    }
}

/// Respiration application output (29 bytes)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Respiration {
    pub status: u32,
    pub counter: u32,
    pub state: RespirationState,
    /// Breaths per minute
    pub rpm: u32,
    /// Distance to the tracked subject in metres
    pub distance: f32,
    pub movement: f32,
    pub signal_quality: u32,
}

/// Sleep application output (33 bytes)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sleep {
    pub status: u32,
    pub counter: u32,
    pub state: RespirationState,
    pub rpm: f32,
    pub distance: f32,
    pub signal_quality: u32,
    pub movement_slow: f32,
    pub movement_fast: f32,
}

/// Fixed 29-byte header shared by both baseband payloads
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaseBandHeader {
    pub status: u32,
    pub counter: u32,
    /// Number of range bins that follow in each channel
    pub bins: u32,
    pub bin_length: f32,
    pub sampling_frequency: f32,
    pub carrier_frequency: f32,
    pub range_offset: f32,
}

/// Baseband amplitude/phase output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseBandAmpPhase {
    #[serde(flatten)]
    pub header: BaseBandHeader,
    pub amplitude: Vec<f32>,
    pub phase: Vec<f32>,
}

/// Baseband in-phase/quadrature output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseBandIq {
    #[serde(flatten)]
    pub header: BaseBandHeader,
    pub i: Vec<f32>,
    pub q: Vec<f32>,
}

/// System message from the module firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessage {
    Booting,
    Ready,
    /// Last configuration command accepted
    Acknowledged,
}

impl fmt::Display for SystemMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemMessage::Booting => write!(f, "booting"),
            SystemMessage::Ready => write!(f, "ready"),
            SystemMessage::Acknowledged => write!(f, "acknowledged"),
        }
    }
}

/// Decoded payload received from the module
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ApplicationPayload {
    Respiration(Respiration),
    Sleep(Sleep),
    BaseBandAmpPhase(BaseBandAmpPhase),
    BaseBandIq(BaseBandIq),
    System(SystemMessage),
}

impl ApplicationPayload {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApplicationPayload::Respiration(_) => "respiration",
            ApplicationPayload::Sleep(_) => "sleep",
            ApplicationPayload::BaseBandAmpPhase(_) => "baseband amplitude/phase",
            ApplicationPayload::BaseBandIq(_) => "baseband iq",
            ApplicationPayload::System(_) => "system message",
        }
    }
}

/// Classify and decode an unframed payload
pub fn classify(bytes: &[u8]) -> Result<ApplicationPayload, DecodeError> {
    let Some(&family) = bytes.first() else {
        return Err(DecodeError::NoData);
    };

    match (family, bytes.get(1).copied()) {
        (APP_DATA, Some(APP_RESPIRATION)) => {
            parse_respiration(bytes).map(ApplicationPayload::Respiration)
        }
        (APP_DATA, Some(APP_SLEEP)) => parse_sleep(bytes).map(ApplicationPayload::Sleep),
        (APP_DATA, Some(APP_BASEBAND_AP)) => {
            parse_baseband_amp_phase(bytes).map(ApplicationPayload::BaseBandAmpPhase)
        }
        (APP_DATA, Some(APP_BASEBAND_IQ)) => {
            parse_baseband_iq(bytes).map(ApplicationPayload::BaseBandIq)
        }
        (SYSTEM_MESSAGE, Some(SYSTEM_BOOTING)) => {
            Ok(ApplicationPayload::System(SystemMessage::Booting))
        }
        (SYSTEM_MESSAGE, Some(SYSTEM_READY)) => Ok(ApplicationPayload::System(SystemMessage::Ready)),
        (ACK_BYTE, _) => Ok(ApplicationPayload::System(SystemMessage::Acknowledged)),
        _ => Err(DecodeError::NotImplemented(bytes.to_vec())),
    }
}

/// Decode a respiration payload (exactly 29 bytes)
pub fn parse_respiration(b: &[u8]) -> Result<Respiration, DecodeError> {
    check_exact_len("respiration", b, RESPIRATION_LEN)?;

    Ok(Respiration {
        status: read_u32(b, 1),
        counter: read_u32(b, 5),
        state: RespirationState::from_raw(read_u32(b, 9)),
        rpm: read_u32(b, 13),
        distance: read_f32(b, 17),
        movement: read_f32(b, 21),
        signal_quality: read_u32(b, 25),
    })
}

/// Decode a sleep payload (exactly 33 bytes)
pub fn parse_sleep(b: &[u8]) -> Result<Sleep, DecodeError> {
    check_exact_len("sleep", b, SLEEP_LEN)?;

    Ok(Sleep {
        status: read_u32(b, 1),
        counter: read_u32(b, 5),
        state: RespirationState::from_raw(read_u32(b, 9)),
        rpm: read_f32(b, 13),
        distance: read_f32(b, 17),
        signal_quality: read_u32(b, 21),
        movement_slow: read_f32(b, 25),
        movement_fast: read_f32(b, 29),
    })
}

/// Decode a baseband amplitude/phase payload
pub fn parse_baseband_amp_phase(b: &[u8]) -> Result<BaseBandAmpPhase, DecodeError> {
    let (header, amplitude, phase) = parse_baseband("baseband amplitude/phase", b)?;
    Ok(BaseBandAmpPhase {
        header,
        amplitude,
        phase,
    })
}

/// Decode a baseband I/Q payload
pub fn parse_baseband_iq(b: &[u8]) -> Result<BaseBandIq, DecodeError> {
    let (header, i, q) = parse_baseband("baseband iq", b)?;
    Ok(BaseBandIq { header, i, q })
}

/// Header followed by `bins` samples of the first channel, then `bins` of the second
fn parse_baseband(
    kind: &'static str,
    b: &[u8],
) -> Result<(BaseBandHeader, Vec<f32>, Vec<f32>), DecodeError> {
    if b.len() < BASEBAND_HEADER_LEN {
        return Err(DecodeError::NotEnoughBytes {
            kind,
            expected: BASEBAND_HEADER_LEN,
            actual: b.len(),
        });
    }

    let header = BaseBandHeader {
        status: read_u32(b, 1),
        counter: read_u32(b, 5),
        bins: read_u32(b, 9),
        bin_length: read_f32(b, 13),
        sampling_frequency: read_f32(b, 17),
        carrier_frequency: read_f32(b, 21),
        range_offset: read_f32(b, 25),
    };

    let bins = header.bins as usize;
    let needed = bins
        .checked_mul(8)
        .and_then(|n| n.checked_add(BASEBAND_HEADER_LEN))
        .unwrap_or(usize::MAX);
    if b.len() < needed {
        return Err(DecodeError::IncompletePacket {
            kind,
            header,
            needed,
            actual: b.len(),
        });
    }
    if b.len() > needed {
        log::trace!("{}: ignoring {} trailing bytes", kind, b.len() - needed);
    }

    let first_start = BASEBAND_HEADER_LEN;
    let second_start = first_start + bins * 4;
    let first = (0..bins).map(|n| read_f32(b, first_start + n * 4)).collect();
    let second = (0..bins).map(|n| read_f32(b, second_start + n * 4)).collect();

    Ok((header, first, second))
}

fn check_exact_len(kind: &'static str, b: &[u8], expected: usize) -> Result<(), DecodeError> {
    if b.len() < expected {
        return Err(DecodeError::NotEnoughBytes {
            kind,
            expected,
            actual: b.len(),
        });
    }
    if b.len() > expected {
        return Err(DecodeError::TrailingBytes {
            kind,
            expected,
            actual: b.len(),
        });
    }
    Ok(())
}

/// Read a little-endian u32; callers have checked the length
#[inline]
fn read_u32(b: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]])
}

#[inline]
fn read_f32(b: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(b, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respiration_fixture() -> Vec<u8> {
        let mut b = vec![0x50, 0x26, 0xFE, 0x75, 0x23];
        b.resize(RESPIRATION_LEN, 0x00);
        b
    }

    fn baseband_header(discriminator: u8, bins: u32) -> Vec<u8> {
        let mut b = vec![0x50, discriminator, 0x00, 0x00, 0x00];
        b.extend_from_slice(&1000u32.to_le_bytes()); // counter
        b.extend_from_slice(&bins.to_le_bytes());
        b.extend_from_slice(&1.0f32.to_le_bytes()); // bin length
        b.extend_from_slice(&10.0f32.to_le_bytes()); // sampling frequency
        b.extend_from_slice(&100.0f32.to_le_bytes()); // carrier frequency
        b.extend_from_slice(&300.0f32.to_le_bytes()); // range offset
        b
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(&[]), Err(DecodeError::NoData));
    }

    #[test]
    fn test_respiration_fixture() {
        let payload = classify(&respiration_fixture()).unwrap();
        assert_eq!(
            payload,
            ApplicationPayload::Respiration(Respiration {
                status: 0x2375_FE26,
                counter: 0,
                state: RespirationState::Breathing,
                rpm: 0,
                distance: 0.0,
                movement: 0.0,
                signal_quality: 0,
            })
        );
    }

    #[test]
    fn test_respiration_fields() {
        let mut b = respiration_fixture();
        b[5..9].copy_from_slice(&42u32.to_le_bytes());
        b[9..13].copy_from_slice(&2u32.to_le_bytes());
        b[13..17].copy_from_slice(&14u32.to_le_bytes());
        b[17..21].copy_from_slice(&1.25f32.to_le_bytes());
        b[21..25].copy_from_slice(&0.5f32.to_le_bytes());
        b[25..29].copy_from_slice(&8u32.to_le_bytes());

        let resp = parse_respiration(&b).unwrap();
        assert_eq!(resp.counter, 42);
        assert_eq!(resp.state, RespirationState::Tracking);
        assert_eq!(resp.rpm, 14);
        assert_eq!(resp.distance, 1.25);
        assert_eq!(resp.movement, 0.5);
        assert_eq!(resp.signal_quality, 8);
    }

    #[test]
    fn test_respiration_wrong_length() {
        let full = respiration_fixture();
        for len in 2..RESPIRATION_LEN {
            assert!(matches!(
                parse_respiration(&full[..len]),
                Err(DecodeError::NotEnoughBytes { expected: 29, .. })
            ));
        }

        let mut long = full.clone();
        long.push(0x00);
        assert!(matches!(
            parse_respiration(&long),
            Err(DecodeError::TrailingBytes { actual: 30, .. })
        ));
    }

    #[test]
    fn test_sleep_fixture() {
        let mut b = vec![0x50, 0x6C, 0xA1, 0x75, 0x23];
        b.resize(SLEEP_LEN, 0x00);
        b[13..17].copy_from_slice(&12.5f32.to_le_bytes());
        b[21..25].copy_from_slice(&7u32.to_le_bytes());
        b[29..33].copy_from_slice(&0.75f32.to_le_bytes());

        match classify(&b).unwrap() {
            ApplicationPayload::Sleep(sleep) => {
                assert_eq!(sleep.status, 0x2375_A16C);
                assert_eq!(sleep.rpm, 12.5);
                assert_eq!(sleep.signal_quality, 7);
                assert_eq!(sleep.movement_slow, 0.0);
                assert_eq!(sleep.movement_fast, 0.75);
            }
            other => panic!("expected sleep, got {:?}", other),
        }
    }

    #[test]
    fn test_sleep_too_short() {
        assert!(matches!(
            classify(&[0x50, 0x6C]),
            Err(DecodeError::NotEnoughBytes { kind: "sleep", .. })
        ));
    }

    #[test]
    fn test_baseband_header_only_is_incomplete() {
        let b = baseband_header(APP_BASEBAND_AP, 1);
        assert_eq!(b.len(), BASEBAND_HEADER_LEN);

        match classify(&b) {
            Err(DecodeError::IncompletePacket {
                header,
                needed,
                actual,
                ..
            }) => {
                assert_eq!(header.bins, 1);
                assert_eq!(header.counter, 1000);
                assert_eq!(needed, 37);
                assert_eq!(actual, 29);
            }
            other => panic!("expected incomplete packet, got {:?}", other),
        }
    }

    #[test]
    fn test_baseband_zero_bins() {
        let b = baseband_header(APP_BASEBAND_IQ, 0);
        match classify(&b).unwrap() {
            ApplicationPayload::BaseBandIq(iq) => {
                assert_eq!(iq.header.bins, 0);
                assert!(iq.i.is_empty());
                assert!(iq.q.is_empty());
            }
            other => panic!("expected baseband iq, got {:?}", other),
        }
    }

    #[test]
    fn test_baseband_amp_phase_samples() {
        let mut b = baseband_header(APP_BASEBAND_AP, 2);
        for value in [1.0f32, 2.0, -0.5, 0.25] {
            b.extend_from_slice(&value.to_le_bytes());
        }

        let ap = parse_baseband_amp_phase(&b).unwrap();
        assert_eq!(ap.header.bins, 2);
        assert_eq!(ap.header.sampling_frequency, 10.0);
        assert_eq!(ap.header.range_offset, 300.0);
        assert_eq!(ap.amplitude, vec![1.0, 2.0]);
        assert_eq!(ap.phase, vec![-0.5, 0.25]);
    }

    #[test]
    fn test_baseband_short_header() {
        assert!(matches!(
            classify(&[0x50, 0x0C]),
            Err(DecodeError::NotEnoughBytes {
                expected: 29,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_huge_bin_count_is_incomplete() {
        let b = baseband_header(APP_BASEBAND_IQ, u32::MAX);
        assert!(matches!(
            classify(&b),
            Err(DecodeError::IncompletePacket { .. })
        ));
    }

    #[test]
    fn test_system_messages() {
        assert_eq!(
            classify(&[0x30, 0x10]).unwrap(),
            ApplicationPayload::System(SystemMessage::Booting)
        );
        assert_eq!(
            classify(&[0x30, 0x11]).unwrap(),
            ApplicationPayload::System(SystemMessage::Ready)
        );
        assert_eq!(
            classify(&[0x10]).unwrap(),
            ApplicationPayload::System(SystemMessage::Acknowledged)
        );
    }

    #[test]
    fn test_unknown_payloads_not_implemented() {
        assert_eq!(
            classify(&[0x50, 0x00]),
            Err(DecodeError::NotImplemented(vec![0x50, 0x00]))
        );
        assert_eq!(
            classify(&[0x30, 0x99]),
            Err(DecodeError::NotImplemented(vec![0x30, 0x99]))
        );
        assert_eq!(
            classify(&[0xFF, 0x01, 0x02]),
            Err(DecodeError::NotImplemented(vec![0xFF, 0x01, 0x02]))
        );
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(RespirationState::from_raw(3), RespirationState::NoMovement);
        assert_eq!(RespirationState::from_raw(6), RespirationState::Unknown);
        assert_eq!(RespirationState::from_raw(7), RespirationState::Other(7));
    }
}
