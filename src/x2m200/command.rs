//! Outgoing X2M200 commands
//!
//! Each command encodes to a fixed payload which `frame::encode` then wraps.

use super::constants::{
    APP_SET, CMD_APP_COMMAND, CMD_DIRECT, CMD_LED_CONTROL, CMD_LOAD_APP, CMD_PING, CMD_RESET,
    CMD_SET_MODE, DIRECT_APP_SET_INT, ID_DETECTION_ZONE, ID_SENSITIVITY, MODE_IDLE, MODE_RUN,
    PING_SEED, SACR_OUTPUT_BASEBAND_AP, SACR_OUTPUT_BASEBAND_IQ,
};
use crate::config::{BaseBandFeed, LedMode};
use std::fmt;

/// Commands sent to the module
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModuleCommand {
    Ping,
    Reset,
    LoadApp([u8; 4]),
    SetLedMode(LedMode),
    SetDetectionZone { start: f32, end: f32 },
    /// Already clamped to 0..=9
    SetSensitivity(u32),
    BaseBandOutput(BaseBandFeed),
    /// Start the loaded application
    Run,
    /// Return the application to idle
    Stop,
}

impl ModuleCommand {
    /// Short operation name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            ModuleCommand::Ping => "ping",
            ModuleCommand::Reset => "reset",
            ModuleCommand::LoadApp(_) => "load application",
            ModuleCommand::SetLedMode(_) => "set LED mode",
            ModuleCommand::SetDetectionZone { .. } => "set detection zone",
            ModuleCommand::SetSensitivity(_) => "set sensitivity",
            ModuleCommand::BaseBandOutput(_) => "set baseband output",
            ModuleCommand::Run => "run application",
            ModuleCommand::Stop => "stop application",
        }
    }

    /// Payload bytes (before framing)
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ModuleCommand::Ping => {
                let mut payload = vec![CMD_PING];
                payload.extend_from_slice(&PING_SEED.to_be_bytes());
                payload
            }
            ModuleCommand::Reset => vec![CMD_RESET],
            ModuleCommand::LoadApp(app_id) => {
                let mut payload = vec![CMD_LOAD_APP];
                payload.extend_from_slice(&app_id);
                payload
            }
            ModuleCommand::SetLedMode(mode) => vec![CMD_LED_CONTROL, mode.as_byte(), 0x00],
            ModuleCommand::SetDetectionZone { start, end } => {
                let mut payload = vec![CMD_APP_COMMAND, APP_SET];
                payload.extend_from_slice(&ID_DETECTION_ZONE);
                payload.extend_from_slice(&start.to_le_bytes());
                payload.extend_from_slice(&end.to_le_bytes());
                payload
            }
            ModuleCommand::SetSensitivity(sensitivity) => {
                let mut payload = vec![CMD_APP_COMMAND, APP_SET];
                payload.extend_from_slice(&ID_SENSITIVITY);
                payload.extend_from_slice(&sensitivity.to_le_bytes());
                payload
            }
            ModuleCommand::BaseBandOutput(feed) => {
                let mut payload = vec![CMD_DIRECT, DIRECT_APP_SET_INT];
                let register = match feed {
                    BaseBandFeed::AmpPhase => SACR_OUTPUT_BASEBAND_AP,
                    // Disabling goes through the I/Q register
                    BaseBandFeed::Iq | BaseBandFeed::Off => SACR_OUTPUT_BASEBAND_IQ,
                };
                payload.extend_from_slice(&register.to_le_bytes());
                payload.extend_from_slice(&1u32.to_le_bytes()); // value count
                payload.extend_from_slice(&feed.code().to_le_bytes());
                payload
            }
            ModuleCommand::Run => vec![CMD_SET_MODE, MODE_RUN],
            ModuleCommand::Stop => vec![CMD_SET_MODE, MODE_IDLE],
        }
    }

    /// A load issued while the module boots is dropped, so it must be repeated
    pub fn resend_while_booting(&self) -> bool {
        matches!(self, ModuleCommand::LoadApp(_))
    }
}

/// Operation name with its parameters, e.g. "set detection zone 0.40 2.00"
impl fmt::Display for ModuleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleCommand::LoadApp(id) => write!(f, "{} {:02x?}", self.name(), id),
            ModuleCommand::SetLedMode(mode) => write!(f, "{} {:?}", self.name(), mode),
            ModuleCommand::SetDetectionZone { start, end } => {
                write!(f, "{} {:.2} {:.2}", self.name(), start, end)
            }
            ModuleCommand::SetSensitivity(s) => write!(f, "{} {}", self.name(), s),
            ModuleCommand::BaseBandOutput(feed) => write!(f, "{} {:?}", self.name(), feed),
            _ => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_encoding() {
        assert_eq!(
            ModuleCommand::Ping.encode(),
            vec![0x01, 0xEE, 0xAA, 0xEA, 0xAE]
        );
    }

    #[test]
    fn test_load_encoding() {
        let cmd = ModuleCommand::LoadApp([0xD6, 0xA2, 0x23, 0x14]);
        assert_eq!(cmd.encode(), vec![0x21, 0xD6, 0xA2, 0x23, 0x14]);
        assert!(cmd.resend_while_booting());
        assert!(!ModuleCommand::Reset.resend_while_booting());
    }

    #[test]
    fn test_led_encoding() {
        assert_eq!(
            ModuleCommand::SetLedMode(LedMode::Inhalation).encode(),
            vec![0x24, 0x03, 0x00]
        );
    }

    #[test]
    fn test_detection_zone_encoding() {
        let payload = ModuleCommand::SetDetectionZone {
            start: 0.5,
            end: 2.0,
        }
        .encode();
        assert_eq!(
            payload,
            vec![
                0x10, 0x10, 0x1C, 0x0A, 0xA1, 0x96, // zone command
                0x00, 0x00, 0x00, 0x3F, // 0.5
                0x00, 0x00, 0x00, 0x40, // 2.0
            ]
        );
    }

    #[test]
    fn test_sensitivity_encoding() {
        assert_eq!(
            ModuleCommand::SetSensitivity(9).encode(),
            vec![0x10, 0x10, 0x2B, 0x11, 0xA5, 0x10, 0x09, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_baseband_output_encoding() {
        let expected = |register: u8, code: u8| {
            vec![
                0x90, 0x71, register, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, code, 0x00, 0x00,
                0x00,
            ]
        };
        assert_eq!(
            ModuleCommand::BaseBandOutput(BaseBandFeed::Off).encode(),
            expected(0x02, 0)
        );
        assert_eq!(
            ModuleCommand::BaseBandOutput(BaseBandFeed::Iq).encode(),
            expected(0x02, 1)
        );
        assert_eq!(
            ModuleCommand::BaseBandOutput(BaseBandFeed::AmpPhase).encode(),
            expected(0x10, 2)
        );
    }

    #[test]
    fn test_mode_encoding() {
        assert_eq!(ModuleCommand::Run.encode(), vec![0x20, 0x01]);
        assert_eq!(ModuleCommand::Stop.encode(), vec![0x20, 0x11]);
    }

    #[test]
    fn test_display_names_parameters() {
        let cmd = ModuleCommand::SetDetectionZone {
            start: 0.4,
            end: 2.0,
        };
        assert_eq!(cmd.to_string(), "set detection zone 0.40 2.00");
        assert_eq!(ModuleCommand::SetSensitivity(3).to_string(), "set sensitivity 3");
    }
}
