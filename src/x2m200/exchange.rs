//! Command/acknowledgement exchange
//!
//! A configuration command is written once, then responses are read until the
//! module acknowledges it. Application data and boot messages that arrive in
//! between are discarded. Framing, module-reported and transport errors end
//! the exchange immediately.

use super::command::ModuleCommand;
use super::link::FrameLink;
use super::payload::{self, ApplicationPayload, SystemMessage};
use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// Send `command` and wait for its acknowledgement.
///
/// Each read waits at most `response_timeout`; at most `attempts` responses
/// are examined before the command is declared failed.
pub fn execute(
    link: &mut FrameLink,
    command: &ModuleCommand,
    attempts: usize,
    response_timeout: Duration,
) -> Result<()> {
    exchange(link, command, attempts, response_timeout, None)
}

/// Like [`execute`], but no read waits past `deadline`
pub fn execute_until(
    link: &mut FrameLink,
    command: &ModuleCommand,
    attempts: usize,
    response_timeout: Duration,
    deadline: Instant,
) -> Result<()> {
    exchange(link, command, attempts, response_timeout, Some(deadline))
}

fn exchange(
    link: &mut FrameLink,
    command: &ModuleCommand,
    attempts: usize,
    response_timeout: Duration,
    deadline: Option<Instant>,
) -> Result<()> {
    log::debug!("X2M200: {}", command);
    link.send(&command.encode())?;

    let mut booting_seen = 0;
    for attempt in 1..=attempts {
        let wait = match deadline {
            Some(deadline) => {
                response_timeout.min(deadline.saturating_duration_since(Instant::now()))
            }
            None => response_timeout,
        };
        let response = link
            .read_frame(Some(wait))
            .map_err(|e| match e {
                Error::Timeout { after, .. } => Error::Timeout {
                    operation: command.name(),
                    after,
                },
                other => other,
            })?;

        match payload::classify(&response) {
            Ok(ApplicationPayload::System(SystemMessage::Acknowledged)) => {
                log::debug!("X2M200: {} acknowledged (read {})", command, attempt);
                return Ok(());
            }
            Ok(ApplicationPayload::System(SystemMessage::Booting)) => {
                booting_seen += 1;
                if command.resend_while_booting() && booting_seen > 1 {
                    log::info!("X2M200: module still booting, resending {}", command.name());
                    link.send(&command.encode())?;
                }
            }
            Ok(other) => {
                log::trace!(
                    "X2M200: discarding {} while waiting for {} ack",
                    other.kind(),
                    command.name()
                );
            }
            Err(e) => {
                log::debug!(
                    "X2M200: discarding payload while waiting for {} ack: {}",
                    command.name(),
                    e
                );
            }
        }
    }

    log::warn!("X2M200: {} not acknowledged after {} reads", command, attempts);
    Err(Error::CommandFailed {
        operation: command.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedMode;
    use crate::error::ProtocolErrorCode;
    use crate::transport::MockTransport;
    use crate::x2m200::frame;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn link_with(mock: &MockTransport) -> FrameLink {
        FrameLink::new(Box::new(mock.clone()))
    }

    #[test]
    fn test_ack_completes_command() {
        let mock = MockTransport::new();
        mock.queue_reply(&frame::encode(&[0x10]));
        let mut link = link_with(&mock);

        let cmd = ModuleCommand::SetLedMode(LedMode::Simple);
        execute(&mut link, &cmd, 20, TIMEOUT).unwrap();
        assert_eq!(mock.get_written(), frame::encode(&[0x24, 0x01, 0x00]));
    }

    #[test]
    fn test_app_data_discarded_before_ack() {
        let mock = MockTransport::new();
        let mut respiration = vec![0x50, 0x26];
        respiration.resize(29, 0x00);
        let mut reply = frame::encode(&respiration);
        reply.extend(frame::encode(&[0x30, 0x11]));
        reply.extend(frame::encode(&[0x10]));
        mock.queue_reply(&reply);
        let mut link = link_with(&mock);

        execute(&mut link, &ModuleCommand::SetSensitivity(4), 20, TIMEOUT).unwrap();
        // Sent once, never repeated
        assert_eq!(mock.get_written(), frame::encode(&ModuleCommand::SetSensitivity(4).encode()));
    }

    #[test]
    fn test_exhausted_attempts_fail() {
        let mock = MockTransport::new();
        let mut reply = Vec::new();
        for _ in 0..3 {
            reply.extend(frame::encode(&[0x30, 0x11]));
        }
        mock.queue_reply(&reply);
        let mut link = link_with(&mock);

        let cmd = ModuleCommand::SetDetectionZone {
            start: 0.5,
            end: 1.5,
        };
        match execute(&mut link, &cmd, 3, TIMEOUT) {
            Err(Error::CommandFailed {
                operation,
                attempts,
            }) => {
                assert_eq!(operation, "set detection zone 0.50 1.50");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_protocol_error_surfaces() {
        let mock = MockTransport::new();
        mock.queue_reply(&frame::encode(&[0x20, 0x03]));
        let mut link = link_with(&mock);

        let result = execute(&mut link, &ModuleCommand::LoadApp([0; 4]), 20, TIMEOUT);
        assert!(matches!(
            result,
            Err(Error::Protocol {
                code: ProtocolErrorCode::InvalidAppId,
                ..
            })
        ));
    }

    #[test]
    fn test_load_resent_while_booting() {
        let mock = MockTransport::new();
        let mut booting = frame::encode(&[0x30, 0x10]);
        booting.extend(frame::encode(&[0x30, 0x10]));
        mock.queue_reply(&booting);
        mock.queue_reply(&frame::encode(&[0x10]));
        let mut link = link_with(&mock);

        let cmd = ModuleCommand::LoadApp([0x17, 0x7B, 0xF1, 0x00]);
        execute(&mut link, &cmd, 20, TIMEOUT).unwrap();

        let once = frame::encode(&cmd.encode());
        let mut twice = once.clone();
        twice.extend(&once);
        assert_eq!(mock.get_written(), twice);
    }

    #[test]
    fn test_deadline_caps_response_wait() {
        let mut link = link_with(&MockTransport::new());
        let started = Instant::now();
        let deadline = started + Duration::from_millis(20);

        let result = execute_until(
            &mut link,
            &ModuleCommand::Stop,
            20,
            Duration::from_secs(5),
            deadline,
        );
        assert!(matches!(
            result,
            Err(Error::Timeout {
                operation: "stop application",
                ..
            })
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_silence_times_out_with_operation_name() {
        let mut link = link_with(&MockTransport::new());
        match execute(&mut link, &ModuleCommand::Stop, 20, Duration::from_millis(5)) {
            Err(Error::Timeout { operation, .. }) => assert_eq!(operation, "stop application"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
