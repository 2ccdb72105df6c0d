//! Ping and reset handshakes
//!
//! Both waits run on a worker thread raced against a timer. The transport
//! cannot cancel a read, so on timeout the worker is abandoned: it notices
//! the flag at its next poll or before its next write, and its result is
//! dropped. Commands the reset sends itself are bounded by the reset deadline.

use super::command::ModuleCommand;
use super::constants::{
    CMD_PING, MAX_RESET_RESENDS, PING_NOT_READY, PING_READY, PING_RESPONSE_LEN, POLL_INTERVAL,
};
use super::exchange;
use super::link::FrameLink;
use super::payload::{self, ApplicationPayload, SystemMessage};
use crate::config::BaseBandFeed;
use crate::error::{Error, PingError, Result};
use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Interpret a ping response payload.
///
/// `Ok(false)` means the module answered but is not ready yet.
pub fn parse_ping_response(response: &[u8]) -> std::result::Result<bool, PingError> {
    if response.len() < PING_RESPONSE_LEN {
        return Err(PingError::NotEnoughBytes(response.len()));
    }
    if response.len() > PING_RESPONSE_LEN {
        return Err(PingError::TooManyBytes(response.len()));
    }
    if response[0] != CMD_PING {
        return Err(PingError::WrongCommand(response[0]));
    }

    match u32::from_be_bytes([response[1], response[2], response[3], response[4]]) {
        PING_READY => Ok(true),
        PING_NOT_READY => Ok(false),
        other => Err(PingError::UnrecognisedResponse(other)),
    }
}

/// Send a ping and wait up to `timeout` for the reply
pub fn ping(link: &Arc<Mutex<FrameLink>>, timeout: Duration) -> Result<bool> {
    link.lock().send(&ModuleCommand::Ping.encode())?;

    let response = run_bounded("ping", link, timeout, move |link, abandoned| {
        next_frame(link, abandoned, "ping", timeout)
    })?;

    let ready = parse_ping_response(&response)?;
    log::info!("X2M200: ping answered, ready = {}", ready);
    Ok(ready)
}

/// Reset settings that do not change while the machine runs
#[derive(Debug, Clone, Copy)]
pub struct ResetParams {
    pub timeout: Duration,
    pub command_attempts: usize,
    pub response_timeout: Duration,
}

#[derive(Debug)]
enum ResetState {
    SendReset,
    AwaitResponse,
    Done,
    Failed(Error),
}

/// Reset the module and wait until it reports ready
pub fn reset(link: &Arc<Mutex<FrameLink>>, params: ResetParams) -> Result<bool> {
    log::info!("X2M200: resetting module");
    let ready = run_bounded("reset", link, params.timeout, move |link, abandoned| {
        run_reset(link, abandoned, params)
    })?;
    log::info!("X2M200: module ready after reset");
    Ok(ready)
}

fn run_reset(link: &Mutex<FrameLink>, abandoned: &AtomicBool, params: ResetParams) -> Result<bool> {
    let deadline = Instant::now() + params.timeout;
    let mut state = ResetState::SendReset;
    let mut resends = 0;

    loop {
        state = match state {
            ResetState::SendReset => {
                let mut link = link.lock();
                if abandoned.load(Ordering::Acquire) {
                    return Err(reset_timeout(params));
                }
                match link.send(&ModuleCommand::Reset.encode()) {
                    Ok(()) => ResetState::AwaitResponse,
                    Err(e) => ResetState::Failed(e),
                }
            }
            ResetState::AwaitResponse => {
                if abandoned.load(Ordering::Acquire) {
                    return Err(reset_timeout(params));
                }
                let polled = link.lock().poll_frame();
                match polled {
                    Ok(None) => {
                        thread::sleep(POLL_INTERVAL);
                        ResetState::AwaitResponse
                    }
                    Ok(Some(response)) => on_reset_response(
                        link,
                        abandoned,
                        &response,
                        &mut resends,
                        params,
                        deadline,
                    ),
                    Err(Error::Frame(e)) => {
                        // Line noise is common while the module reboots
                        log::warn!("X2M200: ignoring bad frame during reset: {}", e);
                        ResetState::AwaitResponse
                    }
                    Err(e) => ResetState::Failed(e),
                }
            }
            ResetState::Done => return Ok(true),
            ResetState::Failed(e) => return Err(e),
        };
    }
}

fn reset_timeout(params: ResetParams) -> Error {
    Error::Timeout {
        operation: "reset",
        after: params.timeout,
    }
}

fn on_reset_response(
    link: &Mutex<FrameLink>,
    abandoned: &AtomicBool,
    response: &[u8],
    resends: &mut usize,
    params: ResetParams,
    deadline: Instant,
) -> ResetState {
    match payload::classify(response) {
        Ok(ApplicationPayload::System(SystemMessage::Booting)) => {
            log::info!("X2M200: module booting");
            ResetState::AwaitResponse
        }
        Ok(ApplicationPayload::System(message)) => {
            log::debug!("X2M200: reset finished on {}", message);
            ResetState::Done
        }
        Ok(data) => {
            if *resends >= MAX_RESET_RESENDS {
                return ResetState::Failed(Error::ResetFailed(format!(
                    "{} feed still streaming after {} resets",
                    data.kind(),
                    resends
                )));
            }
            *resends += 1;
            log::warn!(
                "X2M200: {} feed still enabled, disabling before reset",
                data.kind()
            );
            let disable = disable_command(&data);
            let mut link = link.lock();
            if abandoned.load(Ordering::Acquire) {
                return ResetState::Failed(reset_timeout(params));
            }
            match exchange::execute_until(
                &mut link,
                &disable,
                params.command_attempts,
                params.response_timeout,
                deadline,
            ) {
                Ok(()) => ResetState::SendReset,
                // Out of reset time while waiting for the disable ack
                Err(Error::Timeout { .. }) => ResetState::Failed(reset_timeout(params)),
                Err(e) => ResetState::Failed(e),
            }
        }
        Err(e) => {
            log::debug!("X2M200: ignoring payload during reset: {}", e);
            ResetState::AwaitResponse
        }
    }
}

/// Command that stops the feed `data` came from
fn disable_command(data: &ApplicationPayload) -> ModuleCommand {
    match data {
        ApplicationPayload::BaseBandAmpPhase(_) | ApplicationPayload::BaseBandIq(_) => {
            ModuleCommand::BaseBandOutput(BaseBandFeed::Off)
        }
        _ => ModuleCommand::Stop,
    }
}

/// Poll for the next frame until one arrives or the wait is abandoned
fn next_frame(
    link: &Mutex<FrameLink>,
    abandoned: &AtomicBool,
    operation: &'static str,
    timeout: Duration,
) -> Result<Vec<u8>> {
    loop {
        if abandoned.load(Ordering::Acquire) {
            return Err(Error::Timeout {
                operation,
                after: timeout,
            });
        }
        if let Some(payload) = link.lock().poll_frame()? {
            return Ok(payload);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run `work` on a named worker thread and wait at most `timeout` for it
fn run_bounded<T, F>(
    operation: &'static str,
    link: &Arc<Mutex<FrameLink>>,
    timeout: Duration,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Mutex<FrameLink>, &AtomicBool) -> Result<T> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let abandoned = Arc::new(AtomicBool::new(false));

    let worker_link = Arc::clone(link);
    let worker_abandoned = Arc::clone(&abandoned);
    let _worker = thread::Builder::new()
        .name(format!("x2m200-{}", operation))
        .spawn(move || {
            let result = work(&*worker_link, &*worker_abandoned);
            if worker_abandoned.load(Ordering::Acquire) {
                log::debug!("X2M200: {} finished after its wait was abandoned", operation);
                return;
            }
            // Capacity 1 and a single send, so this never blocks
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            // Raised under the link lock so the worker cannot start another
            // write once the timeout has been reported
            let _link = link.lock();
            abandoned.store(true, Ordering::Release);
            log::warn!("X2M200: {} timed out after {:?}", operation, timeout);
            Err(Error::Timeout {
                operation,
                after: timeout,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerLost(operation)),
    }
}
