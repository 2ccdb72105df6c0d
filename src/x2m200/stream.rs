//! Streaming session
//!
//! After configuration the module pushes application data continuously.
//! `PayloadStream` turns it into a lazy, non-restartable sequence: frames that
//! fail to decode are logged and skipped, a transport failure ends the
//! sequence and is kept for the caller.

use super::command::ModuleCommand;
use super::constants::POLL_INTERVAL;
use super::link::FrameLink;
use super::payload::{self, ApplicationPayload};
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

/// Decoded payloads from a running module
pub struct PayloadStream {
    link: Arc<Mutex<FrameLink>>,
    error: Option<Error>,
    finished: bool,
    received: u64,
    skipped: u64,
}

impl PayloadStream {
    /// Put the loaded application in run mode and start reading
    pub(crate) fn start(link: Arc<Mutex<FrameLink>>) -> Result<Self> {
        link.lock().send(&ModuleCommand::Run.encode())?;
        log::info!("X2M200: application running");

        Ok(Self {
            link,
            error: None,
            finished: false,
            received: 0,
            skipped: 0,
        })
    }

    /// Non-blocking step.
    ///
    /// Returns `None` when no complete payload is ready yet, or when the stream
    /// has ended (see [`PayloadStream::is_finished`]).
    pub fn try_next(&mut self) -> Option<ApplicationPayload> {
        if self.finished {
            return None;
        }

        loop {
            let polled = self.link.lock().poll_frame();
            match polled {
                Ok(Some(bytes)) => match payload::classify(&bytes) {
                    Ok(payload) => {
                        self.received += 1;
                        log::trace!("X2M200: {} payload #{}", payload.kind(), self.received);
                        return Some(payload);
                    }
                    Err(e) => self.skip(e.into()),
                },
                Ok(None) => return None,
                Err(e @ (Error::Frame(_) | Error::Protocol { .. })) => self.skip(e),
                Err(e) => {
                    log::error!("X2M200: stream ended: {}", e);
                    self.error = Some(e);
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Whether a transport error has ended the stream
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Error that ended the stream
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Payloads delivered so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Frames dropped because they did not decode
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn skip(&mut self, error: Error) {
        self.skipped += 1;
        log::warn!("X2M200: skipping frame ({} skipped so far): {}", self.skipped, error);
    }
}

impl Iterator for PayloadStream {
    type Item = ApplicationPayload;

    fn next(&mut self) -> Option<ApplicationPayload> {
        loop {
            if let Some(payload) = self.try_next() {
                return Some(payload);
            }
            if self.finished {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl std::iter::FusedIterator for PayloadStream {}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        // Best effort: return the application to idle
        if let Err(e) = self.link.lock().send(&ModuleCommand::Stop.encode()) {
            log::debug!("X2M200: could not stop application: {}", e);
        } else {
            log::info!(
                "X2M200: application stopped ({} payloads, {} skipped)",
                self.received,
                self.skipped
            );
        }
    }
}

/// Payload stamped with its host receive time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Microseconds since the Unix epoch
    pub timestamp_us: u64,
    pub payload: ApplicationPayload,
}

/// Drive `stream` on a reader thread and publish readings on a channel.
///
/// The thread stops when `running` clears, when the receiver is dropped or
/// when the transport fails; its result is that failure, or the number of
/// readings published.
pub fn spawn_stream(
    mut stream: PayloadStream,
    running: Arc<AtomicBool>,
    capacity: usize,
) -> Result<(Receiver<Reading>, JoinHandle<Result<u64>>)> {
    let (tx, rx) = bounded(capacity);

    let handle = thread::Builder::new()
        .name("x2m200-stream".to_string())
        .spawn(move || {
            let mut published = 0u64;
            while running.load(Ordering::Relaxed) {
                match stream.try_next() {
                    Some(payload) => {
                        let reading = Reading {
                            timestamp_us: now_us(),
                            payload,
                        };
                        if tx.send(reading).is_err() {
                            log::info!("X2M200: stream consumer gone");
                            break;
                        }
                        published += 1;
                    }
                    None if stream.is_finished() => break,
                    None => thread::sleep(POLL_INTERVAL),
                }
            }

            match stream.take_error() {
                Some(e) => Err(e),
                None => Ok(published),
            }
        })?;

    Ok((rx, handle))
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
