//! XeThru X2M200 respiration/sleep radar driver
//!
//! Bring-up order used by the daemon:
//! 1. `ping` to check the module is talking
//! 2. `reset` to reach a known state (disables any feed left running)
//! 3. `load` the application, then LED/zone/sensitivity/baseband settings
//! 4. `run` (or `spawn_stream`) to receive decoded payloads
//!
//! Only one operation talks to the module at a time; the link is shared
//! behind a mutex so timed waits can run on worker threads.

mod bringup;
pub mod command;
pub mod constants;
mod exchange;
pub mod frame;
pub mod link;
pub mod payload;
mod stream;

use crate::config::{BaseBandFeed, LedMode, ModuleConfig};
use crate::error::Result;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub use bringup::{parse_ping_response, ResetParams};
pub use command::ModuleCommand;
pub use crossbeam_channel::Receiver;
pub use link::FrameLink;
pub use payload::{
    ApplicationPayload, BaseBandAmpPhase, BaseBandHeader, BaseBandIq, Respiration,
    RespirationState, Sleep, SystemMessage,
};
pub use stream::{spawn_stream, PayloadStream, Reading};

/// Channel depth between the reader thread and its consumer
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Driver session for one X2M200 module
pub struct Session {
    link: Arc<Mutex<FrameLink>>,
    config: ModuleConfig,
}

impl Session {
    /// Take ownership of an opened transport
    pub fn open<T: Transport + 'static>(transport: T, config: ModuleConfig) -> Self {
        log::info!(
            "X2M200: session opened for {} (app id {:02X?})",
            config.mode,
            config.app_id
        );
        Self {
            link: Arc::new(Mutex::new(FrameLink::new(Box::new(transport)))),
            config,
        }
    }

    /// Current module configuration
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Ping the module; `timeout` defaults to the configured ping timeout.
    ///
    /// `Ok(false)` means the module answered "not ready".
    pub fn ping(&self, timeout: Option<Duration>) -> Result<bool> {
        bringup::ping(&self.link, timeout.unwrap_or(self.config.ping_timeout))
    }

    /// Reset the module and wait for it to come back ready
    pub fn reset(&self) -> Result<bool> {
        bringup::reset(
            &self.link,
            ResetParams {
                timeout: self.config.reset_timeout,
                command_attempts: self.config.command_attempts,
                response_timeout: self.config.response_timeout,
            },
        )
    }

    /// Load an application by identifier
    pub fn load(&mut self, app_id: [u8; 4]) -> Result<()> {
        self.execute(&ModuleCommand::LoadApp(app_id))?;
        self.config.app_id = app_id;
        log::info!("X2M200: application {:02X?} loaded", app_id);
        Ok(())
    }

    pub fn set_led_mode(&mut self, mode: LedMode) -> Result<()> {
        self.execute(&ModuleCommand::SetLedMode(mode))?;
        self.config.led_mode = mode;
        Ok(())
    }

    /// Set the detection zone in metres
    pub fn set_detection_zone(&mut self, start: f32, end: f32) -> Result<()> {
        self.execute(&ModuleCommand::SetDetectionZone { start, end })?;
        self.config.detection_zone_start = start;
        self.config.detection_zone_end = end;
        Ok(())
    }

    /// Set sensitivity; values outside 0..=9 are clamped
    pub fn set_sensitivity(&mut self, sensitivity: i32) -> Result<()> {
        let clamped = sensitivity.clamp(0, constants::MAX_SENSITIVITY) as u32;
        if clamped as i32 != sensitivity {
            log::debug!("X2M200: sensitivity {} clamped to {}", sensitivity, clamped);
        }
        self.execute(&ModuleCommand::SetSensitivity(clamped))?;
        self.config.sensitivity = clamped;
        Ok(())
    }

    /// Enable or disable baseband output
    pub fn enable(&mut self, feed: BaseBandFeed) -> Result<()> {
        self.execute(&ModuleCommand::BaseBandOutput(feed))
    }

    /// Start the application and read its output lazily on this thread
    pub fn run(&self) -> Result<PayloadStream> {
        PayloadStream::start(Arc::clone(&self.link))
    }

    /// Start the application and publish its output from a reader thread
    pub fn spawn_stream(
        &self,
        running: Arc<AtomicBool>,
    ) -> Result<(Receiver<Reading>, JoinHandle<Result<u64>>)> {
        spawn_stream(self.run()?, running, STREAM_CHANNEL_CAPACITY)
    }

    /// Release the transport
    pub fn close(self) -> Result<()> {
        log::info!("X2M200: closing session");
        let mut link = self.link.lock();
        link.close()
    }

    fn execute(&self, command: &ModuleCommand) -> Result<()> {
        let mut link = self.link.lock();
        exchange::execute(
            &mut link,
            command,
            self.config.command_attempts,
            self.config.response_timeout,
        )
    }
}
