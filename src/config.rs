//! Configuration for the xethru daemon
//!
//! Loads configuration from a TOML file and turns it into the per-session
//! [`ModuleConfig`] the driver works with.

use crate::error::{Error, Result};
use crate::x2m200::constants::{
    APP_ID_BASEBAND, APP_ID_RESPIRATION, APP_ID_SLEEP, COMMAND_READ_ATTEMPTS,
    DEFAULT_PING_TIMEOUT, DEFAULT_RESET_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, MAX_SENSITIVITY,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Application the module runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Respiration,
    Sleep,
    BaseBandIq,
    BaseBandAmpPhase,
}

impl AppMode {
    /// Identifier sent with the load command
    pub fn app_id(self) -> [u8; 4] {
        match self {
            AppMode::Respiration => APP_ID_RESPIRATION,
            AppMode::Sleep => APP_ID_SLEEP,
            // Baseband output rides on the respiration firmware
            AppMode::BaseBandIq | AppMode::BaseBandAmpPhase => APP_ID_BASEBAND,
        }
    }

    /// Baseband feed this mode streams
    pub fn feed(self) -> BaseBandFeed {
        match self {
            AppMode::Respiration | AppMode::Sleep => BaseBandFeed::Off,
            AppMode::BaseBandIq => BaseBandFeed::Iq,
            AppMode::BaseBandAmpPhase => BaseBandFeed::AmpPhase,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppMode::Respiration => "respiration",
            AppMode::Sleep => "sleep",
            AppMode::BaseBandIq => "basebandiq",
            AppMode::BaseBandAmpPhase => "basebandampphase",
        }
    }
}

impl FromStr for AppMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "respiration" => Ok(AppMode::Respiration),
            "sleep" => Ok(AppMode::Sleep),
            "basebandiq" => Ok(AppMode::BaseBandIq),
            "basebandampphase" => Ok(AppMode::BaseBandAmpPhase),
            other => Err(Error::Config(format!("unknown application mode '{}'", other))),
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Front panel LED behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedMode {
    #[default]
    Off = 0,
    Simple = 1,
    Full = 2,
    Inhalation = 3,
}

impl LedMode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Baseband data feed selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseBandFeed {
    Off,
    Iq,
    AmpPhase,
}

impl BaseBandFeed {
    /// Enable code written to the baseband output register
    pub fn code(self) -> u32 {
        match self {
            BaseBandFeed::Off => 0,
            BaseBandFeed::Iq => 1,
            BaseBandFeed::AmpPhase => 2,
        }
    }
}

/// Per-session module configuration
///
/// Created for a named application mode and updated by the session setters
/// once the module acknowledges each change.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleConfig {
    pub mode: AppMode,
    pub app_id: [u8; 4],
    pub led_mode: LedMode,
    /// Detection zone bounds in metres
    pub detection_zone_start: f32,
    pub detection_zone_end: f32,
    /// 0 (least) to 9 (most sensitive)
    pub sensitivity: u32,
    /// Longest wait for each response frame of a configuration command
    pub response_timeout: Duration,
    pub ping_timeout: Duration,
    pub reset_timeout: Duration,
    /// Reads allowed per configuration command before giving up
    pub command_attempts: usize,
}

impl ModuleConfig {
    pub fn for_mode(mode: AppMode) -> Self {
        Self {
            mode,
            app_id: mode.app_id(),
            led_mode: LedMode::Off,
            detection_zone_start: 0.4,
            detection_zone_end: 2.0,
            sensitivity: 5,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            command_attempts: COMMAND_READ_ATTEMPTS,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub serial: SerialConfig,
    #[serde(default)]
    pub module: ModuleSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port the module is attached to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Port path (e.g. "/dev/ttyACM0")
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Module settings as written in the TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub mode: AppMode,
    pub led_mode: LedMode,
    pub detection_zone_start: f32,
    pub detection_zone_end: f32,
    /// Clamped to 0..=9
    pub sensitivity: i32,
    pub response_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub reset_timeout_ms: u64,
    pub command_attempts: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

fn default_baud_rate() -> u32 {
    115_200
}

impl Default for ModuleSettings {
    fn default() -> Self {
        let module = ModuleConfig::for_mode(AppMode::Respiration);
        Self {
            mode: module.mode,
            led_mode: module.led_mode,
            detection_zone_start: module.detection_zone_start,
            detection_zone_end: module.detection_zone_end,
            sensitivity: module.sensitivity as i32,
            response_timeout_ms: module.response_timeout.as_millis() as u64,
            ping_timeout_ms: module.ping_timeout.as_millis() as u64,
            reset_timeout_ms: module.reset_timeout.as_millis() as u64,
            command_attempts: module.command_attempts,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use xethru::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("xethru.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Defaults for an X2M200 on its USB serial port
    pub fn x2m200_defaults() -> Self {
        Self {
            serial: SerialConfig {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: default_baud_rate(),
            },
            module: ModuleSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate the module settings and build the session configuration
    pub fn module_config(&self) -> Result<ModuleConfig> {
        let m = &self.module;
        if m.detection_zone_start >= m.detection_zone_end {
            return Err(Error::Config(format!(
                "detection zone start {} must be below end {}",
                m.detection_zone_start, m.detection_zone_end
            )));
        }
        if m.command_attempts == 0 {
            return Err(Error::Config("command_attempts must be at least 1".to_string()));
        }
        if m.response_timeout_ms == 0 || m.ping_timeout_ms == 0 || m.reset_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }

        Ok(ModuleConfig {
            led_mode: m.led_mode,
            detection_zone_start: m.detection_zone_start,
            detection_zone_end: m.detection_zone_end,
            sensitivity: m.sensitivity.clamp(0, MAX_SENSITIVITY) as u32,
            response_timeout: Duration::from_millis(m.response_timeout_ms),
            ping_timeout: Duration::from_millis(m.ping_timeout_ms),
            reset_timeout: Duration::from_millis(m.reset_timeout_ms),
            command_attempts: m.command_attempts,
            ..ModuleConfig::for_mode(m.mode)
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::x2m200_defaults()
    }
}
