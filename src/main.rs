//! xethru - X2M200 radar daemon
//!
//! Brings the module up, configures the application named in the config file
//! and logs every decoded payload until interrupted.

use crossbeam_channel::RecvTimeoutError;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use xethru::config::AppConfig;
use xethru::transport::SerialTransport;
use xethru::x2m200::{ApplicationPayload, Reading, Session};
use xethru::{AppMode, Error, Result};

const DEFAULT_CONFIG_PATH: &str = "/etc/xethru.toml";

/// Config file named by `xethru <path>` or `xethru -c|--config <path>`
fn config_path(mut args: impl Iterator<Item = String>) -> PathBuf {
    args.next(); // program name
    let named = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next(),
        Some(path) if !path.starts_with('-') => Some(path),
        _ => None,
    };
    named.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

fn main() -> Result<()> {
    let config_path = config_path(env::args());
    let found = config_path.exists();
    let config = if found {
        AppConfig::from_file(&config_path)?
    } else {
        AppConfig::x2m200_defaults()
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("xethru v{} starting...", env!("CARGO_PKG_VERSION"));
    if found {
        log::info!("Using config: {}", config_path.display());
    } else {
        log::warn!("Config {} not found, using defaults", config_path.display());
    }

    let module_config = config.module_config()?;
    log::info!(
        "Module: {} on {} at {} baud",
        module_config.mode,
        config.serial.port,
        config.serial.baud_rate
    );

    let transport = SerialTransport::open(&config.serial.port, config.serial.baud_rate)?;
    let mut session = Session::open(transport, module_config);

    match session.ping(None) {
        Ok(true) => log::info!("Module answered ping: ready"),
        Ok(false) => log::warn!("Module answered ping: not ready"),
        Err(e) => log::warn!("Ping failed, resetting anyway: {}", e),
    }
    session.reset()?;
    configure(&mut session, &config)?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let (readings, reader) = session.spawn_stream(Arc::clone(&running))?;
    while running.load(Ordering::Relaxed) {
        match readings.recv_timeout(Duration::from_millis(200)) {
            Ok(reading) => log_reading(&reading),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    running.store(false, Ordering::Relaxed);
    drop(readings);
    match reader.join() {
        Ok(Ok(published)) => log::info!("Reader stopped after {} readings", published),
        Ok(Err(e)) => log::error!("Reader stopped: {}", e),
        Err(_) => log::error!("Reader thread panicked"),
    }

    session.close()?;
    log::info!("Shutdown complete");
    Ok(())
}

/// Load the configured application and apply its settings
fn configure(session: &mut Session, config: &AppConfig) -> Result<()> {
    let module = session.config().clone();

    session.load(module.app_id)?;
    session.set_led_mode(module.led_mode)?;
    if matches!(module.mode, AppMode::Respiration | AppMode::Sleep) {
        session.set_detection_zone(module.detection_zone_start, module.detection_zone_end)?;
        session.set_sensitivity(config.module.sensitivity)?;
    }
    session.enable(module.mode.feed())?;

    log::info!("Module configured for {}", module.mode);
    Ok(())
}

fn log_reading(reading: &Reading) {
    match &reading.payload {
        ApplicationPayload::Respiration(r) => log::info!(
            "[{}] respiration #{}: {:?} rpm={} distance={:.2}m movement={:.3} quality={}",
            reading.timestamp_us,
            r.counter,
            r.state,
            r.rpm,
            r.distance,
            r.movement,
            r.signal_quality
        ),
        ApplicationPayload::Sleep(s) => log::info!(
            "[{}] sleep #{}: {:?} rpm={:.1} distance={:.2}m slow={:.3} fast={:.3} quality={}",
            reading.timestamp_us,
            s.counter,
            s.state,
            s.rpm,
            s.distance,
            s.movement_slow,
            s.movement_fast,
            s.signal_quality
        ),
        ApplicationPayload::BaseBandAmpPhase(ap) => log::info!(
            "[{}] baseband amplitude/phase #{}: {} bins from {:.2}m",
            reading.timestamp_us,
            ap.header.counter,
            ap.header.bins,
            ap.header.range_offset
        ),
        ApplicationPayload::BaseBandIq(iq) => log::info!(
            "[{}] baseband iq #{}: {} bins from {:.2}m",
            reading.timestamp_us,
            iq.header.counter,
            iq.header.bins,
            iq.header.range_offset
        ),
        ApplicationPayload::System(message) => {
            log::debug!("[{}] system message: {}", reading.timestamp_us, message)
        }
    }
}
