//! xethru - Host-side driver for the XeThru X2M200 radar module
//!
//! The module speaks a framed, escaped and XOR-checksummed protocol over a
//! serial link. This crate provides the frame codec, the ping/reset bring-up,
//! acknowledged configuration commands and decoding of the respiration, sleep
//! and baseband data the module streams.
//!
//! ```no_run
//! use xethru::config::{AppMode, ModuleConfig};
//! use xethru::transport::SerialTransport;
//! use xethru::x2m200::Session;
//!
//! let transport = SerialTransport::open("/dev/ttyACM0", 115_200)?;
//! let config = ModuleConfig::for_mode(AppMode::Respiration);
//! let app_id = config.app_id;
//! let mut session = Session::open(transport, config);
//! session.reset()?;
//! session.load(app_id)?;
//! for payload in session.run()? {
//!     println!("{:?}", payload);
//! }
//! # Ok::<(), xethru::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod transport;
pub mod x2m200;

// Re-export commonly used types
pub use config::{AppConfig, AppMode, BaseBandFeed, LedMode, ModuleConfig};
pub use error::{Error, Result};
pub use x2m200::{ApplicationPayload, Session};
