//! # MY1690 Driver Library
//!
//! Host-side driver for the MY1690-16S serial MP3 playback chip.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Command frame construction with the MY1690 XOR checksum
//! - Timeout-driven byte-level response acquisition
//! - Automatic detection of the two known firmware reply dialects
//! - Typed playback, volume, equalizer, loop-mode and status operations
//! - Serial port enumeration and a pluggable transport trait
//!
//! ## Supported firmware
//!
//! - Legacy editions reporting a single-digit version (fixed 8-byte replies)
//! - Revised 1.0 / 1.1 editions (variable-width replies, sparse acks)
//!
//! ## Example
//!
//! ```rust,ignore
//! use my1690_core::session::{Session, SessionConfig};
//!
//! let mut session = Session::new(SessionConfig {
//!     port_name: "/dev/ttyUSB0".into(),
//!     ..SessionConfig::default()
//! });
//! session.connect()?;
//!
//! session.set_volume(15)?;
//! session.play_track(3)?;
//! println!("tracks on card: {}", session.get_song_count()?);
//! ```

pub mod channel;
pub mod commands;
pub mod dialect;
pub mod error;
pub mod frame;
pub mod response;
pub mod serial;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::channel::{BusyLine, Channel, SerialChannel};
    pub use crate::commands::{Command, EqMode, LoopMode};
    pub use crate::dialect::DeviceDialect;
    pub use crate::error::ProtocolError;
    pub use crate::session::{ConnectionState, Session, SessionConfig, VOLUME_MAX};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
