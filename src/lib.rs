//! # Chaino Client Library
//!
//! Remote procedure calls to Chaino peripheral devices over:
//! - Serial ports (the master device and, through it, bus targets)
//! - I2C buses (`embedded-hal` controllers)
//!
//! ## Features
//!
//! - CRC-16/XMODEM checksummed packets
//! - One retry engine for both transports, with per-session error counters
//! - Shared links: every target behind one port uses one handle
//! - Typed device API and the Chaino_Hana board API
//! - CLI with exit codes for automation
//!
//! ## Example
//!
//! ```rust,no_run
//! use chaino::core::board::{Board, PinMode, Tone};
//! use chaino::core::registry::LinkRegistry;
//! use chaino::core::session::{ConnectionFactory, SessionOptions};
//! use chaino::SerialConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factory = ConnectionFactory::new(
//!         Arc::new(LinkRegistry::new()),
//!         SerialConfig::default(),
//!         SessionOptions::default(),
//!     );
//!
//!     let hana = Board::new(factory.stream_session("COM9", 0x42).await?);
//!     println!("{}", hana.who().await?);
//!
//!     hana.set_pin_mode(13, PinMode::Output).await?;
//!     hana.write_digital(13, true).await?;
//!     hana.start_tone(8, Tone::note("c4")?, 500).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ProtocolConfig};
pub use crate::core::engine::{ErrorStats, Fault, RetryEngine};
pub use crate::core::error::{CallError, CallErrorKind};
pub use crate::core::protocol::{CallResult, Packet, Value};
pub use crate::core::session::{BusSession, ConnectionFactory, RemoteCall, StreamSession};
pub use crate::core::transport::{SerialConfig, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
