//! Transport bindings consumed by the protocol engine
//!
//! Supports:
//! - Stream links (serial ports): explicit terminator framing, reads bounded
//!   by a timeout
//! - Bus links (I2C): addressed, length-bounded transactions
//! - Scripted mock links for tests

pub mod bus;
pub mod mock;
mod serial;

pub use bus::HalBus;
pub use serial::{list_ports, PortControl, SerialConfig, SerialFlowControl, SerialLink, SerialParity};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Bus transaction failed (NACK, arbitration loss, ...)
    #[error("Bus error at 0x{address:02x}: {reason}")]
    Bus {
        /// Target address of the transaction
        address: u8,
        /// Failure description
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

/// A link shared by every session that addresses targets through it
pub type SharedLink<L> = Arc<tokio::sync::Mutex<L>>;

/// Byte-stream transport (serial port).
///
/// Reads are bounded by the link's read timeout; on timeout they return
/// whatever arrived instead of failing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamLink: Send {
    /// Write all bytes and flush
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `len` bytes; fewer are returned if the timeout elapses
    async fn read_exact(&mut self, len: usize) -> Result<Bytes, TransportError>;

    /// Read through `terminator` (included); an unterminated buffer is
    /// returned if the timeout elapses
    async fn read_until(&mut self, terminator: u8) -> Result<Bytes, TransportError>;

    /// Discard pending input and output
    async fn clear_buffers(&mut self) -> Result<(), TransportError>;

    /// Read and discard whatever is already waiting, returning the count
    async fn drain(&mut self) -> Result<usize, TransportError>;

    /// Human-readable connection info
    fn describe(&self) -> String;
}

/// Addressed bus transport (I2C)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusLink: Send {
    /// Addressed write
    async fn write(&mut self, address: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Addressed read of exactly `len` bytes
    async fn read(&mut self, address: u8, len: usize) -> Result<Bytes, TransportError>;

    /// Whether a device acknowledges `address`
    async fn probe(&mut self, address: u8) -> bool {
        self.write(address, &[]).await.is_ok()
    }

    /// Human-readable bus info
    fn describe(&self) -> String;
}
