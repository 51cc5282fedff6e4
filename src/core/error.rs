//! Terminal call errors
//!
//! Every unrecoverable condition of a remote call surfaces as a single
//! [`CallError`] carrying a classification, the target address and a
//! human-readable detail string.

use super::engine::Fault;
use super::protocol::CodecError;
use super::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Classification of a terminal call failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// A transport fault persisted for the whole retry budget
    RetriesExhausted(Fault),
    /// The peer answered with an unrecognized header
    Protocol,
    /// The peer executed the call and reported failure
    Remote,
    /// The transport itself failed (port gone, write error)
    Transport,
    /// An argument cannot be encoded
    InvalidArgument,
    /// The device did not answer the handshake as a Chaino device
    Handshake,
}

impl CallErrorKind {
    /// Whether the failure came from the link rather than the peer's logic
    pub fn is_transport_fault(self) -> bool {
        matches!(self, Self::RetriesExhausted(_) | Self::Transport)
    }
}

impl fmt::Display for CallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted(fault) => write!(f, "max retries: {fault}"),
            Self::Protocol => f.write_str("protocol error"),
            Self::Remote => f.write_str("function execution failed"),
            Self::Transport => f.write_str("transport error"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::Handshake => f.write_str("handshake failed"),
        }
    }
}

/// Terminal error of a remote call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} (addr:0x{address:02x}): {detail}")]
pub struct CallError {
    /// Failure class
    pub kind: CallErrorKind,
    /// Target address of the call
    pub address: u8,
    /// Human-readable detail
    pub detail: String,
}

impl CallError {
    /// Create a new call error
    pub fn new(kind: CallErrorKind, address: u8, detail: impl Into<String>) -> Self {
        Self {
            kind,
            address,
            detail: detail.into(),
        }
    }

    /// Retry budget exhausted on `fault`
    pub fn exhausted(fault: Fault, address: u8, attempts: u32) -> Self {
        Self::new(
            CallErrorKind::RetriesExhausted(fault),
            address,
            format!("gave up after {attempts} attempts"),
        )
    }

    /// Wrap a transport failure
    pub fn transport(address: u8, err: &TransportError) -> Self {
        Self::new(CallErrorKind::Transport, address, err.to_string())
    }

    /// Wrap an argument encoding failure
    pub fn codec(address: u8, err: &CodecError) -> Self {
        Self::new(CallErrorKind::InvalidArgument, address, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_fault_class() {
        let err = CallError::exhausted(Fault::NoResponse, 0x42, 3);
        assert_eq!(
            err.to_string(),
            "max retries: no response (addr:0x42): gave up after 3 attempts"
        );
    }

    #[test]
    fn test_transport_fault_classification() {
        assert!(CallErrorKind::RetriesExhausted(Fault::CorruptResponse).is_transport_fault());
        assert!(CallErrorKind::Transport.is_transport_fault());
        assert!(!CallErrorKind::Remote.is_transport_fault());
        assert!(!CallErrorKind::Protocol.is_transport_fault());
    }
}
