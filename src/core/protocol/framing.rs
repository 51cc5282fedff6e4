//! Frame acquisition
//!
//! Rebuilds one reply frame (`checksum ‖ payload`) from a transport:
//!
//! - Stream: fixed 2-byte checksum read, then read through the EOT
//!   terminator. Anything short of a terminated frame is a framing failure
//!   and triggers resynchronisation.
//! - Bus: addressed 3-byte header `status, length, !(status+length)`, then an
//!   addressed read of exactly `length` bytes.
//!
//! Each channel also knows which recovery action a fault needs before the
//! next attempt.

use super::checksum::{self, CHECKSUM_LEN};
use super::codec::{Packet, Status, EOT};
use crate::core::engine::{Acquisition, Channel, Fault};
use crate::core::transport::{BusLink, StreamLink, TransportError};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

/// Stream side of a call over a serial link
pub struct StreamChannel<'a> {
    link: &'a mut dyn StreamLink,
    address: u8,
    settle_delay: Duration,
}

impl<'a> StreamChannel<'a> {
    /// Bind a link to a target address
    pub fn new(link: &'a mut dyn StreamLink, address: u8, settle_delay: Duration) -> Self {
        Self {
            link,
            address,
            settle_delay,
        }
    }

    /// Flush both directions, wait for the line to go quiet and drop stragglers
    async fn resync(&mut self) -> Result<Acquisition, TransportError> {
        self.link.clear_buffers().await?;
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        let dropped = self.link.drain().await?;
        debug!(dropped, "stream resynchronised");
        Ok(Acquisition::Fault(Fault::NoResponse))
    }
}

#[async_trait]
impl Channel for StreamChannel<'_> {
    fn address(&self) -> u8 {
        self.address
    }

    fn request_address(&self) -> Option<u8> {
        Some(self.address)
    }

    async fn send_request(&mut self, request: &Packet) -> Result<(), TransportError> {
        self.link.write_all(&request.framed()).await
    }

    async fn acquire_frame(&mut self) -> Result<Acquisition, TransportError> {
        // The checksum may itself contain EOT, so it is read unconditionally
        let head = self.link.read_exact(CHECKSUM_LEN).await?;
        if head.len() < CHECKSUM_LEN {
            trace!(got = head.len(), "short checksum read");
            return self.resync().await;
        }

        let rest = self.link.read_until(EOT).await?;
        match rest.split_last() {
            Some((&EOT, body)) => {
                let mut frame = BytesMut::with_capacity(CHECKSUM_LEN + body.len());
                frame.put_slice(&head);
                frame.put_slice(body);
                Ok(Acquisition::Frame(Packet::from_wire(frame.freeze())))
            }
            _ => {
                trace!(got = rest.len(), "terminator missing");
                self.resync().await
            }
        }
    }

    async fn recover(&mut self, fault: Fault, request: &Packet) -> Result<(), TransportError> {
        match fault {
            Fault::NoResponse | Fault::CorruptRequest => {
                self.link.write_all(&request.framed()).await
            }
            Fault::CorruptResponse => {
                self.link
                    .write_all(&Packet::resend_request().framed())
                    .await
            }
        }
    }
}

/// What a bus channel does after a header failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusRetryPolicy {
    /// Re-write the request, then read a fresh header
    #[default]
    ResendRequest,
    /// Only read the header again
    RereadHeader,
}

impl fmt::Display for BusRetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResendRequest => f.write_str("resend-request"),
            Self::RereadHeader => f.write_str("reread-header"),
        }
    }
}

impl FromStr for BusRetryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "resend-request" | "resend" => Ok(Self::ResendRequest),
            "reread-header" | "reread" => Ok(Self::RereadHeader),
            other => Err(format!("unknown bus retry policy: {other}")),
        }
    }
}

/// Bus reply header: `status, length, !(status+length)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusHeader {
    /// Status byte, mirrors the first payload byte
    pub status: u8,
    /// Length of the reply frame that follows
    pub length: u8,
    /// Complement checksum
    pub check: u8,
}

impl BusHeader {
    /// Header size on the wire
    pub const LEN: usize = 3;

    /// Build a header with a correct checksum
    pub fn new(status: u8, length: u8) -> Self {
        Self {
            status,
            length,
            check: checksum::header_checksum(status, length),
        }
    }

    /// Parse exactly [`BusHeader::LEN`] bytes
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match *bytes {
            [status, length, check] => Some(Self {
                status,
                length,
                check,
            }),
            _ => None,
        }
    }

    /// Whether the checksum matches
    pub fn is_valid(&self) -> bool {
        self.check == checksum::header_checksum(self.status, self.length)
    }

    /// Decoded status, if recognised
    pub fn status(&self) -> Option<Status> {
        Status::from_byte(self.status)
    }

    /// Wire bytes
    pub fn to_bytes(self) -> [u8; Self::LEN] {
        [self.status, self.length, self.check]
    }
}

/// Where the last acquisition stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Body,
}

/// Bus side of a call to one addressed target
pub struct BusChannel<'a> {
    bus: &'a mut dyn BusLink,
    address: u8,
    policy: BusRetryPolicy,
    request: Option<Packet>,
    needs_write: bool,
    stage: Stage,
}

impl<'a> BusChannel<'a> {
    /// Bind a bus to a target address
    pub fn new(bus: &'a mut dyn BusLink, address: u8, policy: BusRetryPolicy) -> Self {
        Self {
            bus,
            address,
            policy,
            request: None,
            needs_write: false,
            stage: Stage::Header,
        }
    }

    fn fault(&mut self, stage: Stage, fault: Fault) -> Acquisition {
        self.stage = stage;
        Acquisition::Fault(fault)
    }
}

#[async_trait]
impl Channel for BusChannel<'_> {
    fn address(&self) -> u8 {
        self.address
    }

    fn request_address(&self) -> Option<u8> {
        None
    }

    /// The write happens as part of the exchange in [`Channel::acquire_frame`]
    async fn send_request(&mut self, request: &Packet) -> Result<(), TransportError> {
        self.request = Some(request.clone());
        self.needs_write = true;
        Ok(())
    }

    async fn acquire_frame(&mut self) -> Result<Acquisition, TransportError> {
        if self.needs_write {
            if let Some(request) = &self.request {
                if let Err(err) = self.bus.write(self.address, request.as_bytes()).await {
                    debug!(%err, "request write failed");
                    return Ok(self.fault(Stage::Header, Fault::NoResponse));
                }
            }
            self.needs_write = false;
        }

        let header = match self.bus.read(self.address, BusHeader::LEN).await {
            Ok(bytes) => BusHeader::parse(&bytes),
            Err(err) => {
                debug!(%err, "header read failed");
                None
            }
        };
        let Some(header) = header else {
            return Ok(self.fault(Stage::Header, Fault::NoResponse));
        };

        if !header.is_valid() {
            trace!(?header, "header checksum mismatch");
            return Ok(self.fault(Stage::Header, Fault::CorruptResponse));
        }
        if header.status() == Some(Status::CorruptRequest) {
            return Ok(self.fault(Stage::Header, Fault::CorruptRequest));
        }

        let length = usize::from(header.length);
        let body = match self.bus.read(self.address, length).await {
            Ok(body) if body.len() == length => body,
            Ok(body) => {
                trace!(got = body.len(), expected = length, "short body read");
                return Ok(self.fault(Stage::Body, Fault::NoResponse));
            }
            Err(err) => {
                debug!(%err, "body read failed");
                return Ok(self.fault(Stage::Body, Fault::NoResponse));
            }
        };

        self.stage = Stage::Body;
        Ok(Acquisition::Frame(Packet::from_wire(body)))
    }

    async fn recover(&mut self, fault: Fault, _request: &Packet) -> Result<(), TransportError> {
        self.needs_write = match (self.stage, fault) {
            (Stage::Header, Fault::CorruptResponse | Fault::CorruptRequest) => {
                self.policy == BusRetryPolicy::ResendRequest
            }
            _ => true,
        };
        Ok(())
    }
}
