//! Retry engine
//!
//! Turns an unreliable link into a reliable request/response call:
//!
//! ```text
//! Sending -> AwaitingFrame -> Classifying -> Success
//!               ^                  |      -> Fatal
//!               +---- Retry <------+
//! ```
//!
//! One engine serves both transports. Transport differences live behind
//! [`Channel`]: how a request goes out, how a frame comes back, and what
//! recovery action each fault class needs.

use super::error::{CallError, CallErrorKind};
use super::protocol::{encode_request, parse_response, render_for_log, CallResult, Packet, Status, Value};
use super::transport::TransportError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn, Instrument};

/// Default retry budget per call
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Recoverable transport fault classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// No complete frame arrived (timeout, short read, bus I/O failure)
    NoResponse,
    /// A frame arrived but failed its checksum
    CorruptResponse,
    /// The peer reported that our request arrived corrupt (`'E'`)
    CorruptRequest,
}

impl Fault {
    /// Whether the fault was detected on our receive path
    pub fn is_read_fault(self) -> bool {
        !matches!(self, Self::CorruptRequest)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => f.write_str("no response"),
            Self::CorruptResponse => f.write_str("corrupt response"),
            Self::CorruptRequest => f.write_str("peer reported corrupt request"),
        }
    }
}

/// Result of one frame acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// A complete `checksum ‖ payload` frame, not yet validated
    Frame(Packet),
    /// The channel already classified the failure
    Fault(Fault),
}

/// Transport-specific half of a call
#[async_trait]
pub trait Channel: Send {
    /// Target address of the call
    fn address(&self) -> u8;

    /// Address field to embed in requests (`None` for the bus form)
    fn request_address(&self) -> Option<u8>;

    /// Send the request for the first time
    async fn send_request(&mut self, request: &Packet) -> Result<(), TransportError>;

    /// Wait for one reply frame
    async fn acquire_frame(&mut self) -> Result<Acquisition, TransportError>;

    /// Prepare the next attempt after `fault`
    async fn recover(&mut self, fault: Fault, request: &Packet) -> Result<(), TransportError>;
}

/// Outcome of classifying one acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The call returned
    Success(CallResult),
    /// A transport fault; retry if budget remains
    Retry(Fault),
    /// Terminal failure, never retried
    Fatal(CallError),
}

/// Classify an acquisition. Pure: the same input always gives the same verdict.
pub fn classify(acquisition: &Acquisition, address: u8) -> Verdict {
    let frame = match acquisition {
        Acquisition::Fault(fault) => return Verdict::Retry(*fault),
        Acquisition::Frame(frame) => frame,
    };

    if !frame.is_valid() {
        return Verdict::Retry(Fault::CorruptResponse);
    }

    let payload = frame.payload();
    if payload.first().copied().and_then(Status::from_byte) == Some(Status::CorruptRequest) {
        return Verdict::Retry(Fault::CorruptRequest);
    }

    match parse_response(payload, address) {
        Ok(result) => Verdict::Success(result),
        Err(err) => Verdict::Fatal(err),
    }
}

/// Lifetime error counters of a session
#[derive(Debug, Default)]
pub struct ErrorCounters {
    calls: AtomicU64,
    attempts: AtomicU64,
    read_crc_errors: AtomicU64,
    write_crc_errors: AtomicU64,
    no_response: AtomicU64,
    corrupt_response: AtomicU64,
    corrupt_request: AtomicU64,
}

impl ErrorCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, fault: Fault) {
        if fault.is_read_fault() {
            self.read_crc_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_crc_errors.fetch_add(1, Ordering::Relaxed);
        }
        let class = match fault {
            Fault::NoResponse => &self.no_response,
            Fault::CorruptResponse => &self.corrupt_response,
            Fault::CorruptRequest => &self.corrupt_request,
        };
        class.fetch_add(1, Ordering::Relaxed);
    }

    /// Read-path failures recovered or reported
    pub fn read_crc_errors(&self) -> u64 {
        self.read_crc_errors.load(Ordering::Relaxed)
    }

    /// Peer-reported request corruptions
    pub fn write_crc_errors(&self) -> u64 {
        self.write_crc_errors.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> ErrorStats {
        ErrorStats {
            calls: self.calls.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            read_crc_errors: self.read_crc_errors(),
            write_crc_errors: self.write_crc_errors(),
            no_response: self.no_response.load(Ordering::Relaxed),
            corrupt_response: self.corrupt_response.load(Ordering::Relaxed),
            corrupt_request: self.corrupt_request.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`ErrorCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    /// Calls issued
    pub calls: u64,
    /// Frame acquisitions across all calls
    pub attempts: u64,
    /// Read-path failures (no frame or corrupt frame)
    pub read_crc_errors: u64,
    /// Peer-reported corrupt requests
    pub write_crc_errors: u64,
    /// No-frame failures
    pub no_response: u64,
    /// Checksum failures on received frames
    pub corrupt_response: u64,
    /// `'E'` replies
    pub corrupt_request: u64,
}

/// Request/response state machine with a bounded retry budget
#[derive(Debug, Clone, Copy)]
pub struct RetryEngine {
    max_retries: u32,
}

impl Default for RetryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryEngine {
    /// Create an engine; a zero budget is raised to one attempt
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    /// Attempts allowed per call
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Encode and execute one remote call
    pub async fn call<C>(
        &self,
        channel: &mut C,
        func_num: u16,
        args: &[Value],
        counters: &ErrorCounters,
    ) -> Result<CallResult, CallError>
    where
        C: Channel + ?Sized,
    {
        let address = channel.address();
        let request = encode_request(channel.request_address(), func_num, args)
            .map_err(|e| CallError::codec(address, &e))?;

        let span = tracing::debug_span!("call", address = %format_args!("0x{address:02x}"), func = func_num);
        self.execute(channel, &request, counters).instrument(span).await
    }

    /// Drive an already-encoded request to a terminal outcome
    pub async fn execute<C>(
        &self,
        channel: &mut C,
        request: &Packet,
        counters: &ErrorCounters,
    ) -> Result<CallResult, CallError>
    where
        C: Channel + ?Sized,
    {
        let address = channel.address();
        counters.calls.fetch_add(1, Ordering::Relaxed);

        debug!(packet = %render_for_log(request.as_bytes()), "sending request");
        channel
            .send_request(request)
            .await
            .map_err(|e| CallError::transport(address, &e))?;

        for attempt in 1..=self.max_retries {
            counters.attempts.fetch_add(1, Ordering::Relaxed);
            let acquisition = channel
                .acquire_frame()
                .await
                .map_err(|e| CallError::transport(address, &e))?;

            if let Acquisition::Frame(frame) = &acquisition {
                debug!(packet = %render_for_log(frame.as_bytes()), attempt, "frame received");
            }

            match classify(&acquisition, address) {
                Verdict::Success(result) => return Ok(result),
                Verdict::Fatal(err) => return Err(err),
                Verdict::Retry(fault) => {
                    counters.record(fault);
                    if attempt == self.max_retries {
                        warn!(%fault, attempt, "retry budget exhausted");
                        return Err(CallError::exhausted(fault, address, attempt));
                    }
                    warn!(%fault, attempt, max = self.max_retries, "retrying");
                    channel
                        .recover(fault, request)
                        .await
                        .map_err(|e| CallError::transport(address, &e))?;
                }
            }
        }

        // max_retries >= 1, so the loop always returns
        Err(CallError::new(
            CallErrorKind::Protocol,
            address,
            "retry loop ended without an outcome",
        ))
    }
}
