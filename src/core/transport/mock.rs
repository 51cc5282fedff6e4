//! Scripted links for deterministic testing of the protocol engine.
//!
//! [`MockStreamLink`] answers every write with the next queued reply, so a
//! test can script a whole exchange (including silence and corrupted frames)
//! without hardware. [`MockBus`] does the same for addressed bus reads.
//!
//! Both are cheap handles over shared state: keep a clone to inspect what
//! was written after the link has been handed to a session.
//!
//! ```
//! use chaino::core::protocol::{encode_response, Status};
//! use chaino::core::transport::mock::MockStreamLink;
//!
//! let link = MockStreamLink::new();
//! link.reply_packet(&encode_response(Status::Success, &["ImChn"]));
//! link.silence();
//! ```

use super::{BusLink, StreamLink, TransportError};
use crate::core::protocol::{checksum, Packet};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct StreamState {
    /// Replies released one per write
    replies: VecDeque<Option<Vec<u8>>>,
    /// Bytes waiting to be read
    rx: BytesMut,
    /// Every write, in order
    written: Vec<Vec<u8>>,
    /// Number of buffer clears
    clears: usize,
}

/// Scripted [`StreamLink`]
#[derive(Debug, Clone, Default)]
pub struct MockStreamLink {
    state: Arc<Mutex<StreamState>>,
}

impl MockStreamLink {
    /// Create an empty mock; unanswered writes behave like a silent peer
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes to be released after the next write
    pub fn reply(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().replies.push_back(Some(bytes.into()));
    }

    /// Queue a packet (with terminator) to be released after the next write
    pub fn reply_packet(&self, packet: &Packet) {
        self.reply(packet.framed().to_vec());
    }

    /// Queue a packet whose first checksum bit is flipped
    pub fn reply_corrupted(&self, packet: &Packet) {
        let mut bytes = packet.framed().to_vec();
        bytes[0] ^= 0x80;
        self.reply(bytes);
    }

    /// Queue no answer for the next write
    pub fn silence(&self) {
        self.state.lock().replies.push_back(None);
    }

    /// Make bytes readable immediately, independent of writes
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().rx.extend_from_slice(bytes);
    }

    /// All writes so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Number of times the buffers were cleared
    pub fn clears(&self) -> usize {
        self.state.lock().clears
    }

    /// Replies not yet released
    pub fn pending_replies(&self) -> usize {
        self.state.lock().replies.len()
    }
}

#[async_trait]
impl StreamLink for MockStreamLink {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.written.push(data.to_vec());
        if let Some(Some(reply)) = state.replies.pop_front() {
            state.rx.extend_from_slice(&reply);
        }
        Ok(())
    }

    async fn read_exact(&mut self, len: usize) -> Result<Bytes, TransportError> {
        let mut state = self.state.lock();
        let n = len.min(state.rx.len());
        Ok(state.rx.split_to(n).freeze())
    }

    async fn read_until(&mut self, terminator: u8) -> Result<Bytes, TransportError> {
        let mut state = self.state.lock();
        let end = state
            .rx
            .iter()
            .position(|&b| b == terminator)
            .map_or(state.rx.len(), |pos| pos + 1);
        Ok(state.rx.split_to(end).freeze())
    }

    async fn clear_buffers(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.rx.clear();
        state.clears += 1;
        Ok(())
    }

    async fn drain(&mut self) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        let n = state.rx.len();
        state.rx.clear();
        Ok(n)
    }

    fn describe(&self) -> String {
        "mock-stream".to_string()
    }
}

#[derive(Debug, Default)]
struct BusState {
    /// Addresses that acknowledge; empty means every address does
    devices: HashSet<u8>,
    /// Answers to reads, in order; `None` fails the read
    reads: VecDeque<Option<Vec<u8>>>,
    /// Writes that should fail, counted down
    failing_writes: usize,
    /// Every non-empty write, in order
    written: Vec<(u8, Vec<u8>)>,
    /// Every read, as (address, requested length)
    read_log: Vec<(u8, usize)>,
}

/// Scripted [`BusLink`]
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    /// Create a bus where every address acknowledges
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with only the given devices present
    pub fn with_devices(addresses: &[u8]) -> Self {
        let bus = Self::default();
        bus.state.lock().devices = addresses.iter().copied().collect();
        bus
    }

    /// Queue raw bytes for the next read
    pub fn queue_read(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().reads.push_back(Some(bytes.into()));
    }

    /// Queue a failing read
    pub fn queue_read_error(&self) {
        self.state.lock().reads.push_back(None);
    }

    /// Queue a raw header
    pub fn queue_header(&self, status: u8, length: u8, check: u8) {
        self.queue_read(vec![status, length, check]);
    }

    /// Queue a well-formed header and body for `packet`
    pub fn queue_reply(&self, packet: &Packet) {
        let status = packet.payload().first().copied().unwrap_or(0);
        let length = u8::try_from(packet.len()).unwrap_or(u8::MAX);
        self.queue_header(status, length, checksum::header_checksum(status, length));
        self.queue_read(packet.as_bytes().to_vec());
    }

    /// Fail the next `count` writes
    pub fn fail_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// All non-empty writes so far
    pub fn written(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().written.clone()
    }

    /// All reads so far as (address, length)
    pub fn reads(&self) -> Vec<(u8, usize)> {
        self.state.lock().read_log.clone()
    }

    fn present(state: &BusState, address: u8) -> bool {
        state.devices.is_empty() || state.devices.contains(&address)
    }
}

#[async_trait]
impl BusLink for MockBus {
    async fn write(&mut self, address: u8, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !Self::present(&state, address) {
            return Err(TransportError::Bus {
                address,
                reason: "no acknowledge".to_string(),
            });
        }
        if !data.is_empty() {
            state.written.push((address, data.to_vec()));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(TransportError::Bus {
                address,
                reason: "arbitration lost".to_string(),
            });
        }
        Ok(())
    }

    async fn read(&mut self, address: u8, len: usize) -> Result<Bytes, TransportError> {
        let mut state = self.state.lock();
        state.read_log.push((address, len));
        if !Self::present(&state, address) {
            return Err(TransportError::Bus {
                address,
                reason: "no acknowledge".to_string(),
            });
        }
        match state.reads.pop_front() {
            Some(Some(mut bytes)) => {
                bytes.truncate(len);
                Ok(Bytes::from(bytes))
            }
            _ => Err(TransportError::Bus {
                address,
                reason: "read failed".to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        "mock-bus".to_string()
    }
}
