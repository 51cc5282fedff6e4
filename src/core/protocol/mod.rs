//! Chaino wire protocol
//!
//! - Checksums (CRC-16/XMODEM, bus header complement sum)
//! - Request/response packet codec
//! - Frame acquisition for stream and bus transports
//! - Response parsing

pub mod checksum;
pub mod codec;
pub mod framing;
pub mod response;

pub use checksum::{crc16, crc16_xmodem, verify};
pub use codec::{
    decode_request, encode_request, encode_response, render_for_log, CodecError, Packet, Request,
    Status, Value, EOT, PACKET_RQ_RESEND, RS,
};
pub use framing::{BusChannel, BusHeader, BusRetryPolicy, StreamChannel};
pub use response::{parse_response, CallResult};
