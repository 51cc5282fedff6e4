//! Packet codec
//!
//! Builds request packets from an address, a function number and an
//! argument list, and renders packets for logs.
//!
//! Wire layout: `checksum:u16-BE ‖ ASCII payload`. Payload fields are joined
//! by [`RS`]; the stream transport appends [`EOT`] after the packet.

use super::checksum::{self, CHECKSUM_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Field separator (record separator)
pub const RS: u8 = 0x1E;

/// Stream frame terminator (end of transmission)
pub const EOT: u8 = 0x04;

/// Leading field of a stream-form request
pub const REQUEST_LEADER: &str = "R";

/// Resend-request control packet: `0x1861 ‖ 'E'`
pub const PACKET_RQ_RESEND: [u8; 3] = [0x18, 0x61, b'E'];

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Argument contains a reserved separator or terminator byte
    #[error("argument {index} contains reserved byte 0x{byte:02x}")]
    ReservedByte {
        /// Argument position
        index: usize,
        /// Offending byte
        byte: u8,
    },

    /// Argument is not ASCII
    #[error("argument {0} is not ASCII")]
    NonAscii(usize),

    /// Packet failed checksum validation
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Packet structure is not a request
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

/// A remote call argument.
///
/// The peer firmware has no notion of argument types; every value travels as
/// its string form and booleans become `"1"`/`"0"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean, sent as `"1"` or `"0"`
    Bool(bool),
    /// Signed integer, sent in decimal
    Int(i64),
    /// Unsigned integer, sent in decimal
    UInt(u64),
    /// Floating point, sent with a fractional part
    Float(f64),
    /// Text, sent verbatim
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("1"),
            Self::Bool(false) => f.write_str("0"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write_float(f, *v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Shortest round-trip form: positional with a fractional part for
/// `1e-4 <= |v| < 1e16`, otherwise `d.ddde±XX` with at least two exponent
/// digits. Non-finite values are `nan`, `inf` and `-inf`.
fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("nan");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "inf" } else { "-inf" });
    }

    let scientific = format!("{v:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if v != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return write!(f, "{mantissa}e{sign}{:02}", exponent.unsigned_abs());
    }

    let positional = format!("{v}");
    if positional.contains('.') {
        f.write_str(&positional)
    } else {
        write!(f, "{positional}.0")
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! value_from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        }
    )*};
}

macro_rules! value_from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::UInt(u64::from(v))
            }
        }
    )*};
}

value_from_signed!(i8, i16, i32, i64);
value_from_unsigned!(u8, u16, u32, u64);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Build an argument list from heterogeneous values
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($arg:expr),+ $(,)?) => { vec![$($crate::Value::from($arg)),+] };
}

/// Response status header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Call succeeded, result fields follow
    Success,
    /// Call failed, error message follows
    Failure,
    /// Peer received a corrupt packet from us
    CorruptRequest,
}

impl Status {
    /// Header byte on the wire
    pub fn byte(self) -> u8 {
        match self {
            Self::Success => b'S',
            Self::Failure => b'F',
            Self::CorruptRequest => b'E',
        }
    }

    /// Parse a header byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'S' => Some(Self::Success),
            b'F' => Some(Self::Failure),
            b'E' => Some(Self::CorruptRequest),
            _ => None,
        }
    }
}

/// A checksummed packet: `checksum ‖ payload`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet(Bytes);

impl Packet {
    /// Prepend the checksum of `payload`
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(CHECKSUM_LEN + payload.len());
        buf.put_slice(&checksum::checksum_bytes(payload));
        buf.put_slice(payload);
        Self(buf.freeze())
    }

    /// Wrap raw bytes received from a transport, without validation
    pub fn from_wire(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The reserved resend-request control packet
    pub fn resend_request() -> Self {
        Self(Bytes::from_static(&PACKET_RQ_RESEND))
    }

    /// Raw packet bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Embedded checksum, if the packet is long enough to carry one
    pub fn checksum(&self) -> Option<u16> {
        (self.0.len() >= CHECKSUM_LEN).then(|| u16::from_be_bytes([self.0[0], self.0[1]]))
    }

    /// Payload after the checksum prefix
    pub fn payload(&self) -> &[u8] {
        self.0.get(CHECKSUM_LEN..).unwrap_or_default()
    }

    /// Packet length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the packet is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the checksum matches the payload
    pub fn is_valid(&self) -> bool {
        checksum::verify(&self.0)
    }

    /// Stream wire form: the packet followed by [`EOT`]
    pub fn framed(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.0.len() + 1);
        buf.put_slice(&self.0);
        buf.put_u8(EOT);
        buf.freeze()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_for_log(&self.0))
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Target address (stream form only)
    pub address: Option<u8>,
    /// Remote function number
    pub func_num: u16,
    /// Arguments in their wire string form
    pub args: Vec<String>,
}

/// Encode a remote call request.
///
/// With an address the stream form is produced
/// (`R{RS}AA{RS}F{RS}args…`); without one the bus form (`F{RS}args…`).
pub fn encode_request(
    address: Option<u8>,
    func_num: u16,
    args: &[Value],
) -> Result<Packet, CodecError> {
    let mut fields: Vec<String> = Vec::with_capacity(args.len() + 3);
    if let Some(addr) = address {
        fields.push(REQUEST_LEADER.to_string());
        fields.push(format!("{addr:02x}"));
    }
    fields.push(format!("{func_num:x}"));

    for (index, arg) in args.iter().enumerate() {
        let text = arg.to_string();
        if !text.is_ascii() {
            return Err(CodecError::NonAscii(index));
        }
        if let Some(&byte) = text.as_bytes().iter().find(|&&b| b == RS || b == EOT) {
            return Err(CodecError::ReservedByte { index, byte });
        }
        fields.push(text);
    }

    let payload = fields.join(&char::from(RS).to_string());
    Ok(Packet::from_payload(payload.as_bytes()))
}

/// Decode a request packet produced by [`encode_request`]
pub fn decode_request(packet: &Packet) -> Result<Request, CodecError> {
    if !packet.is_valid() {
        return Err(CodecError::ChecksumMismatch);
    }
    let payload =
        std::str::from_utf8(packet.payload()).map_err(|_| CodecError::Malformed("not ASCII"))?;
    let mut fields = payload.split(char::from(RS));

    let first = fields.next().ok_or(CodecError::Malformed("empty payload"))?;
    let (address, func_field) = if first == REQUEST_LEADER {
        let addr = fields.next().ok_or(CodecError::Malformed("missing address"))?;
        if addr.len() != 2 {
            return Err(CodecError::Malformed("address must be two hex digits"));
        }
        let addr = u8::from_str_radix(addr, 16).map_err(|_| CodecError::Malformed("bad address"))?;
        let func = fields.next().ok_or(CodecError::Malformed("missing function number"))?;
        (Some(addr), func)
    } else {
        (None, first)
    };

    let func_num =
        u16::from_str_radix(func_field, 16).map_err(|_| CodecError::Malformed("bad function number"))?;

    Ok(Request {
        address,
        func_num,
        args: fields.map(str::to_string).collect(),
    })
}

/// Build a response packet as a peer would send it.
///
/// `'E'` is sent as the bare status byte; other statuses are followed by a
/// separator and the fields.
pub fn encode_response(status: Status, fields: &[&str]) -> Packet {
    let mut payload = vec![status.byte()];
    if status != Status::CorruptRequest {
        payload.push(RS);
        payload.extend_from_slice(fields.join(&char::from(RS).to_string()).as_bytes());
    }
    Packet::from_payload(&payload)
}

/// Debug rendering: `<[0xCCCC]payload>:N bytes` with separators spelled out
pub fn render_for_log(packet: &[u8]) -> String {
    let split = packet.len().min(CHECKSUM_LEN);
    let (crc, data) = packet.split_at(split);

    let mut out = format!("<[0x{}]", hex::encode(crc));
    for &byte in data {
        match byte {
            RS => out.push_str("{RS}"),
            EOT => out.push_str("{EOT}"),
            0x20..=0x7E => out.push(char::from(byte)),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push_str(&format!(">:{} bytes", packet.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_request_layout() {
        let packet = encode_request(Some(0x00), 0, &[]).unwrap();
        assert_eq!(packet.payload(), b"R\x1e00\x1e0");
        assert_eq!(packet.checksum(), Some(0xCF45));
        assert!(packet.is_valid());
    }

    #[test]
    fn test_bus_request_omits_leader_and_address() {
        let packet = encode_request(None, 205, &args![255, 0, 0]).unwrap();
        assert_eq!(packet.payload(), b"cd\x1e255\x1e0\x1e0");
    }

    #[test]
    fn test_function_number_is_lowercase_unpadded_hex() {
        let packet = encode_request(Some(0x42), 0x0B, &[]).unwrap();
        assert_eq!(packet.payload(), b"R\x1e42\x1eb");
        let packet = encode_request(Some(0x07), 0x1AB, &[]).unwrap();
        assert_eq!(packet.payload(), b"R\x1e07\x1e1ab");
    }

    #[test]
    fn test_argument_mapping() {
        let packet =
            encode_request(Some(1), 1, &args![true, false, -3, 7u8, 2.5, 1.0, "abc"]).unwrap();
        assert_eq!(
            packet.payload(),
            b"R\x1e01\x1e1\x1e1\x1e0\x1e-3\x1e7\x1e2.5\x1e1.0\x1eabc"
        );

        let floats = [
            (0.1, "0.1"),
            (-0.0, "-0.0"),
            (1e15, "1000000000000000.0"),
            (1e16, "1e+16"),
            (1.5e16, "1.5e+16"),
            (123_456_789_012_345_680.0, "1.2345678901234568e+17"),
            (0.0001, "0.0001"),
            (1e-5, "1e-05"),
            (-2.5e-7, "-2.5e-07"),
            (1e100, "1e+100"),
            (f64::NAN, "nan"),
            (f64::INFINITY, "inf"),
            (f64::NEG_INFINITY, "-inf"),
        ];
        for (value, expected) in floats {
            assert_eq!(Value::from(value).to_string(), expected, "{value:e}");
        }
    }

    #[test]
    fn test_reserved_bytes_rejected() {
        let err = encode_request(Some(1), 1, &args!["ok", "a\x1eb"]).unwrap_err();
        assert_eq!(err, CodecError::ReservedByte { index: 1, byte: RS });
        let err = encode_request(None, 1, &args!["\x04"]).unwrap_err();
        assert_eq!(err, CodecError::ReservedByte { index: 0, byte: EOT });
        let err = encode_request(None, 1, &args!["é"]).unwrap_err();
        assert_eq!(err, CodecError::NonAscii(0));
    }

    #[test]
    fn test_round_trip() {
        for addr in [0u8, 0x08, 0x42, 0x7F] {
            for func in [0u16, 1, 0x0F, 0x10, 0xC9, 0xFF] {
                let args = args![true, 12, -1, "pin"];
                let packet = encode_request(Some(addr), func, &args).unwrap();
                let decoded = decode_request(&packet).unwrap();
                assert_eq!(decoded.address, Some(addr));
                assert_eq!(decoded.func_num, func);
                assert_eq!(decoded.args, vec!["1", "12", "-1", "pin"]);
            }
        }

        let packet = encode_request(None, 0x2A, &args![false]).unwrap();
        let decoded = decode_request(&packet).unwrap();
        assert_eq!(decoded.address, None);
        assert_eq!(decoded.func_num, 0x2A);
        assert_eq!(decoded.args, vec!["0"]);
    }

    #[test]
    fn test_decode_rejects_corrupt_packet() {
        let packet = encode_request(Some(1), 3, &[]).unwrap();
        let mut raw = packet.as_bytes().to_vec();
        raw[3] ^= 0x01;
        assert_eq!(
            decode_request(&Packet::from_wire(raw)),
            Err(CodecError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_resend_request_is_checksummed_e() {
        assert_eq!(Packet::resend_request(), Packet::from_payload(b"E"));
        assert_eq!(encode_response(Status::CorruptRequest, &[]), Packet::resend_request());
    }

    #[test]
    fn test_encode_response() {
        assert_eq!(encode_response(Status::Success, &[]).payload(), b"S\x1e");
        assert_eq!(encode_response(Status::Success, &["7"]).payload(), b"S\x1e7");
        assert_eq!(
            encode_response(Status::Failure, &["bad pin"]).payload(),
            b"F\x1ebad pin"
        );
    }

    #[test]
    fn test_framed_appends_terminator() {
        let framed = Packet::resend_request().framed();
        assert_eq!(&framed[..], &[0x18, 0x61, b'E', EOT]);
    }

    #[test]
    fn test_render_for_log() {
        let packet = encode_request(Some(0), 0, &[]).unwrap();
        assert_eq!(render_for_log(packet.as_bytes()), "<[0xcf45]R{RS}00{RS}0>:8 bytes");
        assert_eq!(render_for_log(&packet.framed()), "<[0xcf45]R{RS}00{RS}0{EOT}>:9 bytes");
        assert_eq!(render_for_log(&[0x00, 0x01, 0xFF]), "<[0x0001]\\xff>:3 bytes");
    }
}
