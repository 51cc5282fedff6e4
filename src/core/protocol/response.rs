//! Response payload parsing

use super::codec::{Status, RS};
use crate::core::error::{CallError, CallErrorKind};
use serde::Serialize;
use std::str::FromStr;

/// Bytes consumed before the result fields: status header plus separator
const FIELD_OFFSET: usize = 2;

/// Return value of a remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallResult {
    /// The function returned nothing
    None,
    /// A single value
    Single(String),
    /// Several values in declared order
    Multiple(Vec<String>),
}

impl CallResult {
    /// Single value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the call returned nothing
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// All values as a list (empty for [`CallResult::None`])
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Single(s) => vec![s],
            Self::Multiple(v) => v,
        }
    }

    /// Parse a single value
    pub fn parse<T: FromStr>(&self) -> Option<T> {
        self.as_str().and_then(|s| s.trim().parse().ok())
    }
}

/// Split a success payload into its result fields
fn split_fields(payload: &[u8]) -> CallResult {
    let rest = payload.get(FIELD_OFFSET..).unwrap_or_default();
    let mut fields: Vec<String> = rest
        .split(|&b| b == RS)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect();

    match fields.len() {
        1 if fields[0].is_empty() => CallResult::None,
        1 => CallResult::Single(fields.remove(0)),
        _ => CallResult::Multiple(fields),
    }
}

/// Parse a response payload (the packet without its checksum).
///
/// `'S'` yields the call result; `'F'` becomes a terminal remote error
/// carrying the peer's message; any other header is a protocol error.
pub fn parse_response(payload: &[u8], address: u8) -> Result<CallResult, CallError> {
    let Some(&header) = payload.first() else {
        return Err(CallError::new(
            CallErrorKind::Protocol,
            address,
            "empty response payload",
        ));
    };

    match Status::from_byte(header) {
        Some(Status::Success) => Ok(split_fields(payload)),
        Some(Status::Failure) => {
            let message = payload.get(FIELD_OFFSET..).unwrap_or_default();
            Err(CallError::new(
                CallErrorKind::Remote,
                address,
                String::from_utf8_lossy(message),
            ))
        }
        _ => Err(CallError::new(
            CallErrorKind::Protocol,
            address,
            format!("unrecognized response header 0x{header:02x}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_return_value() {
        assert_eq!(parse_response(b"S\x1e", 0).unwrap(), CallResult::None);
        assert_eq!(parse_response(b"S", 0).unwrap(), CallResult::None);
    }

    #[test]
    fn test_single_value() {
        let result = parse_response(b"S\x1e7", 0).unwrap();
        assert_eq!(result, CallResult::Single("7".into()));
        assert_eq!(result.parse::<i32>(), Some(7));
    }

    #[test]
    fn test_multiple_values() {
        let result = parse_response(b"S\x1e1\x1e2\x1e3", 0).unwrap();
        assert_eq!(
            result,
            CallResult::Multiple(vec!["1".into(), "2".into(), "3".into()])
        );
        assert_eq!(result.into_vec(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_empty_fields_are_kept_in_lists() {
        let result = parse_response(b"S\x1e\x1e", 0).unwrap();
        assert_eq!(result, CallResult::Multiple(vec![String::new(), String::new()]));
    }

    #[test]
    fn test_failure_carries_message_and_address() {
        let err = parse_response(b"F\x1ebad pin", 0x42).unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Remote);
        assert_eq!(err.address, 0x42);
        assert_eq!(err.detail, "bad pin");
        assert!(err.to_string().contains("bad pin"));
    }

    #[test]
    fn test_unknown_header() {
        let err = parse_response(b"X\x1e", 3).unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Protocol);
        assert!(err.detail.contains("unrecognized response header"));
    }
}
