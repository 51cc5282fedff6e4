//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Argument parsing helpers
//! - Logging setup

pub mod exit_codes;
pub mod logging;

pub use exit_codes::{exit_code_description, CliResult, ExitCodes};
pub use logging::init_logging;

use crate::core::device::{MAX_BUS_ADDRESS, MIN_BUS_ADDRESS};
use clap::ValueEnum;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

/// Parse an integer written as `0x..`, `0o..`, `0b..` or decimal
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim().replace('_', "");
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, text),
    };
    let lower = digits.to_ascii_lowercase();
    let value = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        lower.parse().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Parse a target address for the bus (`0x08`..=`0x77`)
pub fn parse_bus_address(text: &str) -> Result<u8, CliResult> {
    let value = parse_int(text)
        .ok_or_else(|| CliResult::invalid_args("new address must be 0xNN or a decimal integer"))?;
    u8::try_from(value)
        .ok()
        .filter(|addr| (MIN_BUS_ADDRESS..=MAX_BUS_ADDRESS).contains(addr))
        .ok_or_else(|| {
            CliResult::out_of_range(format!(
                "I2C address must be in the range of 0x{MIN_BUS_ADDRESS:02x}~0x{MAX_BUS_ADDRESS:02x}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_prefixes() {
        assert_eq!(parse_int("0x41"), Some(65));
        assert_eq!(parse_int("0X41"), Some(65));
        assert_eq!(parse_int("65"), Some(65));
        assert_eq!(parse_int("0o101"), Some(65));
        assert_eq!(parse_int("0b1000001"), Some(65));
        assert_eq!(parse_int("-3"), Some(-3));
        assert_eq!(parse_int("zz"), None);
        assert_eq!(parse_int("0x"), None);
    }

    #[test]
    fn test_bus_address_codes() {
        assert_eq!(parse_bus_address("0x41").unwrap(), 0x41);
        assert_eq!(parse_bus_address("8").unwrap(), 8);
        assert_eq!(parse_bus_address("forty").unwrap_err().code(), ExitCodes::INVALID_ARGS);
        assert_eq!(parse_bus_address("0x78").unwrap_err().code(), ExitCodes::OUT_OF_RANGE);
        assert_eq!(parse_bus_address("300").unwrap_err().code(), ExitCodes::OUT_OF_RANGE);
        assert_eq!(parse_bus_address("-1").unwrap_err().code(), ExitCodes::OUT_OF_RANGE);
    }
}
