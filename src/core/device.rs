//! Typed veneer over the generic call
//!
//! Every Chaino firmware answers the same small set of system functions;
//! [`Device`] gives them names and return types.

use super::error::{CallError, CallErrorKind};
use super::protocol::{CallResult, Value};
use super::session::{handshake, RemoteCall};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Reply to [`FunctionId::Handshake`] from a Chaino device
pub const HANDSHAKE_REPLY: &str = "ImChn";

/// Lowest assignable bus address
pub const MIN_BUS_ADDRESS: u8 = 0x08;

/// Highest assignable bus address
pub const MAX_BUS_ADDRESS: u8 = 0x77;

/// Firmware function numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FunctionId {
    /// Liveness check, answers `ImChn`
    Handshake = 0,
    /// `pinMode(pin, mode)`
    PinMode = 11,
    /// `digitalRead(pin)`
    DigitalRead = 12,
    /// `digitalWrite(pin, level)`
    DigitalWrite = 13,
    /// `analogRead(pin)`
    AnalogRead = 14,
    /// ADC resolution
    AdcBits = 15,
    /// PWM duty
    AnalogWrite = 21,
    /// PWM frequency
    PwmFreq = 22,
    /// PWM resolution
    PwmBits = 23,
    /// Milliseconds since boot
    Millis = 31,
    /// `tone(pin, freq, duration)`
    ToneStart = 41,
    /// `noTone(pin)`
    ToneStop = 42,
    /// Device name
    Who = 201,
    /// Firmware version
    Version = 202,
    /// Configured bus address
    GetAddress = 203,
    /// Store a new bus address
    SetAddress = 204,
    /// On-board RGB LED
    SetNeopixel = 205,
}

impl FunctionId {
    /// Number sent on the wire
    pub fn number(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.number())
    }
}

/// Whether `address` may be assigned to a bus target
pub fn is_assignable_address(address: u8) -> bool {
    (MIN_BUS_ADDRESS..=MAX_BUS_ADDRESS).contains(&address)
}

/// A Chaino device reached through a session
pub struct Device<S> {
    session: S,
}

impl<S: RemoteCall> Device<S> {
    /// Wrap a session
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Underlying session
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Release the session
    pub fn into_inner(self) -> S {
        self.session
    }

    /// Call a named firmware function
    pub async fn call(&self, func: FunctionId, args: &[Value]) -> Result<CallResult, CallError> {
        self.session.call(func.number(), args).await
    }

    async fn call_text(&self, func: FunctionId) -> Result<String, CallError> {
        let result = self.call(func, &[]).await?;
        expect_single(result, self.session.address(), func)
    }

    /// Check the device answers as a Chaino device
    pub async fn handshake(&self) -> Result<(), CallError> {
        handshake(&self.session).await
    }

    /// Device name, e.g. `Chaino_Hana`
    pub async fn who(&self) -> Result<String, CallError> {
        self.call_text(FunctionId::Who).await
    }

    /// Firmware version string
    pub async fn version(&self) -> Result<String, CallError> {
        self.call_text(FunctionId::Version).await
    }

    /// Bus address configured in the device
    pub async fn address(&self) -> Result<u8, CallError> {
        let text = self.call_text(FunctionId::GetAddress).await?;
        parse_field(&text, self.session.address(), FunctionId::GetAddress)
    }

    /// Store a new bus address in the device; takes effect after a reset.
    ///
    /// Nothing is sent when the session already targets `new_address`.
    pub async fn set_address(&self, new_address: u8) -> Result<String, CallError> {
        let current = self.session.address();
        if current == new_address {
            return Ok(format!("address is already set to 0x{current:02x}"));
        }
        let result = self
            .call(FunctionId::SetAddress, &[Value::from(new_address)])
            .await?;
        info!(from = current, to = new_address, "bus address changed");
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    /// Set the on-board RGB LED
    pub async fn set_neopixel(&self, r: u8, g: u8, b: u8) -> Result<(), CallError> {
        self.call(FunctionId::SetNeopixel, &[r.into(), g.into(), b.into()])
            .await
            .map(drop)
    }

    /// Round-trip latency of a `who()` call
    pub async fn ping(&self) -> Result<Duration, CallError> {
        let started = Instant::now();
        self.who().await?;
        Ok(started.elapsed())
    }
}

pub(crate) fn expect_single(result: CallResult, address: u8, func: FunctionId) -> Result<String, CallError> {
    match result {
        CallResult::Single(value) => Ok(value),
        other => Err(CallError::new(
            CallErrorKind::Protocol,
            address,
            format!("{func} expected one value, got {other:?}"),
        )),
    }
}

pub(crate) fn parse_field<T: std::str::FromStr>(text: &str, address: u8, func: FunctionId) -> Result<T, CallError> {
    text.trim().parse().map_err(|_| {
        CallError::new(
            CallErrorKind::Protocol,
            address,
            format!("{func} returned unparsable value {text:?}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::ErrorStats;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Answers every call with a fixed result and records the call
    struct Canned {
        address: u8,
        result: CallResult,
        calls: Mutex<Vec<(u16, Vec<String>)>>,
    }

    impl Canned {
        fn new(address: u8, result: CallResult) -> Self {
            Self {
                address,
                result,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteCall for Canned {
        fn address(&self) -> u8 {
            self.address
        }

        async fn call(&self, func_num: u16, args: &[Value]) -> Result<CallResult, CallError> {
            self.calls
                .lock()
                .push((func_num, args.iter().map(ToString::to_string).collect()));
            Ok(self.result.clone())
        }

        fn stats(&self) -> ErrorStats {
            ErrorStats::default()
        }
    }

    #[tokio::test]
    async fn test_address_parses_decimal() {
        let device = Device::new(Canned::new(0, CallResult::Single("66".into())));
        assert_eq!(device.address().await.unwrap(), 0x42);
        assert_eq!(device.session().calls.lock()[0].0, 203);
    }

    #[tokio::test]
    async fn test_set_address_unchanged_sends_nothing() {
        let device = Device::new(Canned::new(0x42, CallResult::None));
        let message = device.set_address(0x42).await.unwrap();
        assert!(message.contains("0x42"));
        assert!(device.session().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_set_address_sends_decimal() {
        let device = Device::new(Canned::new(0, CallResult::Single("ok".into())));
        assert_eq!(device.set_address(0x41).await.unwrap(), "ok");
        assert_eq!(device.session().calls.lock()[0], (204, vec!["65".to_string()]));
    }

    #[tokio::test]
    async fn test_neopixel_args() {
        let device = Device::new(Canned::new(0x42, CallResult::None));
        device.set_neopixel(255, 0, 16).await.unwrap();
        assert_eq!(
            device.session().calls.lock()[0],
            (205, vec!["255".to_string(), "0".to_string(), "16".to_string()])
        );
    }

    #[tokio::test]
    async fn test_handshake_mismatch() {
        let device = Device::new(Canned::new(0, CallResult::Single("nope".into())));
        let err = device.handshake().await.unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Handshake);
    }

    #[tokio::test]
    async fn test_who_rejects_list() {
        let device = Device::new(Canned::new(0, CallResult::Multiple(vec!["a".into(), "b".into()])));
        let err = device.who().await.unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Protocol);
    }

    #[test]
    fn test_assignable_range() {
        assert!(!is_assignable_address(0x07));
        assert!(is_assignable_address(0x08));
        assert!(is_assignable_address(0x77));
        assert!(!is_assignable_address(0x78));
        assert_eq!(FunctionId::SetNeopixel.to_string(), "SetNeopixel(205)");
    }
}
