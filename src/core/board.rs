//! Chaino_Hana board API
//!
//! Arduino-style pin, ADC, PWM and tone control on top of [`Device`].

use super::device::{expect_single, parse_field, Device, FunctionId};
use super::error::CallError;
use super::protocol::Value;
use super::session::RemoteCall;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;

/// Pin configuration, numbered as in the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PinMode {
    /// Floating input
    Input = 0,
    /// Push-pull output
    Output = 1,
    /// Input with pull-up
    InputPullup = 2,
    /// Input with pull-down
    InputPulldown = 3,
}

/// Scientific pitch table, `b0` through `d#8`
#[rustfmt::skip]
const PITCHES: &[(&str, u32)] = &[
    ("b0", 31),
    ("c1", 33), ("c#1", 35), ("db1", 35), ("d1", 37), ("d#1", 39), ("eb1", 39),
    ("e1", 41), ("f1", 44), ("f#1", 46), ("gb1", 46), ("g1", 49), ("g#1", 52), ("ab1", 52),
    ("a1", 55), ("a#1", 58), ("bb1", 58), ("b1", 62),
    ("c2", 65), ("c#2", 69), ("db2", 69), ("d2", 73), ("d#2", 78), ("eb2", 78),
    ("e2", 82), ("f2", 87), ("f#2", 93), ("gb2", 93), ("g2", 98), ("g#2", 104), ("ab2", 104),
    ("a2", 110), ("a#2", 117), ("bb2", 117), ("b2", 123),
    ("c3", 131), ("c#3", 139), ("db3", 139), ("d3", 147), ("d#3", 156), ("eb3", 156),
    ("e3", 165), ("f3", 175), ("f#3", 185), ("gb3", 185), ("g3", 196), ("g#3", 208), ("ab3", 208),
    ("a3", 220), ("a#3", 233), ("bb3", 233), ("b3", 247),
    ("c4", 262), ("c#4", 277), ("db4", 277), ("d4", 294), ("d#4", 311), ("eb4", 311),
    ("e4", 330), ("f4", 349), ("f#4", 370), ("gb4", 370), ("g4", 392), ("g#4", 415), ("ab4", 415),
    ("a4", 440), ("a#4", 466), ("bb4", 466), ("b4", 494),
    ("c5", 523), ("c#5", 554), ("db5", 554), ("d5", 587), ("d#5", 622), ("eb5", 622),
    ("e5", 659), ("f5", 698), ("f#5", 740), ("gb5", 740), ("g5", 784), ("g#5", 831), ("ab5", 831),
    ("a5", 880), ("a#5", 932), ("bb5", 932), ("b5", 988),
    ("c6", 1047), ("c#6", 1109), ("db6", 1109), ("d6", 1175), ("d#6", 1245), ("eb6", 1245),
    ("e6", 1319), ("f6", 1397), ("f#6", 1480), ("gb6", 1480), ("g6", 1568), ("g#6", 1661), ("ab6", 1661),
    ("a6", 1760), ("a#6", 1865), ("bb6", 1865), ("b6", 1976),
    ("c7", 2093), ("c#7", 2217), ("db7", 2217), ("d7", 2349), ("d#7", 2489), ("eb7", 2489),
    ("e7", 2637), ("f7", 2794), ("f#7", 2960), ("gb7", 2960), ("g7", 3136), ("g#7", 3322), ("ab7", 3322),
    ("a7", 3520), ("a#7", 3729), ("bb7", 3729), ("b7", 3951),
    ("c8", 4186), ("c#8", 4435), ("db8", 4435), ("d8", 4699), ("d#8", 4978), ("eb8", 4978),
];

/// Solfège and bare letter names, all in octave 4
#[rustfmt::skip]
const NOTES: &[(&str, &str)] = &[
    ("do", "c4"), ("re", "d4"), ("mi", "e4"), ("fa", "f4"), ("sol", "g4"), ("la", "a4"), ("si", "b4"),
    ("c", "c4"), ("d", "d4"), ("e", "e4"), ("f", "f4"), ("g", "g4"), ("a", "a4"), ("b", "b4"),
];

fn pitch(name: &str) -> Option<u32> {
    PITCHES.iter().find(|(n, _)| *n == name).map(|&(_, hz)| hz)
}

/// Frequency in Hz of a note name (`c4`, `A#5`, `db3`, `do`, `Sol`)
pub fn note_frequency(name: &str) -> Option<u32> {
    let name = name.trim().to_ascii_lowercase();
    pitch(&name).or_else(|| {
        NOTES
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, scientific)| pitch(scientific))
    })
}

/// Note name not in the pitch table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown note: {0}")]
pub struct UnknownNote(pub String);

/// Tone frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone(u32);

impl Tone {
    /// Tone at an explicit frequency
    pub fn hz(frequency: u32) -> Self {
        Self(frequency)
    }

    /// Tone for a note name
    pub fn note(name: &str) -> Result<Self, UnknownNote> {
        note_frequency(name)
            .map(Self)
            .ok_or_else(|| UnknownNote(name.to_string()))
    }

    /// Frequency in Hz
    pub fn frequency(self) -> u32 {
        self.0
    }
}

impl From<u32> for Tone {
    fn from(frequency: u32) -> Self {
        Self(frequency)
    }
}

/// Accepts a plain frequency or a note name
impl FromStr for Tone {
    type Err = UnknownNote;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u32>() {
            Ok(hz) => Ok(Self(hz)),
            Err(_) => Self::note(s),
        }
    }
}

/// A Chaino_Hana board
pub struct Board<S> {
    device: Device<S>,
}

impl<S: RemoteCall> Board<S> {
    /// Wrap a session to a Hana board
    pub fn new(session: S) -> Self {
        Self {
            device: Device::new(session),
        }
    }

    async fn exec(&self, func: FunctionId, args: &[Value]) -> Result<(), CallError> {
        self.device.call(func, args).await.map(drop)
    }

    async fn query<T: FromStr>(&self, func: FunctionId, args: &[Value]) -> Result<T, CallError> {
        let address = self.device.session().address();
        let result = self.device.call(func, args).await?;
        let text = expect_single(result, address, func)?;
        parse_field(&text, address, func)
    }

    /// `pinMode()`
    pub async fn set_pin_mode(&self, pin: u8, mode: PinMode) -> Result<(), CallError> {
        self.exec(FunctionId::PinMode, &[pin.into(), (mode as u8).into()])
            .await
    }

    /// `digitalRead()`, `true` for HIGH
    pub async fn read_digital(&self, pin: u8) -> Result<bool, CallError> {
        let level: u8 = self.query(FunctionId::DigitalRead, &[pin.into()]).await?;
        Ok(level != 0)
    }

    /// `digitalWrite()`
    pub async fn write_digital(&self, pin: u8, high: bool) -> Result<(), CallError> {
        self.exec(FunctionId::DigitalWrite, &[pin.into(), high.into()])
            .await
    }

    /// `analogRead()`; range depends on [`Board::set_adc_bits`]
    pub async fn read_analog(&self, pin: u8) -> Result<u32, CallError> {
        self.query(FunctionId::AnalogRead, &[pin.into()]).await
    }

    /// ADC resolution in bits
    pub async fn set_adc_bits(&self, bits: u8) -> Result<(), CallError> {
        self.exec(FunctionId::AdcBits, &[bits.into()]).await
    }

    /// `analogWrite()` duty cycle
    pub async fn write_analog(&self, pin: u8, duty: u32) -> Result<(), CallError> {
        self.exec(FunctionId::AnalogWrite, &[pin.into(), duty.into()])
            .await
    }

    /// PWM frequency in Hz
    pub async fn set_pwm_freq(&self, pin: u8, frequency: u32) -> Result<(), CallError> {
        self.exec(FunctionId::PwmFreq, &[pin.into(), frequency.into()])
            .await
    }

    /// PWM resolution in bits
    pub async fn set_pwm_bits(&self, pin: u8, bits: u8) -> Result<(), CallError> {
        self.exec(FunctionId::PwmBits, &[pin.into(), bits.into()])
            .await
    }

    /// Milliseconds since the board started; wraps after about 50 days
    pub async fn millis(&self) -> Result<u32, CallError> {
        self.query(FunctionId::Millis, &[]).await
    }

    /// `tone()`; a zero duration plays until [`Board::stop_tone`]
    pub async fn start_tone(&self, pin: u8, tone: Tone, duration_ms: u32) -> Result<(), CallError> {
        self.exec(
            FunctionId::ToneStart,
            &[pin.into(), tone.frequency().into(), duration_ms.into()],
        )
        .await
    }

    /// `noTone()`
    pub async fn stop_tone(&self, pin: u8) -> Result<(), CallError> {
        self.exec(FunctionId::ToneStop, &[pin.into()]).await
    }
}

impl<S> Deref for Board<S> {
    type Target = Device<S>;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
