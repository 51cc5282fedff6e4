//! Serial port stream link

use super::{StreamLink, TransportError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use tracing::debug;

/// Default baud rate of Chaino master devices
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
}

impl SerialConfig {
    /// Create a new serial configuration with 8N1 framing
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
        }
    }

    /// Short `8N1`-style description
    pub fn framing(&self) -> String {
        format!(
            "{}{}{}",
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

/// Buffer control beyond plain async I/O
pub trait PortControl: Send {
    /// Discard OS-level input and output buffers
    fn discard_buffers(&mut self) -> io::Result<()>;

    /// Bytes waiting in the OS input buffer
    fn pending(&self) -> io::Result<usize>;
}

impl PortControl for SerialStream {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn pending(&self) -> io::Result<usize> {
        self.bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }
}

/// Stream link over a serial port (or any async byte stream).
///
/// Bytes read past a terminator stay buffered for the next read.
pub struct SerialLink<S = SerialStream> {
    stream: S,
    rx: BytesMut,
    read_timeout: Duration,
    write_timeout: Option<Duration>,
    name: String,
}

impl SerialLink<SerialStream> {
    /// Open a serial port
    pub fn open(
        port: &str,
        config: &SerialConfig,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(TransportError::InvalidConfiguration(format!(
                    "unsupported data bits: {other}"
                )))
            }
        };

        let stop_bits = match config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let flow_control = match config.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(read_timeout)
            .open_native_async()
            .map_err(|e| match e.kind() {
                tokio_serial::ErrorKind::NoDevice => TransportError::PortNotFound(port.to_string()),
                tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(port.to_string())
                }
                tokio_serial::ErrorKind::Io(io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(port.to_string())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        let name = format!("{} @ {} baud ({})", port, config.baud_rate, config.framing());
        debug!(link = %name, "serial port opened");
        Ok(Self::new(stream, name, read_timeout))
    }
}

impl<S> SerialLink<S>
where
    S: AsyncRead + AsyncWrite + PortControl + Unpin + Send,
{
    /// Wrap an already-open stream
    pub fn new(stream: S, name: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            stream,
            rx: BytesMut::with_capacity(256),
            read_timeout,
            write_timeout: None,
            name: name.into(),
        }
    }

    /// Bound every write (including the flush) by `timeout`
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    async fn write_flush(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Pull one chunk into the receive buffer; `false` once `deadline` passes
    async fn fill(&mut self, deadline: Instant) -> Result<bool, TransportError> {
        let mut chunk = [0u8; 256];
        match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
            Err(_) => Ok(false),
            Ok(Ok(0)) => Err(TransportError::Disconnected),
            Ok(Ok(n)) => {
                self.rx.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Ok(false),
            Ok(Err(e)) => Err(TransportError::IoError(e)),
        }
    }
}

#[async_trait]
impl<S> StreamLink for SerialLink<S>
where
    S: AsyncRead + AsyncWrite + PortControl + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.write_flush(data))
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => self.write_flush(data).await,
        }
    }

    async fn read_exact(&mut self, len: usize) -> Result<Bytes, TransportError> {
        let deadline = Instant::now() + self.read_timeout;
        while self.rx.len() < len {
            if !self.fill(deadline).await? {
                break;
            }
        }
        let n = len.min(self.rx.len());
        Ok(self.rx.split_to(n).freeze())
    }

    async fn read_until(&mut self, terminator: u8) -> Result<Bytes, TransportError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if let Some(pos) = self.rx.iter().position(|&b| b == terminator) {
                return Ok(self.rx.split_to(pos + 1).freeze());
            }
            if !self.fill(deadline).await? {
                return Ok(self.rx.split().freeze());
            }
        }
    }

    async fn clear_buffers(&mut self) -> Result<(), TransportError> {
        self.rx.clear();
        self.stream.discard_buffers()?;
        Ok(())
    }

    async fn drain(&mut self) -> Result<usize, TransportError> {
        let mut discarded = self.rx.len();
        self.rx.clear();

        let mut chunk = [0u8; 256];
        loop {
            let pending = self.stream.pending()?;
            if pending == 0 {
                break;
            }
            let want = pending.min(chunk.len());
            match tokio::time::timeout(self.read_timeout, self.stream.read(&mut chunk[..want])).await {
                Ok(Ok(0)) => return Err(TransportError::Disconnected),
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(TransportError::IoError(e)),
                Err(_) => break,
            }
        }
        Ok(discarded)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    impl PortControl for DuplexStream {
        fn discard_buffers(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn pending(&self) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl PortControl for tokio_test::io::Mock {
        fn discard_buffers(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn pending(&self) -> io::Result<usize> {
            Ok(0)
        }
    }

    fn link(stream: DuplexStream) -> SerialLink<DuplexStream> {
        SerialLink::new(stream, "duplex", Duration::from_millis(30))
    }

    #[tokio::test]
    async fn test_read_exact_and_until() {
        let (host, mut peer) = duplex(64);
        let mut link = link(host);

        peer.write_all(b"\xab\x04hello\x04next").await.unwrap();

        // The checksum bytes may contain the terminator value
        let crc = link.read_exact(2).await.unwrap();
        assert_eq!(&crc[..], b"\xab\x04");

        let body = link.read_until(0x04).await.unwrap();
        assert_eq!(&body[..], b"hello\x04");

        // Leftover bytes stay buffered; no terminator arrives before the timeout
        let rest = link.read_until(0x04).await.unwrap();
        assert_eq!(&rest[..], b"next");
    }

    #[tokio::test]
    async fn test_short_read_on_timeout() {
        let (host, mut peer) = duplex(64);
        let mut link = link(host);

        peer.write_all(b"\x01").await.unwrap();
        let got = link.read_exact(2).await.unwrap();
        assert_eq!(&got[..], b"\x01");
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let (host, mut peer) = duplex(64);
        let mut link = link(host);

        link.write_all(b"ping\x04").await.unwrap();
        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping\x04");
    }

    #[tokio::test]
    async fn test_clear_discards_buffered_bytes() {
        let (host, mut peer) = duplex(64);
        let mut link = link(host);

        peer.write_all(b"garbage-without-terminator").await.unwrap();
        let partial = link.read_exact(3).await.unwrap();
        assert_eq!(&partial[..], b"gar");

        link.clear_buffers().await.unwrap();
        assert_eq!(link.drain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_peer_hangup_is_disconnect() {
        let (host, peer) = duplex(64);
        let mut link = link(host);
        drop(peer);

        assert!(matches!(
            link.read_exact(2).await,
            Err(TransportError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_scripted_exchange() {
        let mock = tokio_test::io::Builder::new()
            .write(b"\xcf\x45R\x1e00\x1e0\x04")
            .read(b"\x61\x56S\x1e7\x04")
            .build();
        let mut link = SerialLink::new(mock, "mock", Duration::from_millis(30));

        link.write_all(b"\xcf\x45R\x1e00\x1e0\x04").await.unwrap();
        let crc = link.read_exact(2).await.unwrap();
        let body = link.read_until(0x04).await.unwrap();
        assert_eq!(&crc[..], b"\x61\x56");
        assert_eq!(&body[..], b"S\x1e7\x04");
    }
}
