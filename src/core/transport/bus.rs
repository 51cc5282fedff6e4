//! I2C bus link over `embedded-hal`

use super::{BusLink, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use embedded_hal::i2c::I2c;

/// Bus link over any blocking `embedded-hal` I2C controller.
///
/// Each transaction runs to completion on the calling task and blocks its
/// runtime worker for the duration of the transfer, with the shared bus lock
/// held. A controller stuck on clock stretching stalls that worker too, so
/// bus sessions belong on a multi-threaded runtime.
pub struct HalBus<I> {
    i2c: I,
    name: String,
}

impl<I> HalBus<I>
where
    I: I2c + Send,
{
    /// Wrap an I2C controller
    pub fn new(i2c: I, name: impl Into<String>) -> Self {
        Self {
            i2c,
            name: name.into(),
        }
    }

    /// Release the controller
    pub fn into_inner(self) -> I {
        self.i2c
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(address: u8, err: &E) -> TransportError {
    TransportError::Bus {
        address,
        reason: format!("{:?}", err.kind()),
    }
}

#[async_trait]
impl<I> BusLink for HalBus<I>
where
    I: I2c + Send,
{
    async fn write(&mut self, address: u8, data: &[u8]) -> Result<(), TransportError> {
        self.i2c
            .write(address, data)
            .map_err(|e| bus_error(address, &e))
    }

    async fn read(&mut self, address: u8, len: usize) -> Result<Bytes, TransportError> {
        let mut buf = vec![0u8; len];
        self.i2c
            .read(address, &mut buf)
            .map_err(|e| bus_error(address, &e))?;
        Ok(Bytes::from(buf))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
