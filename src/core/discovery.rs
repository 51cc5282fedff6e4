//! Device discovery
//!
//! No discovery protocol: iterate the known ports (or bus addresses) and try
//! a handshake on each.

use super::device::{Device, MAX_BUS_ADDRESS, MIN_BUS_ADDRESS};
use super::error::CallError;
use super::session::{ConnectionFactory, RemoteCall, MASTER_ADDRESS};
use super::transport::{list_ports, TransportError};
use serde::Serialize;
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Identity of a responding device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Name reported by `who()`
    pub name: String,
    /// Bus address configured in the device
    pub address: u8,
}

/// Outcome of probing one serial port
#[derive(Debug, Clone, Serialize)]
pub struct PortReport {
    /// Port name
    pub port: String,
    /// Chaino master found on the port, if any
    pub device: Option<DeviceInfo>,
    /// Why the port is not a Chaino device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full assignable bus address range
pub fn bus_addresses() -> RangeInclusive<u8> {
    MIN_BUS_ADDRESS..=MAX_BUS_ADDRESS
}

/// Ask a device for its name and configured address
pub async fn identify<S: RemoteCall>(device: &Device<S>) -> Result<DeviceInfo, CallError> {
    Ok(DeviceInfo {
        name: device.who().await?,
        address: device.address().await?,
    })
}

/// Probe one serial port for a Chaino master
pub async fn probe_port(factory: &ConnectionFactory, port: &str) -> PortReport {
    let outcome = match factory.stream_session(port, MASTER_ADDRESS).await {
        Ok(session) => identify(&Device::new(session)).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(info) => {
            info!(port, name = %info.name, "chaino master found");
            PortReport {
                port: port.to_string(),
                device: Some(info),
                error: None,
            }
        }
        Err(err) => {
            debug!(port, %err, "not a chaino device");
            PortReport {
                port: port.to_string(),
                device: None,
                error: Some(err.to_string()),
            }
        }
    }
}

/// Probe every serial port on the system. Only master devices are found.
pub async fn scan_serial(factory: &ConnectionFactory) -> Result<Vec<PortReport>, TransportError> {
    let mut reports = Vec::new();
    for port in list_ports()? {
        reports.push(probe_port(factory, &port.port_name).await);
    }
    Ok(reports)
}

/// Try `who()` on each acknowledging address of the bus registered as `bus`
pub async fn scan_bus<I>(factory: &ConnectionFactory, bus: &str, addresses: I) -> Vec<DeviceInfo>
where
    I: IntoIterator<Item = u8>,
{
    let Some(link) = factory.registry().bus(bus) else {
        debug!(bus, "no such bus");
        return Vec::new();
    };

    let mut found = Vec::new();
    for address in addresses {
        if !link.lock().await.probe(address).await {
            continue;
        }
        let Some(session) = factory.bus_session(bus, address) else {
            break;
        };
        match Device::new(session).who().await {
            Ok(name) => {
                info!(address = %format_args!("0x{address:02x}"), %name, "bus device found");
                found.push(DeviceInfo { name, address });
            }
            Err(err) => debug!(%err, "device acknowledged but did not answer"),
        }
    }
    found
}
