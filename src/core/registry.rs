//! Open link registry
//!
//! Every serial port (and every bus) is opened once. Sessions that address
//! different targets through the same port share the handle kept here.

use super::transport::{BusLink, SharedLink, StreamLink};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared stream link handle
pub type SharedStream = SharedLink<dyn StreamLink>;

/// Shared bus link handle
pub type SharedBus = SharedLink<dyn BusLink>;

/// Wrap a stream link for sharing
pub fn share_stream<L: StreamLink + 'static>(link: L) -> SharedStream {
    Arc::new(tokio::sync::Mutex::new(link))
}

/// Wrap a bus link for sharing
pub fn share_bus<L: BusLink + 'static>(link: L) -> SharedBus {
    Arc::new(tokio::sync::Mutex::new(link))
}

/// Links currently open, keyed by port or bus name
#[derive(Default)]
pub struct LinkRegistry {
    streams: RwLock<HashMap<String, SharedStream>>,
    buses: RwLock<HashMap<String, SharedBus>>,
}

impl LinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream link open on `port`
    pub fn stream(&self, port: &str) -> Option<SharedStream> {
        self.streams.read().get(port).cloned()
    }

    /// Register a stream link, returning the handle now in the registry.
    ///
    /// If the port was registered concurrently, the existing handle wins.
    pub fn insert_stream(&self, port: &str, link: SharedStream) -> SharedStream {
        let mut streams = self.streams.write();
        streams
            .entry(port.to_string())
            .or_insert_with(|| {
                debug!(port, "stream link registered");
                link
            })
            .clone()
    }

    /// Forget a stream link; open sessions keep their handle
    pub fn remove_stream(&self, port: &str) -> bool {
        self.streams.write().remove(port).is_some()
    }

    /// Bus link registered as `name`
    pub fn bus(&self, name: &str) -> Option<SharedBus> {
        self.buses.read().get(name).cloned()
    }

    /// Register a bus link, returning the handle now in the registry
    pub fn insert_bus(&self, name: &str, link: SharedBus) -> SharedBus {
        let mut buses = self.buses.write();
        buses
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(bus = name, "bus link registered");
                link
            })
            .clone()
    }

    /// Forget a bus link
    pub fn remove_bus(&self, name: &str) -> bool {
        self.buses.write().remove(name).is_some()
    }

    /// Registered serial ports, sorted
    pub fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.streams.read().keys().cloned().collect();
        ports.sort();
        ports
    }

    /// Number of registered links
    pub fn len(&self) -> usize {
        self.streams.read().len() + self.buses.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
