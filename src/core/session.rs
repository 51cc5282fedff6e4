//! Sessions and the connection factory
//!
//! A session binds a target address to a shared link and runs every call
//! through the retry engine. It holds the link for the whole call, so calls
//! over one link never interleave.
//!
//! [`ConnectionFactory`] opens serial ports on first use, verifies that a
//! Chaino device answers the handshake, and registers the link for every
//! later session on the same port.

use super::device::{FunctionId, HANDSHAKE_REPLY};
use super::engine::{ErrorCounters, ErrorStats, RetryEngine, DEFAULT_MAX_RETRIES};
use super::error::{CallError, CallErrorKind};
use super::protocol::{BusChannel, BusRetryPolicy, CallResult, StreamChannel, Value};
use super::registry::{share_bus, share_stream, LinkRegistry, SharedBus, SharedStream};
use super::transport::{BusLink, SerialConfig, SerialLink, StreamLink};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Address of the device attached directly to the serial port
pub const MASTER_ADDRESS: u8 = 0;

/// A target that executes remote calls
#[async_trait]
pub trait RemoteCall: Send + Sync {
    /// Target address
    fn address(&self) -> u8;

    /// Execute function `func_num` with `args`
    async fn call(&self, func_num: u16, args: &[Value]) -> Result<CallResult, CallError>;

    /// Lifetime error counters
    fn stats(&self) -> ErrorStats;
}

/// Tunables shared by every session a factory creates
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Attempts per call
    pub max_retries: u32,
    /// Bound on each stream read
    pub read_timeout: Duration,
    /// Bound on each stream write
    pub write_timeout: Duration,
    /// Pause before draining after a framing failure
    pub settle_delay: Duration,
    /// Bus behaviour after a header failure
    pub bus_policy: BusRetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_millis(100),
            bus_policy: BusRetryPolicy::default(),
        }
    }
}

/// Session over a stream link
pub struct StreamSession {
    port: String,
    link: SharedStream,
    address: u8,
    engine: RetryEngine,
    settle_delay: Duration,
    counters: Arc<ErrorCounters>,
}

impl StreamSession {
    /// Bind `address` on an already-shared link
    pub fn new(port: impl Into<String>, link: SharedStream, address: u8, options: &SessionOptions) -> Self {
        Self {
            port: port.into(),
            link,
            address,
            engine: RetryEngine::new(options.max_retries),
            settle_delay: options.settle_delay,
            counters: Arc::new(ErrorCounters::new()),
        }
    }

    /// Serial port this session talks through
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Another session on the same link with fresh counters
    pub fn retarget(&self, address: u8) -> Self {
        Self {
            port: self.port.clone(),
            link: Arc::clone(&self.link),
            address,
            engine: self.engine,
            settle_delay: self.settle_delay,
            counters: Arc::new(ErrorCounters::new()),
        }
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("port", &self.port)
            .field("address", &format_args!("0x{:02x}", self.address))
            .field("max_retries", &self.engine.max_retries())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteCall for StreamSession {
    fn address(&self) -> u8 {
        self.address
    }

    async fn call(&self, func_num: u16, args: &[Value]) -> Result<CallResult, CallError> {
        let mut link = self.link.lock().await;
        let mut channel = StreamChannel::new(&mut *link, self.address, self.settle_delay);
        self.engine
            .call(&mut channel, func_num, args, &self.counters)
            .await
    }

    fn stats(&self) -> ErrorStats {
        self.counters.snapshot()
    }
}

/// Session to one address on a shared bus
pub struct BusSession {
    link: SharedBus,
    address: u8,
    engine: RetryEngine,
    policy: BusRetryPolicy,
    counters: Arc<ErrorCounters>,
}

impl BusSession {
    /// Bind `address` on a shared bus
    pub fn new(link: SharedBus, address: u8, options: &SessionOptions) -> Self {
        Self {
            link,
            address,
            engine: RetryEngine::new(options.max_retries),
            policy: options.bus_policy,
            counters: Arc::new(ErrorCounters::new()),
        }
    }
}

impl fmt::Debug for BusSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSession")
            .field("address", &format_args!("0x{:02x}", self.address))
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteCall for BusSession {
    fn address(&self) -> u8 {
        self.address
    }

    async fn call(&self, func_num: u16, args: &[Value]) -> Result<CallResult, CallError> {
        let mut bus = self.link.lock().await;
        let mut channel = BusChannel::new(&mut *bus, self.address, self.policy);
        self.engine
            .call(&mut channel, func_num, args, &self.counters)
            .await
    }

    fn stats(&self) -> ErrorStats {
        self.counters.snapshot()
    }
}

/// Verify the target answers the handshake as a Chaino device
pub async fn handshake<S>(session: &S) -> Result<(), CallError>
where
    S: RemoteCall + ?Sized,
{
    let reply = session.call(FunctionId::Handshake.number(), &[]).await?;
    match reply.as_str() {
        Some(HANDSHAKE_REPLY) => Ok(()),
        other => Err(CallError::new(
            CallErrorKind::Handshake,
            session.address(),
            format!("unexpected handshake reply {other:?}"),
        )),
    }
}

/// Opens links on demand and hands out sessions over them.
///
/// Opening a port is serialized: concurrent requests for the same
/// unregistered port open and handshake it once.
pub struct ConnectionFactory {
    registry: Arc<LinkRegistry>,
    serial: SerialConfig,
    options: SessionOptions,
    connecting: Mutex<()>,
}

impl ConnectionFactory {
    /// Create a factory over `registry`
    pub fn new(registry: Arc<LinkRegistry>, serial: SerialConfig, options: SessionOptions) -> Self {
        Self {
            registry,
            serial,
            options,
            connecting: Mutex::new(()),
        }
    }

    /// Registry of open links
    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    /// Session options applied to new sessions
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Session to `address` through the serial port `port`.
    ///
    /// The port is opened and handshaken on first use; later sessions reuse
    /// the registered link.
    pub async fn stream_session(&self, port: &str, address: u8) -> Result<StreamSession, CallError> {
        let _connecting = self.connecting.lock().await;
        if let Some(session) = self.reuse_stream(port, address) {
            return Ok(session);
        }

        let link = SerialLink::open(port, &self.serial, self.options.read_timeout)
            .map_err(|e| CallError::transport(address, &e))?
            .with_write_timeout(self.options.write_timeout);
        self.register_stream(port, link, address).await
    }

    /// Register an already-open stream link after a successful handshake.
    ///
    /// When `port` already has a registered link, `link` is dropped unused and
    /// the session binds to the registered one.
    pub async fn attach_stream<L>(&self, port: &str, link: L, address: u8) -> Result<StreamSession, CallError>
    where
        L: StreamLink + 'static,
    {
        let _connecting = self.connecting.lock().await;
        if let Some(session) = self.reuse_stream(port, address) {
            return Ok(session);
        }
        self.register_stream(port, link, address).await
    }

    fn reuse_stream(&self, port: &str, address: u8) -> Option<StreamSession> {
        let link = self.registry.stream(port)?;
        debug!(port, "reusing open serial link");
        Some(StreamSession::new(port, link, address, &self.options))
    }

    async fn register_stream<L>(&self, port: &str, mut link: L, address: u8) -> Result<StreamSession, CallError>
    where
        L: StreamLink + 'static,
    {
        link.clear_buffers()
            .await
            .map_err(|e| CallError::transport(address, &e))?;
        let description = link.describe();
        let shared = share_stream(link);

        let master = StreamSession::new(port, Arc::clone(&shared), MASTER_ADDRESS, &self.options);
        handshake(&master).await?;
        info!(link = %description, "chaino device connected");

        let shared = self.registry.insert_stream(port, shared);
        Ok(StreamSession::new(port, shared, address, &self.options))
    }

    /// Register a bus under `name`
    pub fn attach_bus<L>(&self, name: &str, bus: L) -> SharedBus
    where
        L: BusLink + 'static,
    {
        info!(bus = %bus.describe(), "bus attached");
        self.registry.insert_bus(name, share_bus(bus))
    }

    /// Session to `address` on the bus registered as `name`
    pub fn bus_session(&self, name: &str, address: u8) -> Option<BusSession> {
        self.registry
            .bus(name)
            .map(|bus| BusSession::new(bus, address, &self.options))
    }

    /// Forget the link on `port`
    pub fn close(&self, port: &str) -> bool {
        self.registry.remove_stream(port)
    }
}
