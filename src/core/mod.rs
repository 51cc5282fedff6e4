//! Core of the Chaino client
//!
//! This module provides:
//! - Wire protocol: checksum, packet codec, frame acquisition, response parsing
//! - Retry engine shared by both transports
//! - Transport bindings (serial stream, I2C bus, scripted mocks)
//! - Link registry, sessions and the connection factory
//! - Typed device and Hana board APIs
//! - Port and bus discovery

pub mod board;
pub mod device;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
