//! # Connection Resilience
//!
//! - [`manager`]: per-device state machine, heartbeat, reconnect, chunked writes
//! - [`registry`]: managers keyed by device id

pub mod manager;
pub mod registry;

pub use manager::{ConnectOptions, ConnectionConfig, ConnectionManager, TransmitControl, TransmitOptions};
pub use registry::ConnectionRegistry;
