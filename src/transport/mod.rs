//! # Printer Transport Layer
//!
//! The narrow seam between this crate and a platform Bluetooth stack.
//!
//! Discovery, pairing and GATT plumbing live outside the crate. A platform
//! backend implements [`LinkAdapter`] and the connection manager drives it:
//!
//! ```text
//! ConnectionManager ──connect/disconnect/write_chunk/is_healthy──► LinkAdapter
//!        ▲                                                            │
//!        └──────────────── LinkStateChange (broadcast) ───────────────┘
//! ```
//!
//! ## Available Adapters
//!
//! - [`simulated`]: In-memory link with scriptable failures, for tests and
//!   the `simulate` command

pub mod simulated;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

pub use simulated::SimulatedLink;

/// Identifier of a printer link (usually its Bluetooth MAC address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has the `XX:XX:XX:XX:XX:XX` MAC address form.
    pub fn is_mac_address(&self) -> bool {
        let parts: Vec<&str> = self.0.split(':').collect();
        parts.len() == 6
            && parts
                .iter()
                .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Link state as tracked by the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Link state reported by the platform stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateChange {
    pub device_id: DeviceId,
    pub state: LinkState,
}

/// Platform Bluetooth backend.
///
/// Implementations only move bytes and report health; retry, heartbeat and
/// reconnect policy belong to the
/// [`ConnectionManager`](crate::connection::ConnectionManager).
#[async_trait]
pub trait LinkAdapter: Send + Sync + 'static {
    /// Open the link. May take arbitrarily long; the caller races it
    /// against its own timeout.
    async fn connect(&self, device: &DeviceId) -> Result<()>;

    /// Close the link. Closing a closed link succeeds.
    async fn disconnect(&self, device: &DeviceId) -> Result<()>;

    /// Write one chunk, no larger than the negotiated MTU.
    async fn write_chunk(&self, device: &DeviceId, bytes: &[u8]) -> Result<()>;

    /// Cheap liveness probe used by the heartbeat.
    async fn is_healthy(&self, device: &DeviceId) -> bool;

    /// Unsolicited state notifications, for stacks that report link loss.
    fn subscribe_state(&self) -> Option<broadcast::Receiver<LinkStateChange>> {
        None
    }
}
