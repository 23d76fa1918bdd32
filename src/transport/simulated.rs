//! # Simulated Link
//!
//! An in-memory [`LinkAdapter`] that records every chunk written and lets
//! the caller script failures: refused connections, failing writes, slow
//! operations, an unhealthy heartbeat, or a link dropped by the "radio".
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use thermalink::transport::{DeviceId, LinkAdapter, SimulatedLink};
//!
//! let link = SimulatedLink::new();
//! let printer = DeviceId::from("printer-1");
//!
//! link.connect(&printer).await.unwrap();
//! link.write_chunk(&printer, b"hello").await.unwrap();
//! assert_eq!(link.written(&printer), b"hello".to_vec());
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{DeviceId, LinkAdapter, LinkState, LinkStateChange};
use crate::error::{Result, ThermalinkError};

#[derive(Debug, Default)]
struct SimState {
    connected: HashSet<DeviceId>,
    unhealthy: bool,
    refuse_connections: bool,
    connect_failures: usize,
    write_failures: usize,
    connect_delay: Duration,
    write_delay: Duration,
    connect_calls: usize,
    writes: Vec<(DeviceId, Vec<u8>)>,
}

/// Scriptable in-memory printer link
#[derive(Debug)]
pub struct SimulatedLink {
    state: Mutex<SimState>,
    changes: broadcast::Sender<LinkStateChange>,
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLink {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(SimState::default()),
            changes,
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.with(|s| s.connect_failures = n);
    }

    /// Refuse every connect attempt until turned off.
    pub fn refuse_connections(&self, refuse: bool) {
        self.with(|s| s.refuse_connections = refuse);
    }

    /// Make the next `n` chunk writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.with(|s| s.write_failures = n);
    }

    /// Control what the heartbeat probe reports.
    pub fn set_healthy(&self, healthy: bool) {
        self.with(|s| s.unhealthy = !healthy);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.with(|s| s.connect_delay = delay);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.with(|s| s.write_delay = delay);
    }

    /// Drop the link as if the printer walked out of range, notifying
    /// subscribers.
    pub fn drop_link(&self, device: &DeviceId) {
        self.with(|s| s.connected.remove(device));
        let _ = self.changes.send(LinkStateChange {
            device_id: device.clone(),
            state: LinkState::Disconnected,
        });
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.with(|s| s.connected.contains(device))
    }

    /// Number of connect attempts seen so far
    pub fn connect_count(&self) -> usize {
        self.with(|s| s.connect_calls)
    }

    /// Number of successful chunk writes, across all devices
    pub fn write_count(&self) -> usize {
        self.with(|s| s.writes.len())
    }

    /// Sizes of the chunks written to `device`, in order
    pub fn chunk_sizes(&self, device: &DeviceId) -> Vec<usize> {
        self.with(|s| {
            s.writes
                .iter()
                .filter(|(id, _)| id == device)
                .map(|(_, bytes)| bytes.len())
                .collect()
        })
    }

    /// Everything written to `device`, concatenated
    pub fn written(&self, device: &DeviceId) -> Vec<u8> {
        self.with(|s| {
            s.writes
                .iter()
                .filter(|(id, _)| id == device)
                .flat_map(|(_, bytes)| bytes.iter().copied())
                .collect()
        })
    }

    pub fn clear_writes(&self) {
        self.with(|s| s.writes.clear());
    }
}

#[async_trait]
impl LinkAdapter for SimulatedLink {
    async fn connect(&self, device: &DeviceId) -> Result<()> {
        let delay = self.with(|s| {
            s.connect_calls += 1;
            s.connect_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.with(|s| {
            if s.refuse_connections {
                return Err(ThermalinkError::ConnectionFailed(format!("{} refused connection", device)));
            }
            if s.connect_failures > 0 {
                s.connect_failures -= 1;
                return Err(ThermalinkError::ConnectionFailed(format!("{} not responding", device)));
            }
            s.connected.insert(device.clone());
            Ok(())
        })
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<()> {
        self.with(|s| s.connected.remove(device));
        Ok(())
    }

    async fn write_chunk(&self, device: &DeviceId, bytes: &[u8]) -> Result<()> {
        let delay = self.with(|s| s.write_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.with(|s| {
            if !s.connected.contains(device) {
                return Err(ThermalinkError::DeviceDisconnected(device.to_string()));
            }
            if s.write_failures > 0 {
                s.write_failures -= 1;
                return Err(ThermalinkError::WriteFailed(format!("{} rejected {} bytes", device, bytes.len())));
            }
            s.writes.push((device.clone(), bytes.to_vec()));
            Ok(())
        })
    }

    async fn is_healthy(&self, device: &DeviceId) -> bool {
        self.with(|s| !s.unhealthy && s.connected.contains(device))
    }

    fn subscribe_state(&self) -> Option<broadcast::Receiver<LinkStateChange>> {
        Some(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let link = SimulatedLink::new();
        let id = DeviceId::from("p");
        link.fail_next_connects(2);

        assert!(link.connect(&id).await.is_err());
        assert!(link.connect(&id).await.is_err());
        assert!(link.connect(&id).await.is_ok());
        assert_eq!(link.connect_count(), 3);
        assert!(link.is_connected(&id));
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let link = SimulatedLink::new();
        let id = DeviceId::from("p");
        let err = link.write_chunk(&id, b"x").await.unwrap_err();
        assert!(matches!(err, ThermalinkError::DeviceDisconnected(_)));

        link.connect(&id).await.unwrap();
        link.fail_next_writes(1);
        assert!(link.write_chunk(&id, b"x").await.is_err());
        link.write_chunk(&id, b"yz").await.unwrap();
        assert_eq!(link.chunk_sizes(&id), vec![2]);
    }

    #[tokio::test]
    async fn test_drop_link_notifies() {
        let link = SimulatedLink::new();
        let id = DeviceId::from("p");
        let mut rx = link.subscribe_state().unwrap();
        link.connect(&id).await.unwrap();

        link.drop_link(&id);
        assert!(!link.is_healthy(&id).await);
        assert_eq!(
            rx.recv().await.unwrap(),
            LinkStateChange {
                device_id: id,
                state: LinkState::Disconnected
            }
        );
    }
}
