//! Lookup of connection managers by device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::manager::{ConnectionConfig, ConnectionManager};
use crate::events::EventBus;
use crate::transport::{DeviceId, LinkAdapter};

/// One [`ConnectionManager`] per device, created on first use and sharing a
/// single adapter and event bus.
pub struct ConnectionRegistry {
    adapter: Arc<dyn LinkAdapter>,
    config: ConnectionConfig,
    events: EventBus,
    managers: Mutex<HashMap<DeviceId, Arc<ConnectionManager>>>,
}

impl ConnectionRegistry {
    pub fn new(adapter: Arc<dyn LinkAdapter>, config: ConnectionConfig, events: EventBus) -> Self {
        Self {
            adapter,
            config,
            events,
            managers: Mutex::new(HashMap::new()),
        }
    }

    fn managers(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceId, Arc<ConnectionManager>>> {
        self.managers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn get_or_create(&self, device_id: &DeviceId) -> Arc<ConnectionManager> {
        self.managers()
            .entry(device_id.clone())
            .or_insert_with(|| {
                ConnectionManager::new(
                    device_id.clone(),
                    self.adapter.clone(),
                    self.config.clone(),
                    self.events.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<Arc<ConnectionManager>> {
        self.managers().get(device_id).cloned()
    }

    /// Forget a device. The returned manager keeps working until dropped.
    pub fn remove(&self, device_id: &DeviceId) -> Option<Arc<ConnectionManager>> {
        self.managers().remove(device_id)
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.managers().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Disconnect every known device, logging failures.
    pub async fn disconnect_all(&self) {
        let managers: Vec<Arc<ConnectionManager>> = self.managers().values().cloned().collect();
        for manager in managers {
            if let Err(e) = manager.disconnect().await {
                warn!(device = %manager.device_id(), error = %e, "Disconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimulatedLink;

    #[tokio::test]
    async fn test_get_or_create_reuses_manager() {
        let registry = ConnectionRegistry::new(
            Arc::new(SimulatedLink::new()),
            ConnectionConfig::default(),
            EventBus::default(),
        );
        let id = DeviceId::from("p");

        let a = registry.get_or_create(&id);
        let b = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.devices(), vec![id.clone()]);

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_all() {
        let link = Arc::new(SimulatedLink::new());
        let registry = ConnectionRegistry::new(link.clone(), ConnectionConfig::default(), EventBus::default());
        for id in ["a", "b"] {
            registry.get_or_create(&DeviceId::from(id)).connect().await.unwrap();
        }

        registry.disconnect_all().await;
        assert!(!link.is_connected(&DeviceId::from("a")));
        assert!(!link.is_connected(&DeviceId::from("b")));
    }
}
