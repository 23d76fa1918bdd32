//! Link loss detection and reconnect sequencing.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use thermalink::connection::ConnectionConfig;
use thermalink::transport::{LinkState, SimulatedLink};
use thermalink::{ConnectionManager, DeviceId, Event, EventBus, LinkEvent};

fn setup(config: ConnectionConfig) -> (Arc<ConnectionManager>, Arc<SimulatedLink>, broadcast::Receiver<Event>) {
    let link = Arc::new(SimulatedLink::new());
    let bus = EventBus::new(1024);
    let rx = bus.subscribe();
    let manager = ConnectionManager::new(DeviceId::from("printer-1"), link.clone(), config, bus);
    (manager, link, rx)
}

fn link_events(rx: &mut broadcast::Receiver<Event>) -> Vec<LinkEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::Link(event) = event {
            out.push(event);
        }
    }
    out
}

fn names(events: &[LinkEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| Event::Link(e.clone()).name())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_loss_triggers_reconnect() {
    let (manager, link, mut rx) = setup(ConnectionConfig::default());
    manager.connect().await.unwrap();
    link_events(&mut rx);

    link.set_healthy(false);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    link.set_healthy(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = link_events(&mut rx);
    assert_eq!(
        names(&events),
        vec![
            "link.heartbeat-lost",
            "link.disconnected",
            "link.reconnecting",
            "link.connecting",
            "link.connected",
            "link.reconnected",
        ]
    );
    assert!(matches!(events[1], LinkEvent::Disconnected { unexpected: true, .. }));
    assert!(matches!(events[2], LinkEvent::Reconnecting { attempt: 1, max_attempts: 3, .. }));
    assert_eq!(manager.state(), LinkState::Connected);
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_fires_once() {
    let (manager, link, mut rx) = setup(ConnectionConfig::default());
    manager.connect().await.unwrap();
    link_events(&mut rx);

    link.refuse_connections(true);
    link.drop_link(manager.device_id());
    tokio::time::sleep(Duration::from_secs(30)).await;

    let events = link_events(&mut rx);
    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::Reconnecting { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let failures: Vec<&LinkEvent> = events
        .iter()
        .filter(|e| matches!(e, LinkEvent::ReconnectFailed { .. }))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], LinkEvent::ReconnectFailed { attempts: 3, .. }));

    assert_eq!(manager.state(), LinkState::Disconnected);
    assert!(!manager.is_tracked());
    assert!(!manager.is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_attempts_are_spaced() {
    let (manager, link, mut rx) = setup(ConnectionConfig::default());
    manager.connect().await.unwrap();
    link_events(&mut rx);

    link.refuse_connections(true);
    link.drop_link(manager.device_id());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.reconnect_attempts(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(manager.reconnect_attempts(), 2);

    // Reconnects once the printer is back
    link.refuse_connections(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(manager.state(), LinkState::Connected);

    let reconnected: Vec<u32> = link_events(&mut rx)
        .iter()
        .filter_map(|e| match e {
            LinkEvent::Reconnected { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(reconnected, vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_after_explicit_disconnect() {
    let (manager, link, mut rx) = setup(ConnectionConfig::default());
    manager.connect().await.unwrap();
    manager.disconnect().await.unwrap();
    manager.disconnect().await.unwrap();
    link_events(&mut rx);

    link.drop_link(manager.device_id());
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(link_events(&mut rx), Vec::new());
    assert_eq!(link.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_disabled() {
    let config = ConnectionConfig {
        auto_reconnect: false,
        ..ConnectionConfig::default()
    };
    let (manager, link, mut rx) = setup(config);
    manager.connect().await.unwrap();
    link_events(&mut rx);

    link.drop_link(manager.device_id());
    tokio::time::sleep(Duration::from_secs(10)).await;

    let events = link_events(&mut rx);
    assert_eq!(names(&events), vec!["link.disconnected"]);
    assert_eq!(manager.state(), LinkState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_cancels_reconnect() {
    let (manager, link, _rx) = setup(ConnectionConfig::default());
    manager.connect().await.unwrap();

    link.refuse_connections(true);
    link.drop_link(manager.device_id());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.is_reconnecting());

    link.refuse_connections(false);
    manager.connect().await.unwrap();
    assert!(!manager.is_reconnecting());
    assert_eq!(manager.state(), LinkState::Connected);
}
