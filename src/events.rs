//! # Events
//!
//! Everything observable about jobs and links is published as an [`Event`]
//! on an [`EventBus`]. Subscribers get their own receiver; a slow subscriber
//! lags and loses old events instead of blocking the publisher.
//!
//! Every event has a stable dotted name, which is also its serialized
//! `type` tag:
//!
//! ```
//! use thermalink::events::{Event, LinkEvent};
//! use thermalink::transport::DeviceId;
//!
//! let event = Event::Link(LinkEvent::ReconnectFailed {
//!     device_id: DeviceId::from("printer-1"),
//!     attempts: 3,
//! });
//! assert_eq!(event.name(), "link.reconnect-failed");
//! assert_eq!(
//!     serde_json::to_string(&event).unwrap(),
//!     r#"{"type":"link.reconnect-failed","device_id":"printer-1","attempts":3}"#
//! );
//! ```

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::ErrorKind;
use crate::job::{JobId, Priority};
use crate::transport::DeviceId;

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Why a job was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller asked for it
    Requested,
    /// Evicted to admit a higher priority job into a full queue
    QueueFull,
    /// The scheduler shut down
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    #[serde(rename = "job.queued")]
    Queued {
        job_id: JobId,
        device_id: DeviceId,
        priority: Priority,
    },
    #[serde(rename = "job.started")]
    Started { job_id: JobId, attempt: u32 },
    #[serde(rename = "job.progress")]
    Progress {
        job_id: JobId,
        percentage: u8,
        message: String,
    },
    #[serde(rename = "job.paused")]
    Paused { job_id: JobId },
    #[serde(rename = "job.resumed")]
    Resumed { job_id: JobId },
    #[serde(rename = "job.completed")]
    Completed { job_id: JobId, duration_ms: u64 },
    #[serde(rename = "job.failed")]
    Failed {
        job_id: JobId,
        kind: ErrorKind,
        error: String,
        retry_count: u32,
    },
    #[serde(rename = "job.retrying")]
    Retrying {
        job_id: JobId,
        retry_count: u32,
        delay_ms: u64,
        error: String,
    },
    #[serde(rename = "job.cancelled")]
    Cancelled { job_id: JobId, reason: CancelReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum LinkEvent {
    #[serde(rename = "link.connecting")]
    Connecting { device_id: DeviceId },
    #[serde(rename = "link.connected")]
    Connected { device_id: DeviceId },
    /// `unexpected` is false for caller-requested disconnects
    #[serde(rename = "link.disconnected")]
    Disconnected { device_id: DeviceId, unexpected: bool },
    #[serde(rename = "link.reconnecting")]
    Reconnecting {
        device_id: DeviceId,
        attempt: u32,
        max_attempts: u32,
    },
    #[serde(rename = "link.reconnected")]
    Reconnected { device_id: DeviceId, attempt: u32 },
    #[serde(rename = "link.reconnect-failed")]
    ReconnectFailed { device_id: DeviceId, attempts: u32 },
    #[serde(rename = "link.heartbeat-lost")]
    HeartbeatLost { device_id: DeviceId },
}

/// Any published event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    Job(JobEvent),
    Link(LinkEvent),
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Paused { job_id }
            | Self::Resumed { job_id }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Cancelled { job_id, .. } => *job_id,
        }
    }
}

impl LinkEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::Connecting { device_id }
            | Self::Connected { device_id }
            | Self::Disconnected { device_id, .. }
            | Self::Reconnecting { device_id, .. }
            | Self::Reconnected { device_id, .. }
            | Self::ReconnectFailed { device_id, .. }
            | Self::HeartbeatLost { device_id } => device_id,
        }
    }
}

impl Event {
    /// Stable dotted name, e.g. `job.queued` or `link.heartbeat-lost`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Job(event) => match event {
                JobEvent::Queued { .. } => "job.queued",
                JobEvent::Started { .. } => "job.started",
                JobEvent::Progress { .. } => "job.progress",
                JobEvent::Paused { .. } => "job.paused",
                JobEvent::Resumed { .. } => "job.resumed",
                JobEvent::Completed { .. } => "job.completed",
                JobEvent::Failed { .. } => "job.failed",
                JobEvent::Retrying { .. } => "job.retrying",
                JobEvent::Cancelled { .. } => "job.cancelled",
            },
            Self::Link(event) => match event {
                LinkEvent::Connecting { .. } => "link.connecting",
                LinkEvent::Connected { .. } => "link.connected",
                LinkEvent::Disconnected { .. } => "link.disconnected",
                LinkEvent::Reconnecting { .. } => "link.reconnecting",
                LinkEvent::Reconnected { .. } => "link.reconnected",
                LinkEvent::ReconnectFailed { .. } => "link.reconnect-failed",
                LinkEvent::HeartbeatLost { .. } => "link.heartbeat-lost",
            },
        }
    }
}

impl From<JobEvent> for Event {
    fn from(event: JobEvent) -> Self {
        Self::Job(event)
    }
}

impl From<LinkEvent> for Event {
    fn from(event: LinkEvent) -> Self {
        Self::Link(event)
    }
}

/// Broadcast publisher shared by the scheduler and connection managers.
///
/// Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: impl Into<Event>) {
        let event = event.into();
        trace!(event = event.name(), "emit");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let device_id = DeviceId::from("p");

        bus.emit(LinkEvent::Connecting {
            device_id: device_id.clone(),
        });
        bus.emit(LinkEvent::Connected { device_id });

        assert_eq!(rx.recv().await.unwrap().name(), "link.connecting");
        assert_eq!(rx.recv().await.unwrap().name(), "link.connected");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit(JobEvent::Paused { job_id: JobId::new() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_job_event_serialization() {
        let job_id = JobId::new();
        let event = Event::Job(JobEvent::Cancelled {
            job_id,
            reason: CancelReason::QueueFull,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job.cancelled");
        assert_eq!(json["reason"], "queue_full");
        assert_eq!(json["job_id"], job_id.to_string());
    }
}
