//! End-to-end scheduler behavior against a simulated printer.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use thermalink::connection::ConnectionConfig;
use thermalink::events::CancelReason;
use thermalink::protocol::barcode::BarcodeFormat;
use thermalink::protocol::render;
use thermalink::protocol::text::TextStyle;
use thermalink::transport::{LinkState, SimulatedLink};
use thermalink::{
    ConnectionRegistry, DeviceId, Event, EventBus, JobEvent, JobId, JobRequest, JobStatus, Payload, PrinterConfig,
    Priority, Scheduler, SchedulerConfig, ThermalinkError,
};

struct Harness {
    scheduler: Scheduler,
    link: Arc<SimulatedLink>,
    events: broadcast::Receiver<Event>,
}

fn harness(config: SchedulerConfig) -> Harness {
    let link = Arc::new(SimulatedLink::new());
    let bus = EventBus::new(1024);
    let events = bus.subscribe();
    let registry = Arc::new(ConnectionRegistry::new(link.clone(), ConnectionConfig::default(), bus));
    Harness {
        scheduler: Scheduler::new(config, PrinterConfig::default(), registry),
        link,
        events,
    }
}

fn text(content: &str) -> JobRequest {
    JobRequest::new(
        "printer-1",
        Payload::Text {
            content: content.into(),
            style: TextStyle::default(),
        },
    )
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<JobEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::Job(event) = event {
            out.push(event);
        }
    }
    out
}

fn started(events: &[JobEvent]) -> Vec<(JobId, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Started { job_id, attempt } => Some((*job_id, *attempt)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_priority_then_fifo_order() {
    let mut h = harness(SchedulerConfig::default());
    let a = h.scheduler.enqueue(text("A")).unwrap();
    let b = h.scheduler.enqueue(text("B").priority(Priority::High)).unwrap();
    let c = h.scheduler.enqueue(text("C").priority(Priority::Low)).unwrap();

    h.scheduler.start();
    h.scheduler.wait_until_idle().await;

    let order: Vec<JobId> = started(&drain(&mut h.events)).into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec![b, a, c]);
    for id in [a, b, c] {
        assert_eq!(h.scheduler.job(&id).unwrap().status, JobStatus::Completed);
    }
    assert_eq!(h.link.connect_count(), 1);
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let mut h = harness(SchedulerConfig::default());
    h.link.fail_next_writes(100);
    let id = h.scheduler.enqueue(text("hello").max_retries(2)).unwrap();

    h.scheduler.start();
    h.scheduler.wait_until_idle().await;

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 2);
    assert!(job.last_error.is_some());

    let events = drain(&mut h.events);
    let attempts: Vec<u32> = started(&events).into_iter().map(|(_, n)| n).collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let delays: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Retrying { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(delays, vec![1_000, 2_000]);

    let failed = events.iter().filter(|e| matches!(e, JobEvent::Failed { .. })).count();
    assert_eq!(failed, 1);

    let stats = h.scheduler.stats();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.failed, 1);
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_transient_failure() {
    let h = harness(SchedulerConfig::default());
    h.link.fail_next_writes(1);
    let id = h.scheduler.enqueue(text("hello")).unwrap();

    h.scheduler.start();
    h.scheduler.wait_until_idle().await;

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 1);
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_encoding_error_fails_without_retry() {
    let mut h = harness(SchedulerConfig::default());
    let request = JobRequest::new(
        "printer-1",
        Payload::Barcode {
            content: "12AB".into(),
            format: BarcodeFormat::Ean13,
            height: 60,
        },
    );
    let id = h.scheduler.enqueue(request).unwrap();

    h.scheduler.start();
    h.scheduler.wait_until_idle().await;

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert_eq!(h.link.connect_count(), 0);

    let failure = drain(&mut h.events)
        .into_iter()
        .find(|e| matches!(e, JobEvent::Failed { .. }))
        .unwrap();
    let json = serde_json::to_value(&failure).unwrap();
    assert_eq!(json["kind"], "encoding");
    assert_eq!(json["retry_count"], 0);
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_capacity_and_eviction() {
    let mut h = harness(SchedulerConfig {
        capacity: 2,
        ..SchedulerConfig::default()
    });
    let low = h.scheduler.enqueue(text("low").priority(Priority::Low)).unwrap();
    h.scheduler.enqueue(text("normal")).unwrap();

    let err = h.scheduler.enqueue(text("another normal")).unwrap_err();
    assert!(matches!(err, ThermalinkError::QueueFull(2)));

    let high = h.scheduler.enqueue(text("urgent").priority(Priority::High)).unwrap();
    assert_eq!(h.scheduler.job(&low).unwrap().status, JobStatus::Cancelled);
    assert_eq!(h.scheduler.len(), 2);

    let events = drain(&mut h.events);
    assert!(events.contains(&JobEvent::Cancelled {
        job_id: low,
        reason: CancelReason::QueueFull,
    }));
    assert!(matches!(events.last(), Some(JobEvent::Queued { job_id, .. }) if *job_id == high));

    let stats = h.scheduler.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.waiting, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_stops_and_resets() {
    let mut h = harness(SchedulerConfig::default());
    h.link.set_write_delay(Duration::from_secs(1));
    let id = h.scheduler.enqueue(text(&"x".repeat(3_000))).unwrap();

    h.scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.scheduler.job(&id).unwrap().status, JobStatus::Processing);

    h.scheduler.cancel(&id).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.scheduler.wait_until_idle().await;

    assert_eq!(h.scheduler.job(&id).unwrap().status, JobStatus::Cancelled);
    let written = h.link.written(&DeviceId::from("printer-1"));
    assert!(written.len() < 3_000);
    assert!(written.ends_with(&[0x1B, b'@']));

    let events = drain(&mut h.events);
    assert!(!events.iter().any(|e| matches!(e, JobEvent::Completed { .. })));
    assert!(events.contains(&JobEvent::Cancelled {
        job_id: id,
        reason: CancelReason::Requested,
    }));
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_holds_chunks_and_extends_deadline() {
    let mut h = harness(SchedulerConfig::default());
    h.link.set_write_delay(Duration::from_secs(1));
    let id = h.scheduler.enqueue(text(&"x".repeat(3_000))).unwrap();

    h.scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    h.scheduler.pause(&id).unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    let held = h.link.write_count();
    // Longer than the job timeout
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(h.link.write_count(), held);
    assert_eq!(h.scheduler.job(&id).unwrap().status, JobStatus::Paused);

    h.scheduler.resume(&id).unwrap();
    h.scheduler.wait_until_idle().await;

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 0);

    let events = drain(&mut h.events);
    assert!(events.contains(&JobEvent::Paused { job_id: id }));
    assert!(events.contains(&JobEvent::Resumed { job_id: id }));
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_progress_reaches_full() {
    let mut h = harness(SchedulerConfig::default());
    let id = h.scheduler.enqueue(text(&"x".repeat(1_200))).unwrap();

    h.scheduler.start();
    h.scheduler.wait_until_idle().await;

    let percentages: Vec<u8> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::Progress { job_id, percentage, .. } if job_id == id => Some(percentage),
            _ => None,
        })
        .collect();
    assert!(percentages.len() >= 3);
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percentages.last(), Some(&100));
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_jobs_on_different_devices_run_concurrently() {
    let h = harness(SchedulerConfig {
        concurrency: 3,
        ..SchedulerConfig::default()
    });
    h.link.set_write_delay(Duration::from_secs(1));
    let a = h.scheduler.enqueue(text("a")).unwrap();
    let b = h
        .scheduler
        .enqueue(JobRequest::new(
            "printer-2",
            Payload::Text {
                content: "b".into(),
                style: TextStyle::default(),
            },
        ))
        .unwrap();
    let c = h.scheduler.enqueue(text("c")).unwrap();

    assert_eq!(h.scheduler.dispatch_next(), Some(a));
    // printer-1 is busy, so c waits behind it
    assert_eq!(h.scheduler.dispatch_next(), Some(b));
    assert_eq!(h.scheduler.dispatch_next(), None);

    h.scheduler.start();
    h.scheduler.wait_until_idle().await;
    assert_eq!(h.scheduler.job(&c).unwrap().status, JobStatus::Completed);
    h.scheduler.shutdown().await;
}

fn failure(events: &[JobEvent]) -> serde_json::Value {
    let failed = events
        .iter()
        .find(|e| matches!(e, JobEvent::Failed { .. }))
        .unwrap();
    serde_json::to_value(failed).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_link_drop_mid_job_resends_whole_job() {
    let h = harness(SchedulerConfig::default());
    h.link.set_write_delay(Duration::from_millis(500));
    let request = text(&"x".repeat(3_000));
    let expected = render(&request.payload, &PrinterConfig::default()).unwrap();
    let id = h.scheduler.enqueue(request).unwrap();

    h.scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    h.link.drop_link(&DeviceId::from("printer-1"));
    h.scheduler.wait_until_idle().await;

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 1);

    // The second attempt starts over from the printer reset
    let expected = expected.as_bytes();
    assert!(expected.starts_with(&[0x1B, b'@']));
    let written = h.link.written(&DeviceId::from("printer-1"));
    assert!(written.len() > expected.len());
    assert!(written.ends_with(expected));
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_job_timeout_during_write() {
    let mut h = harness(SchedulerConfig::default());
    h.link.set_write_delay(Duration::from_millis(900));
    let id = h
        .scheduler
        .enqueue(text(&"x".repeat(3_000)).timeout(Duration::from_secs(3)).max_retries(1))
        .unwrap();

    h.scheduler.start();
    h.scheduler.wait_until_idle().await;

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 1);
    assert!(job.last_error.unwrap().contains("timed out"));

    let json = failure(&drain(&mut h.events));
    assert_eq!(json["kind"], "job_timeout");
    assert_eq!(json["retry_count"], 1);
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_job_timeout_covers_connect() {
    let mut h = harness(SchedulerConfig::default());
    h.link.set_connect_delay(Duration::from_secs(600));
    let id = h
        .scheduler
        .enqueue(text("hello").timeout(Duration::from_secs(2)).max_retries(0))
        .unwrap();

    h.scheduler.start();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(h.link.write_count(), 0);
    assert_eq!(failure(&drain(&mut h.events))["kind"], "job_timeout");

    let manager = h.scheduler.registry().get(&DeviceId::from("printer-1")).unwrap();
    assert_eq!(manager.state(), LinkState::Disconnected);
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_after_last_chunk_still_completes() {
    let mut h = harness(SchedulerConfig::default());
    h.link.set_write_delay(Duration::from_secs(1));
    let id = h.scheduler.enqueue(text("short")).unwrap();

    h.scheduler.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    // The only chunk is already in flight
    h.scheduler.pause(&id).unwrap();
    h.scheduler.wait_until_idle().await;

    assert_eq!(h.scheduler.job(&id).unwrap().status, JobStatus::Completed);
    let tail: Vec<JobEvent> = drain(&mut h.events)
        .into_iter()
        .filter(|e| !matches!(e, JobEvent::Progress { .. }))
        .skip_while(|e| !matches!(e, JobEvent::Paused { .. }))
        .collect();
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[0], JobEvent::Paused { job_id: id });
    assert_eq!(tail[1], JobEvent::Resumed { job_id: id });
    assert!(matches!(tail[2], JobEvent::Completed { job_id, .. } if job_id == id));
    h.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_requeues_retrying_jobs() {
    let h = harness(SchedulerConfig::default());
    h.link.fail_next_writes(100);
    let id = h.scheduler.enqueue(text("hello")).unwrap();

    h.scheduler.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.scheduler.job(&id).unwrap().status, JobStatus::Retrying);

    h.scheduler.shutdown().await;
    let waited = tokio::time::timeout(Duration::from_secs(1), h.scheduler.wait_until_idle()).await;
    assert!(waited.is_ok());

    let job = h.scheduler.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
}
