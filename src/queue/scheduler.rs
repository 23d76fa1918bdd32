//! # Print Job Scheduler
//!
//! Pulls jobs from the [`JobQueue`], renders them, and streams them through
//! the [`ConnectionManager`] of their device.
//!
//! ## Pipeline
//!
//! ```text
//! enqueue ──► JobQueue ──► dispatch_next ──► render ──► connect? ──► write chunks
//!                ▲                                                      │
//!                └──── Retrying ──(retry_delay × retry_count)─── retryable error
//! ```
//!
//! ## Driving
//!
//! [`Scheduler::start`] spawns a driver loop that calls `dispatch_next`
//! whenever a job arrives or finishes, and on a fixed tick as a fallback.
//! Without `start`, callers can drive dispatch themselves.
//!
//! ## Failure Handling
//!
//! | Error | Outcome |
//! |-------|---------|
//! | Link or timeout error, budget left | `retry_count += 1`, Retrying, back to Pending after the delay |
//! | Link or timeout error, budget spent | Failed |
//! | Encoding error | Failed at once, budget untouched |
//!
//! Scheduler state sits behind a synchronous mutex that is never held
//! across an `.await`; events are emitted while it is held so subscribers
//! see them in transition order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::stats::{QueueStats, StatsRecorder};
use super::store::JobQueue;
use crate::connection::{ConnectionManager, ConnectionRegistry, TransmitControl, TransmitOptions};
use crate::error::{Result, ThermalinkError};
use crate::events::{CancelReason, EventBus, JobEvent};
use crate::job::{JobId, JobProgress, JobRequest, JobStatus, PrintJob};
use crate::printer::PrinterConfig;
use crate::protocol::{render, reset_sequence};
use crate::transport::DeviceId;

/// Queue and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum live jobs
    pub capacity: usize,
    /// Maximum jobs transmitting at once
    pub concurrency: usize,
    pub dispatch_interval_ms: u64,
    /// Base retry delay, multiplied by the retry count
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub job_timeout_ms: u64,
    /// Finished jobs kept for inspection
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            concurrency: 1,
            dispatch_interval_ms: 1_000,
            retry_delay_ms: 1_000,
            max_retries: 3,
            job_timeout_ms: 30_000,
            history_limit: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// Delay before retry number `retry_count` (linear backoff)
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(retry_count as u64))
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ThermalinkError::Config("scheduler.capacity must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ThermalinkError::Config("scheduler.concurrency must be at least 1".into()));
        }
        if self.dispatch_interval_ms == 0 || self.job_timeout_ms == 0 {
            return Err(ThermalinkError::Config(
                "scheduler intervals and timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

struct State {
    queue: JobQueue,
    /// Jobs holding a concurrency slot, with their transmit switches
    running: HashMap<JobId, Running>,
    stats: StatsRecorder,
}

struct Running {
    device_id: DeviceId,
    control: TransmitControl,
    started: Instant,
}

struct Inner {
    config: SchedulerConfig,
    printer: PrinterConfig,
    registry: Arc<ConnectionRegistry>,
    events: EventBus,
    state: Mutex<State>,
    wake: Notify,
    idle: Notify,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Priority job scheduler. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("len", &self.len())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler publishing on the registry's event bus.
    pub fn new(config: SchedulerConfig, printer: PrinterConfig, registry: Arc<ConnectionRegistry>) -> Self {
        let events = registry.events().clone();
        let state = State {
            queue: JobQueue::new(config.capacity, config.history_limit),
            running: HashMap::new(),
            stats: StatsRecorder::new(),
        };
        Self {
            inner: Arc::new(Inner {
                config,
                printer,
                registry,
                events,
                state: Mutex::new(state),
                wake: Notify::new(),
                idle: Notify::new(),
                shutdown: CancellationToken::new(),
                driver: Mutex::new(None),
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    /// Validate and admit a job.
    ///
    /// ## Errors
    ///
    /// - [`ThermalinkError::InvalidJob`] for a structurally empty payload
    /// - [`ThermalinkError::QueueFull`] at capacity with nothing to evict
    pub fn enqueue(&self, request: JobRequest) -> Result<JobId> {
        let inner = &self.inner;
        let mut state = inner.lock();

        if let Err(e) = request.payload.validate() {
            state.stats.rejected += 1;
            return Err(e);
        }

        let priority = request.priority;
        let device_id = request.device_id.clone();
        let admission = match state
            .queue
            .push(request, inner.config.max_retries, inner.config.job_timeout())
        {
            Ok(admission) => admission,
            Err(e) => {
                state.stats.rejected += 1;
                warn!(device = %device_id, %priority, error = %e, "Job rejected");
                return Err(e);
            }
        };

        if let Some(evicted) = admission.evicted {
            state.stats.evicted += 1;
            state.stats.cancelled += 1;
            info!(job = %evicted, "Evicted to admit higher priority job");
            inner.events.emit(JobEvent::Cancelled {
                job_id: evicted,
                reason: CancelReason::QueueFull,
            });
        }

        state.stats.enqueued += 1;
        info!(job = %admission.job_id, device = %device_id, %priority, "Job queued");
        inner.events.emit(JobEvent::Queued {
            job_id: admission.job_id,
            device_id,
            priority,
        });
        drop(state);

        inner.wake.notify_one();
        Ok(admission.job_id)
    }

    /// Spawn the dispatch driver. Calling it again is a no-op.
    pub fn start(&self) {
        let mut driver = self.inner.driver.lock().unwrap_or_else(|e| e.into_inner());
        if driver.is_some() || self.inner.shutdown.is_cancelled() {
            return;
        }
        let inner = self.inner.clone();
        *driver = Some(tokio::spawn(inner.run()));
    }

    /// Start the next eligible job, if a slot is free.
    ///
    /// Returns the id of the job started.
    pub fn dispatch_next(&self) -> Option<JobId> {
        self.inner.dispatch_next()
    }

    /// Cancel a live job.
    ///
    /// A transmitting job stops before its next chunk and the printer gets
    /// a best-effort reset.
    ///
    /// ## Errors
    ///
    /// [`ThermalinkError::JobNotFound`], or
    /// [`ThermalinkError::InvalidTransition`] for a finished job.
    pub fn cancel(&self, job_id: &JobId) -> Result<()> {
        self.inner.cancel(job_id, CancelReason::Requested)
    }

    /// Hold a transmitting job before its next chunk.
    pub fn pause(&self, job_id: &JobId) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.lock();
        let State { queue, running, .. } = &mut *state;
        let job = queue
            .get_mut(job_id)
            .ok_or_else(|| ThermalinkError::JobNotFound(job_id.to_string()))?;
        job.transition(JobStatus::Paused)?;
        if let Some(run) = running.get(job_id) {
            run.control.pause();
        }
        info!(job = %job_id, "Job paused");
        inner.events.emit(JobEvent::Paused { job_id: *job_id });
        Ok(())
    }

    pub fn resume(&self, job_id: &JobId) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.lock();
        let State { queue, running, .. } = &mut *state;
        let job = queue
            .get_mut(job_id)
            .ok_or_else(|| ThermalinkError::JobNotFound(job_id.to_string()))?;
        if job.status != JobStatus::Paused {
            return Err(ThermalinkError::InvalidTransition {
                from: job.status.to_string(),
                to: JobStatus::Processing.to_string(),
            });
        }
        job.transition(JobStatus::Processing)?;
        if let Some(run) = running.get(job_id) {
            run.control.resume();
        }
        info!(job = %job_id, "Job resumed");
        inner.events.emit(JobEvent::Resumed { job_id: *job_id });
        Ok(())
    }

    /// Snapshot of one job
    pub fn job(&self, job_id: &JobId) -> Option<PrintJob> {
        self.inner.lock().queue.get(job_id).cloned()
    }

    /// Snapshot of all known jobs, live ones in dispatch order first
    pub fn jobs(&self) -> Vec<PrintJob> {
        self.inner.lock().queue.snapshot()
    }

    /// Number of live jobs
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        let active = state.running.len();
        let waiting = state.queue.len().saturating_sub(active);
        state.stats.snapshot(waiting, active)
    }

    /// Forget finished jobs, returning how many were dropped.
    pub fn clear_finished(&self) -> usize {
        self.inner.lock().queue.clear_finished()
    }

    /// Resolve once no job is Pending, Retrying, Processing or Paused, or
    /// once the scheduler has shut down.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.is_idle() || self.inner.shutdown.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Stop the driver and cancel in-flight jobs. Queued jobs stay Pending
    /// and jobs waiting out a retry delay go back to Pending.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        match self.inner.lock().queue.requeue_retrying() {
            Ok(requeued) if !requeued.is_empty() => debug!(jobs = requeued.len(), "Retrying jobs requeued"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Cannot requeue retrying jobs"),
        }
        self.inner.idle.notify_waiters();

        let running: Vec<JobId> = self.inner.lock().running.keys().copied().collect();
        for job_id in running {
            if let Err(e) = self.inner.cancel(&job_id, CancelReason::Shutdown) {
                debug!(job = %job_id, error = %e, "Cancel on shutdown skipped");
            }
        }

        let driver = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = driver {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler driver panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_idle(&self) -> bool {
        let state = self.lock();
        state.queue.is_empty()
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }

    async fn run(self: Arc<Self>) {
        let mut tick = tokio::time::interval(self.config.dispatch_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            capacity = self.config.capacity,
            concurrency = self.config.concurrency,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tick.tick() => {}
                _ = self.wake.notified() => {}
            }
            while self.dispatch_next().is_some() {}
        }
        debug!("Scheduler driver exiting");
    }

    fn dispatch_next(self: &Arc<Self>) -> Option<JobId> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let (job, control) = {
            let mut state = self.lock();
            if state.running.len() >= self.config.concurrency {
                return None;
            }
            let busy: HashSet<DeviceId> = state.running.values().map(|run| run.device_id.clone()).collect();
            let job_id = state.queue.next_pending(&busy)?;
            let job = state.queue.get_mut(&job_id)?;
            if let Err(e) = job.transition(JobStatus::Processing) {
                error!(job = %job_id, error = %e, "Cannot dispatch job");
                return None;
            }
            let attempt = job.retry_count + 1;
            let job = job.clone();

            let control = TransmitControl::new();
            state.running.insert(
                job_id,
                Running {
                    device_id: job.device_id.clone(),
                    control: control.clone(),
                    started: Instant::now(),
                },
            );
            state.stats.dequeued += 1;
            info!(job = %job_id, device = %job.device_id, attempt, "Job started");
            self.events.emit(JobEvent::Started { job_id, attempt });
            (job, control)
        };

        let job_id = job.id;
        tokio::spawn(self.clone().execute(job, control));
        Some(job_id)
    }

    async fn execute(self: Arc<Self>, job: PrintJob, control: TransmitControl) {
        let result = self.transmit(&job, &control).await;
        self.finish(&job.id, result);
    }

    async fn transmit(self: &Arc<Self>, job: &PrintJob, control: &TransmitControl) -> Result<()> {
        // Render before touching the link: a payload that cannot encode
        // fails without consuming a retry
        let started_at = Instant::now();
        let buffer = render(&job.payload, &self.printer)?;
        debug!(job = %job.id, bytes = buffer.len(), kind = job.payload.kind(), "Rendered");

        let manager = self.registry.get_or_create(&job.device_id);
        if !manager.is_connected() {
            debug!(job = %job.id, device = %job.device_id, "Link down, connecting before transmit");
            let deadline = started_at + job.timeout();
            tokio::select! {
                _ = control.cancelled() => return Err(ThermalinkError::JobCancelled),
                result = tokio::time::timeout_at(deadline, manager.connect()) => {
                    result.map_err(|_| ThermalinkError::JobTimeout(job.timeout()))??
                }
            }
        }

        let options = TransmitOptions {
            mtu: self.printer.mtu,
            chunk_delay: Duration::from_millis(self.printer.chunk_delay_ms),
            write_timeout: manager.config().write_timeout(),
            timeout: job.timeout(),
            started_at,
        };
        let job_id = job.id;
        let progress = self.clone();
        manager
            .write(&buffer, &options, control, move |sent, total| {
                progress.report_progress(&job_id, sent, total)
            })
            .await
    }

    fn report_progress(&self, job_id: &JobId, sent: usize, total: usize) {
        let mut state = self.lock();
        let Some(job) = state.queue.get_mut(job_id) else { return };
        if !job.status.is_active() {
            return;
        }
        job.progress = JobProgress::chunks(sent, total);
        self.events.emit(JobEvent::Progress {
            job_id: *job_id,
            percentage: job.progress.percentage,
            message: job.progress.message.clone(),
        });
    }

    fn finish(self: &Arc<Self>, job_id: &JobId, result: Result<()>) {
        let mut state = self.lock();
        let running = state.running.remove(job_id);
        let State { queue, stats, .. } = &mut *state;
        let Some(job) = queue.get_mut(job_id) else { return };
        if job.status.is_terminal() {
            // Cancelled while the transmission was unwinding
            drop(state);
            self.wake.notify_one();
            self.notify_if_idle();
            return;
        }
        if job.status == JobStatus::Paused {
            // Finished between the last chunk and the pause taking effect
            match job.transition(JobStatus::Processing) {
                Ok(()) => self.events.emit(JobEvent::Resumed { job_id: *job_id }),
                Err(e) => error!(job = %job_id, error = %e, "Cannot resume job"),
            }
        }

        match result {
            Ok(()) => {
                let elapsed = running.map(|run| run.started.elapsed()).unwrap_or_default();
                if let Err(e) = job.transition(JobStatus::Completed) {
                    error!(job = %job_id, error = %e, "Cannot complete job");
                }
                stats.record_completion(elapsed);
                info!(job = %job_id, elapsed_ms = elapsed.as_millis() as u64, "Job completed");
                self.events.emit(JobEvent::Completed {
                    job_id: *job_id,
                    duration_ms: elapsed.as_millis() as u64,
                });
            }
            Err(e) if e.is_retryable() && job.can_retry() => {
                job.retry_count += 1;
                job.last_error = Some(e.to_string());
                let retry_count = job.retry_count;
                let delay = self.config.retry_delay(retry_count);
                if let Err(e) = job.transition(JobStatus::Retrying) {
                    error!(job = %job_id, error = %e, "Cannot retry job");
                }
                stats.retried += 1;
                warn!(job = %job_id, retry_count, delay_ms = delay.as_millis() as u64, error = %e, "Job will retry");
                self.events.emit(JobEvent::Retrying {
                    job_id: *job_id,
                    retry_count,
                    delay_ms: delay.as_millis() as u64,
                    error: e.to_string(),
                });
                self.schedule_retry(*job_id, delay);
            }
            Err(e) => {
                job.last_error = Some(e.to_string());
                let retry_count = job.retry_count;
                if let Err(e) = job.transition(JobStatus::Failed) {
                    error!(job = %job_id, error = %e, "Cannot fail job");
                }
                stats.failed += 1;
                warn!(job = %job_id, retry_count, error = %e, "Job failed");
                self.events.emit(JobEvent::Failed {
                    job_id: *job_id,
                    kind: e.kind(),
                    error: e.to_string(),
                    retry_count,
                });
            }
        }
        queue.compact();
        drop(state);

        self.wake.notify_one();
        self.notify_if_idle();
    }

    fn schedule_retry(self: &Arc<Self>, job_id: JobId, delay: Duration) {
        let inner = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let requeued = {
                let mut state = inner.lock();
                match state.queue.get_mut(&job_id) {
                    Some(job) if job.status == JobStatus::Retrying => job.transition(JobStatus::Pending).is_ok(),
                    _ => false,
                }
            };
            if requeued {
                debug!(job = %job_id, "Retry delay elapsed");
                inner.wake.notify_one();
            }
        });
    }

    fn cancel(self: &Arc<Self>, job_id: &JobId, reason: CancelReason) -> Result<()> {
        let running = {
            let mut state = self.lock();
            let job = state
                .queue
                .get_mut(job_id)
                .ok_or_else(|| ThermalinkError::JobNotFound(job_id.to_string()))?;
            job.transition(JobStatus::Cancelled)?;
            job.last_error = Some(ThermalinkError::JobCancelled.to_string());
            state.stats.cancelled += 1;
            info!(job = %job_id, ?reason, "Job cancelled");
            self.events.emit(JobEvent::Cancelled {
                job_id: *job_id,
                reason,
            });
            let running = state.running.remove(job_id);
            state.queue.compact();
            running
        };

        if let Some(run) = running {
            run.control.cancel();
            if let Some(manager) = self.registry.get(&run.device_id) {
                self.send_reset(manager);
            }
        }

        self.wake.notify_one();
        self.notify_if_idle();
        Ok(())
    }

    /// Best-effort printer reset after an aborted transmission
    fn send_reset(&self, manager: Arc<ConnectionManager>) {
        if !manager.is_connected() {
            return;
        }
        let reset = reset_sequence(&self.printer);
        let mtu = self.printer.mtu;
        tokio::spawn(async move {
            if let Err(e) = manager.send_raw(&reset, mtu).await {
                debug!(device = %manager.device_id(), error = %e, "Printer reset failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::protocol::Payload;
    use crate::protocol::text::TextStyle;
    use crate::transport::SimulatedLink;

    fn scheduler(config: SchedulerConfig) -> (Scheduler, Arc<SimulatedLink>) {
        let link = Arc::new(SimulatedLink::new());
        let registry = Arc::new(ConnectionRegistry::new(
            link.clone(),
            ConnectionConfig::default(),
            EventBus::default(),
        ));
        (Scheduler::new(config, PrinterConfig::default(), registry), link)
    }

    fn text(content: &str) -> JobRequest {
        JobRequest::new(
            "p",
            Payload::Text {
                content: content.into(),
                style: TextStyle::default(),
            },
        )
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let config = SchedulerConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_rejects_empty_payload() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let err = scheduler.enqueue(text("")).unwrap_err();
        assert!(matches!(err, ThermalinkError::InvalidJob(_)));
        assert_eq!(scheduler.len(), 0);
        assert_eq!(scheduler.stats().rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_to_completion() {
        let (scheduler, link) = scheduler(SchedulerConfig::default());
        let id = scheduler.enqueue(text("hello")).unwrap();
        scheduler.start();
        scheduler.wait_until_idle().await;

        let job = scheduler.job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.percentage, 100);
        assert!(!link.written(&DeviceId::from("p")).is_empty());
        assert_eq!(scheduler.stats().completed, 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending_job() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let id = scheduler.enqueue(text("hello")).unwrap();
        scheduler.cancel(&id).unwrap();

        assert_eq!(scheduler.job(&id).unwrap().status, JobStatus::Cancelled);
        assert!(scheduler.cancel(&id).is_err());
        assert!(matches!(
            scheduler.cancel(&JobId::new()),
            Err(ThermalinkError::JobNotFound(_))
        ));
        assert_eq!(scheduler.dispatch_next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_requires_processing() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let id = scheduler.enqueue(text("hello")).unwrap();
        assert!(matches!(
            scheduler.pause(&id),
            Err(ThermalinkError::InvalidTransition { .. })
        ));
        assert!(scheduler.resume(&id).is_err());
    }
}
