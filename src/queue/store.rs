//! # Job Store
//!
//! The in-memory job table behind the scheduler: admission against a
//! capacity, eviction, dispatch order and finished-job history.
//!
//! ## Dispatch Order
//!
//! ```text
//! High ─► Normal ─► Low          (priority band)
//!   seq 3 ─► seq 7 ─► seq 9      (FIFO within a band, by admission sequence)
//! ```
//!
//! A retried job keeps its original sequence, so it goes back to the front
//! of its band.
//!
//! ## Capacity
//!
//! Capacity bounds *live* jobs (anything not yet terminal). Finished jobs
//! are kept for inspection up to a history limit, oldest dropped first.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::{Result, ThermalinkError};
use crate::job::{JobId, JobRequest, JobStatus, PrintJob};
use crate::transport::DeviceId;

/// Result of a successful admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub job_id: JobId,
    /// Job cancelled to make room, if the queue was full
    pub evicted: Option<JobId>,
}

/// Job table with admission and ordering rules
#[derive(Debug)]
pub struct JobQueue {
    capacity: usize,
    history_limit: usize,
    jobs: HashMap<JobId, PrintJob>,
    next_sequence: u64,
}

impl JobQueue {
    pub fn new(capacity: usize, history_limit: usize) -> Self {
        Self {
            capacity,
            history_limit,
            jobs: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit a job built from `request`.
    ///
    /// At capacity, the oldest Pending job of the lowest priority is
    /// cancelled to make room, but only if that priority is strictly lower
    /// than the new job's.
    ///
    /// ## Errors
    ///
    /// [`ThermalinkError::QueueFull`] when the queue is at capacity and no
    /// job can be evicted.
    pub fn push(&mut self, request: JobRequest, default_max_retries: u32, default_timeout: Duration) -> Result<Admission> {
        let mut evicted = None;
        if self.len() >= self.capacity {
            let victim = self
                .jobs
                .values()
                .filter(|job| job.status == JobStatus::Pending && job.priority < request.priority)
                .min_by_key(|job| (job.priority, job.sequence))
                .map(|job| job.id);
            let Some(victim) = victim else {
                return Err(ThermalinkError::QueueFull(self.capacity));
            };
            if let Some(job) = self.jobs.get_mut(&victim) {
                job.transition(JobStatus::Cancelled)?;
                job.last_error = Some(ThermalinkError::QueueFull(self.capacity).to_string());
            }
            evicted = Some(victim);
        }

        let job = PrintJob::new(request, self.next_sequence, default_max_retries, default_timeout);
        self.next_sequence += 1;
        let job_id = job.id;
        self.jobs.insert(job_id, job);
        self.prune_history();
        Ok(Admission { job_id, evicted })
    }

    /// The Pending job that should run next, skipping devices in `busy`.
    pub fn next_pending(&self, busy: &HashSet<DeviceId>) -> Option<JobId> {
        self.jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending && !busy.contains(&job.device_id))
            .max_by_key(|job| (job.priority, Reverse(job.sequence)))
            .map(|job| job.id)
    }

    pub fn get(&self, id: &JobId) -> Option<&PrintJob> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut PrintJob> {
        self.jobs.get_mut(id)
    }

    /// All jobs, live ones first in dispatch order, then finished ones by sequence.
    pub fn snapshot(&self) -> Vec<PrintJob> {
        let mut jobs: Vec<PrintJob> = self.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| (job.status.is_terminal(), Reverse(job.priority), job.sequence));
        jobs
    }

    /// Number of live (non-terminal) jobs
    pub fn len(&self) -> usize {
        self.jobs.values().filter(|job| !job.status.is_terminal()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|job| job.status == status).count()
    }

    /// Move every Retrying job back to Pending, returning their ids.
    pub fn requeue_retrying(&mut self) -> Result<Vec<JobId>> {
        let mut requeued = Vec::new();
        for job in self.jobs.values_mut().filter(|job| job.status == JobStatus::Retrying) {
            job.transition(JobStatus::Pending)?;
            requeued.push(job.id);
        }
        Ok(requeued)
    }

    /// Drop all finished jobs, returning how many were removed.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| !job.status.is_terminal());
        before - self.jobs.len()
    }

    fn prune_history(&mut self) {
        let mut finished: Vec<(u64, JobId)> = self
            .jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .map(|job| (job.sequence, job.id))
            .collect();
        if finished.len() <= self.history_limit {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - self.history_limit;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
    }

    /// Apply the history limit after jobs finished.
    pub fn compact(&mut self) {
        self.prune_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Priority;
    use crate::protocol::Payload;
    use crate::protocol::text::TextStyle;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn request(priority: Priority) -> JobRequest {
        JobRequest::new(
            "p",
            Payload::Text {
                content: "x".into(),
                style: TextStyle::default(),
            },
        )
        .priority(priority)
    }

    fn push(queue: &mut JobQueue, priority: Priority) -> Result<Admission> {
        queue.push(request(priority), 3, TIMEOUT)
    }

    #[test]
    fn test_dispatch_order() {
        let mut queue = JobQueue::new(10, 10);
        let low = push(&mut queue, Priority::Low).unwrap().job_id;
        let normal_1 = push(&mut queue, Priority::Normal).unwrap().job_id;
        let high = push(&mut queue, Priority::High).unwrap().job_id;
        let normal_2 = push(&mut queue, Priority::Normal).unwrap().job_id;

        let mut order = Vec::new();
        while let Some(id) = queue.next_pending(&HashSet::new()) {
            queue.get_mut(&id).unwrap().transition(JobStatus::Processing).unwrap();
            order.push(id);
        }
        assert_eq!(order, vec![high, normal_1, normal_2, low]);
    }

    #[test]
    fn test_capacity_rejects_equal_priority() {
        let mut queue = JobQueue::new(2, 10);
        push(&mut queue, Priority::Normal).unwrap();
        push(&mut queue, Priority::Normal).unwrap();
        assert_eq!(queue.len(), 2);

        let err = push(&mut queue, Priority::Normal).unwrap_err();
        assert!(matches!(err, ThermalinkError::QueueFull(2)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest_lowest() {
        let mut queue = JobQueue::new(3, 10);
        let low_old = push(&mut queue, Priority::Low).unwrap().job_id;
        let _low_new = push(&mut queue, Priority::Low).unwrap();
        let _normal = push(&mut queue, Priority::Normal).unwrap();

        let admission = push(&mut queue, Priority::High).unwrap();
        assert_eq!(admission.evicted, Some(low_old));
        assert_eq!(queue.get(&low_old).unwrap().status, JobStatus::Cancelled);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_running_jobs_are_not_evicted() {
        let mut queue = JobQueue::new(1, 10);
        let low = push(&mut queue, Priority::Low).unwrap().job_id;
        queue.get_mut(&low).unwrap().transition(JobStatus::Processing).unwrap();
        assert!(push(&mut queue, Priority::High).is_err());
    }

    #[test]
    fn test_busy_device_is_skipped() {
        let mut queue = JobQueue::new(10, 10);
        push(&mut queue, Priority::High).unwrap();
        let busy: HashSet<DeviceId> = [DeviceId::from("p")].into_iter().collect();
        assert_eq!(queue.next_pending(&busy), None);
    }

    #[test]
    fn test_history_limit() {
        let mut queue = JobQueue::new(10, 1);
        for _ in 0..3 {
            let id = push(&mut queue, Priority::Normal).unwrap().job_id;
            queue.get_mut(&id).unwrap().transition(JobStatus::Cancelled).unwrap();
            queue.compact();
        }
        assert_eq!(queue.count(JobStatus::Cancelled), 1);
        assert_eq!(queue.clear_finished(), 1);
        assert!(queue.snapshot().is_empty());
    }

    #[test]
    fn test_requeue_retrying() {
        let mut queue = JobQueue::new(10, 10);
        let waiting = push(&mut queue, Priority::Normal).unwrap().job_id;
        let retrying = push(&mut queue, Priority::Normal).unwrap().job_id;
        let job = queue.get_mut(&retrying).unwrap();
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Retrying).unwrap();

        assert_eq!(queue.requeue_retrying().unwrap(), vec![retrying]);
        assert_eq!(queue.get(&retrying).unwrap().status, JobStatus::Pending);
        assert_eq!(queue.get(&waiting).unwrap().status, JobStatus::Pending);
        assert!(queue.requeue_retrying().unwrap().is_empty());
    }
}
