//! # Print Jobs
//!
//! A [`PrintJob`] is one payload bound for one printer, plus the bookkeeping
//! the scheduler needs: priority, retry budget, timeout, timestamps and
//! progress.
//!
//! ## Lifecycle
//!
//! ```text
//!                ┌──────────── Paused
//!                ▼               ▲
//! Pending ──► Processing ────────┘
//!    ▲           │ ├──► Completed
//!    │           │ └──► Failed
//!    │           ▼
//!    └─────── Retrying
//!
//! Any non-terminal status ──► Cancelled
//! ```
//!
//! Completed, Failed and Cancelled are terminal. Only the scheduler moves
//! jobs between statuses, always through [`PrintJob::transition`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ThermalinkError};
use crate::protocol::Payload;
use crate::transport::DeviceId;

/// Unique job identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = ThermalinkError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ThermalinkError::JobNotFound(format!("{}: {}", s, e)))
    }
}

/// Dispatch priority. Declaration order is the sort order, so
/// `High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        })
    }
}

/// Position of a job in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// ```
    /// use thermalink::job::JobStatus::*;
    ///
    /// assert!(Pending.can_transition_to(Processing));
    /// assert!(Retrying.can_transition_to(Pending));
    /// assert!(!Completed.can_transition_to(Pending));
    /// assert!(!Pending.can_transition_to(Completed));
    /// ```
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Processing) => true,
            (Processing, Completed | Failed | Retrying | Paused) => true,
            (Paused, Processing) => true,
            (Retrying, Pending) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Processing or Paused: the job holds a concurrency slot.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Processing | Self::Paused)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Retrying => "retrying",
        })
    }
}

/// Transmission progress of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// 0-100
    pub percentage: u8,
    pub message: String,
    pub last_update_at: DateTime<Utc>,
}

impl JobProgress {
    pub fn new(percentage: u8, message: impl Into<String>) -> Self {
        Self {
            percentage: percentage.min(100),
            message: message.into(),
            last_update_at: Utc::now(),
        }
    }

    /// Progress after `sent` of `total` chunks
    pub fn chunks(sent: usize, total: usize) -> Self {
        let percentage = if total == 0 { 100 } else { (sent * 100 / total) as u8 };
        Self::new(percentage, format!("sent {}/{} chunks", sent, total))
    }
}

/// What a caller submits to the scheduler.
///
/// Unset retry and timeout fields take the scheduler's defaults.
///
/// ```
/// use std::time::Duration;
/// use thermalink::job::{JobRequest, Priority};
/// use thermalink::protocol::Payload;
///
/// let request = JobRequest::new("printer-1", Payload::Text {
///     content: "Order #42".into(),
///     style: Default::default(),
/// })
/// .priority(Priority::High)
/// .max_retries(5)
/// .timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub device_id: DeviceId,
    pub payload: Payload,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl JobRequest {
    pub fn new(device_id: impl Into<DeviceId>, payload: Payload) -> Self {
        Self {
            device_id: device_id.into(),
            payload,
            priority: Priority::default(),
            max_retries: None,
            timeout_ms: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

/// A job admitted to the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub payload: Payload,
    pub device_id: DeviceId,
    pub priority: Priority,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    /// Admission order, breaks ties within a priority band
    pub sequence: u64,
    pub progress: JobProgress,
    pub last_error: Option<String>,
}

impl PrintJob {
    /// Build a Pending job from a request.
    pub fn new(request: JobRequest, sequence: u64, default_max_retries: u32, default_timeout: Duration) -> Self {
        Self {
            id: JobId::new(),
            payload: request.payload,
            device_id: request.device_id,
            priority: request.priority,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(default_max_retries),
            timeout_ms: request
                .timeout_ms
                .unwrap_or(default_timeout.as_millis() as u64),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_at: None,
            sequence,
            progress: JobProgress::new(0, "queued"),
            last_error: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Move to `next`, stamping the matching timestamp.
    ///
    /// ## Errors
    ///
    /// [`ThermalinkError::InvalidTransition`] if `next` is not reachable from
    /// the current status. The job is left unchanged.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ThermalinkError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let now = Utc::now();
        match next {
            JobStatus::Processing if self.status == JobStatus::Pending => self.started_at = Some(now),
            JobStatus::Completed => {
                self.completed_at = Some(now);
                self.progress = JobProgress::new(100, "completed");
            }
            JobStatus::Failed => self.failed_at = Some(now),
            JobStatus::Cancelled => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Whether another attempt is left in the retry budget
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
