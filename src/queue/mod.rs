//! # Print Job Queue
//!
//! - [`store`]: job table, admission, eviction and dispatch order
//! - [`scheduler`]: dispatch driver, retries, cancel and pause
//! - [`stats`]: counters and throughput

pub mod scheduler;
pub mod stats;
pub mod store;

pub use scheduler::{Scheduler, SchedulerConfig};
pub use stats::QueueStats;
pub use store::{Admission, JobQueue};
