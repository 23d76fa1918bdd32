//! # Thermalink - Print Job Streaming for Bluetooth Printers
//!
//! Thermalink drives ESC/POS receipt printers and TSPL label printers over
//! flaky wireless links. It provides:
//!
//! - **Protocol encoding**: ESC/POS and TSPL byte streams from typed payloads
//! - **Connection resilience**: heartbeats, reconnect with bounded attempts
//! - **Job scheduling**: priority queue with retries, cancel and pause
//! - **Events**: one broadcast stream for job and link lifecycle
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use thermalink::{
//!     Config, ConnectionRegistry, EventBus, JobRequest, Payload, Priority, Scheduler,
//!     protocol::text::TextStyle,
//!     transport::SimulatedLink,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> thermalink::Result<()> {
//! let config = Config::default();
//! let registry = Arc::new(ConnectionRegistry::new(
//!     Arc::new(SimulatedLink::new()),
//!     config.connection.clone(),
//!     EventBus::default(),
//! ));
//! let scheduler = Scheduler::new(config.scheduler, config.printer, registry);
//! scheduler.start();
//!
//! let payload = Payload::Text { content: "Hello".into(), style: TextStyle::default() };
//! scheduler.enqueue(JobRequest::new("AA:BB:CC:DD:EE:FF", payload).priority(Priority::High))?;
//! scheduler.wait_until_idle().await;
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | ESC/POS and TSPL encoders, payload rendering |
//! | [`connection`] | Per-device link manager and registry |
//! | [`queue`] | Job store, scheduler and statistics |
//! | [`transport`] | Link adapter trait and simulated link |
//! | [`events`] | Job and link events, broadcast bus |
//! | [`job`] | Job model and status machine |
//! | [`printer`] | Printer profiles |
//! | [`config`] | TOML configuration |
//! | [`error`] | Error types |

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod job;
pub mod printer;
pub mod protocol;
pub mod queue;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionRegistry};
pub use error::{Result, ThermalinkError};
pub use events::{Event, EventBus, JobEvent, LinkEvent};
pub use job::{JobId, JobRequest, JobStatus, Priority, PrintJob};
pub use printer::PrinterConfig;
pub use protocol::Payload;
pub use queue::{Scheduler, SchedulerConfig};
pub use transport::{DeviceId, LinkAdapter};
