//! # Printer Module
//!
//! Printer hardware descriptions consumed by the codec and the transmit path.
//!
//! ## Modules
//!
//! - [`config`]: Printer language, resolution, paper and Bluetooth tuning

pub mod config;

pub use config::{LabelConfig, PrinterConfig, PrinterLanguage};
