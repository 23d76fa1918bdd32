//! # Printer Command Codec
//!
//! Low-level command builders for ESC/POS receipt printers and TSPL label
//! printers, plus the [`render`] entry point that turns a [`Payload`] into
//! the bytes for a configured printer.
//!
//! ## Module Structure
//!
//! - [`commands`]: Basic ESC/POS commands (init, feed, cut, character mode)
//! - [`text`]: Text styling (alignment, bold, underline, inverse, size)
//! - [`encoding`]: Unicode to printer font encoding (GBK, Big5, Shift_JIS)
//! - [`barcode`]: 1D barcodes and QR codes
//! - [`graphics`]: Raster bit images
//! - [`tspl`]: TSPL label program builder
//! - [`payload`]: The closed set of printable payloads
//! - [`render`]: Payload rendering and chunking
//!
//! ## Usage Example
//!
//! ```
//! use thermalink::protocol::{commands, text, barcode};
//! use thermalink::protocol::barcode::{BarcodeFormat, BarcodeOptions};
//!
//! let mut data = Vec::new();
//!
//! // Initialize printer
//! data.extend(commands::init());
//!
//! // Centered bold heading
//! data.extend(text::align(text::Alignment::Center));
//! data.extend(text::bold(true));
//! data.extend(b"RECEIPT\n");
//! data.extend(text::bold(false));
//!
//! // Order number as a barcode
//! data.extend(barcode::barcode(BarcodeFormat::Code128, "ORD-42", &BarcodeOptions::default()).unwrap());
//!
//! // Feed and cut
//! data.extend(commands::feed_lines(3));
//! data.extend(commands::cut(false));
//! ```

pub mod barcode;
pub mod commands;
pub mod encoding;
pub mod graphics;
pub mod payload;
pub mod render;
pub mod text;
pub mod tspl;

pub use payload::{Command, Payload};
pub use render::{RenderedBuffer, render, reset_sequence};
