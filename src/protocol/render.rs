//! # Payload Rendering
//!
//! Turns a [`Payload`] into the exact bytes for the configured printer
//! language.
//!
//! ```text
//! Payload ──► render(payload, &PrinterConfig) ──► RenderedBuffer ──► chunks(mtu)
//!                 │
//!                 ├── EscPos: init, char mode, elements, feed, cut
//!                 └── Tspl:   SIZE/GAP/.../CLS, laid-out elements, PRINT
//! ```
//!
//! Rendering is pure and all-or-nothing: the output is built in a scratch
//! buffer and only returned when every element encoded successfully. The
//! same payload and configuration always produce the same bytes.

use std::sync::Arc;

use super::barcode::qr::{self, QrErrorLevel};
use super::barcode::{self, BarcodeFormat, BarcodeOptions};
use super::commands::{self, LF};
use super::graphics;
use super::payload::{Command, Payload};
use super::text::{Alignment, TextStyle};
use super::tspl::{Rotation, TsplBuilder};
use crate::error::{Result, ThermalinkError};
use crate::printer::{PrinterConfig, PrinterLanguage};

/// Immutable rendered job output.
///
/// Cloning is cheap (the bytes are shared), so the scheduler can keep a
/// copy for retries while the transmit path walks the chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBuffer(Arc<[u8]>);

impl RenderedBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into writes of at most `mtu` bytes (an `mtu` of 0 is treated as 1).
    pub fn chunks(&self, mtu: usize) -> std::slice::Chunks<'_, u8> {
        self.0.chunks(mtu.max(1))
    }

    pub fn chunk_count(&self, mtu: usize) -> usize {
        self.0.len().div_ceil(mtu.max(1))
    }
}

impl From<Vec<u8>> for RenderedBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

/// Render `payload` for the printer described by `config`.
///
/// ## Example
///
/// ```
/// use thermalink::printer::PrinterConfig;
/// use thermalink::protocol::{render, Payload};
///
/// let payload = Payload::Text { content: "Hello".into(), style: Default::default() };
/// let buffer = render(&payload, &PrinterConfig::receipt_58mm()).unwrap();
///
/// assert!(buffer.as_bytes().starts_with(&[0x1B, 0x40])); // ESC @
/// assert_eq!(buffer.chunk_count(512), 1);
/// ```
pub fn render(payload: &Payload, config: &PrinterConfig) -> Result<RenderedBuffer> {
    let bytes = match config.language {
        PrinterLanguage::EscPos => render_escpos(payload, config)?,
        PrinterLanguage::Tspl => render_tspl(payload, config)?,
    };
    Ok(bytes.into())
}

/// Bytes that return the printer to a known state after an aborted job.
pub fn reset_sequence(config: &PrinterConfig) -> Vec<u8> {
    match config.language {
        PrinterLanguage::EscPos => commands::init(),
        PrinterLanguage::Tspl => TsplBuilder::new(config.dpi).clear().build(),
    }
}

// ============================================================================
// ESC/POS
// ============================================================================

fn render_escpos(payload: &Payload, config: &PrinterConfig) -> Result<Vec<u8>> {
    let mut out = commands::init();
    out.extend(config.encoding.select_commands());

    match payload {
        Payload::Text { content, style } => escpos_text(&mut out, content, style, config)?,
        Payload::Barcode { content, format, height } => {
            escpos_barcode(&mut out, *format, content, *height)?
        }
        Payload::QrCode { content, ecc_level, cell_size } => {
            out.extend(qr::generate(content.as_bytes(), *cell_size, *ecc_level)?)
        }
        Payload::Image { pixels, width, height } => {
            escpos_image(&mut out, pixels, *width, *height, config)?
        }
        Payload::Raw { commands } => {
            for command in commands {
                escpos_command(&mut out, command, config)?;
            }
            // Raw lists control their own feed and cut
            return Ok(out);
        }
    }

    out.extend(commands::feed_lines(config.feed_lines));
    if config.auto_cut {
        out.extend(commands::cut(false));
    }
    Ok(out)
}

fn escpos_command(out: &mut Vec<u8>, command: &Command, config: &PrinterConfig) -> Result<()> {
    match command {
        Command::Init => out.extend(commands::init()),
        Command::Text { content, style } => escpos_text(out, content, style, config)?,
        Command::Barcode { content, format, height } => escpos_barcode(out, *format, content, *height)?,
        Command::QrCode { content, ecc_level, cell_size } => {
            out.extend(qr::generate(content.as_bytes(), *cell_size, *ecc_level)?)
        }
        Command::Image { pixels, width, height } => escpos_image(out, pixels, *width, *height, config)?,
        Command::Feed { lines } => out.extend(commands::feed_lines(*lines)),
        Command::Cut { partial } => {
            out.extend(commands::feed_lines(config.feed_lines));
            out.extend(commands::cut(*partial));
        }
        Command::Bytes { data } => out.extend_from_slice(data),
    }
    Ok(())
}

fn escpos_text(out: &mut Vec<u8>, content: &str, style: &TextStyle, config: &PrinterConfig) -> Result<()> {
    out.extend(style.to_commands()?);
    for line in content.lines() {
        out.extend(config.encoding.encode(line)?);
        out.push(LF);
    }
    out.extend(TextStyle::reset());
    Ok(())
}

fn escpos_barcode(out: &mut Vec<u8>, format: BarcodeFormat, content: &str, height: u8) -> Result<()> {
    let options = BarcodeOptions {
        height,
        ..BarcodeOptions::default()
    };
    out.extend(barcode::barcode(format, content, &options)?);
    Ok(())
}

fn escpos_image(out: &mut Vec<u8>, pixels: &[u8], width: u16, height: u16, config: &PrinterConfig) -> Result<()> {
    if width > config.width_dots {
        return Err(ThermalinkError::Encoding(format!(
            "image width {} exceeds print width {} dots",
            width, config.width_dots
        )));
    }
    out.extend(graphics::raster_bands(width, height, pixels, config.max_raster_rows)?);
    Ok(())
}

// ============================================================================
// TSPL
// ============================================================================

/// Built-in font used for label text (8x12 "3" font is 16x24 dots)
const FONT: &str = "3";
const FONT_WIDTH: u32 = 16;
const FONT_HEIGHT: u32 = 24;
/// Vertical space between stacked elements
const LINE_GAP: u32 = 4;
/// Height of the human readable line printed under a barcode
const HRI_HEIGHT: u32 = 24;
/// Modules per side of the smallest (version 1) QR symbol
const QR_MIN_MODULES: u32 = 21;

fn render_tspl(payload: &Payload, config: &PrinterConfig) -> Result<Vec<u8>> {
    let mut layout = LabelLayout::new(config)?;

    let raw = matches!(payload, Payload::Raw { .. });
    match payload {
        Payload::Text { content, style } => layout.text(content, style)?,
        Payload::Barcode { content, format, height } => layout.barcode(*format, content, *height)?,
        Payload::QrCode { content, ecc_level, cell_size } => layout.qrcode(content, *ecc_level, *cell_size)?,
        Payload::Image { pixels, width, height } => layout.image(pixels, *width, *height)?,
        Payload::Raw { commands } => {
            for command in commands {
                layout.command(command)?;
            }
        }
    }

    let cut = layout.cut_requested || (config.auto_cut && !raw);
    let label = &mut layout.label;
    label.print(1, 1)?;
    if cut {
        label.cut();
    }
    Ok(label.build())
}

/// Top-to-bottom placement of elements on one label
struct LabelLayout {
    label: TsplBuilder,
    width: u32,
    height: u32,
    margin: u32,
    y: u32,
    cut_requested: bool,
}

impl LabelLayout {
    fn new(config: &PrinterConfig) -> Result<Self> {
        let settings = &config.label;
        let mut label = TsplBuilder::new(config.dpi);
        label
            .size(settings.width_mm, settings.height_mm)?
            .gap(settings.gap_mm, 0.0)?
            .speed(settings.speed)?
            .density(settings.density)?
            .direction(false)
            .clear();

        Ok(Self {
            width: label.mm_to_dots(settings.width_mm),
            height: label.mm_to_dots(settings.height_mm),
            margin: settings.margin_dots,
            y: settings.margin_dots,
            cut_requested: false,
            label,
        })
    }

    /// Claim `height` dots at the cursor, returning the element's y.
    fn reserve(&mut self, what: &str, height: u32) -> Result<u32> {
        let y = self.y;
        if y + height > self.height {
            return Err(ThermalinkError::Encoding(format!(
                "{} at y={} ({} dots tall) overflows the {}-dot label",
                what, y, height, self.height
            )));
        }
        self.y = y + height + LINE_GAP;
        Ok(y)
    }

    fn x_for(&self, what: &str, alignment: Alignment, width: u32) -> Result<u32> {
        if self.margin + width > self.width {
            return Err(ThermalinkError::Encoding(format!(
                "{} {} dots wide overflows the {}-dot label",
                what, width, self.width
            )));
        }
        Ok(match alignment {
            Alignment::Left => self.margin,
            Alignment::Center => (self.width - width) / 2,
            Alignment::Right => self.width.saturating_sub(self.margin + width),
        })
    }

    fn text(&mut self, content: &str, style: &TextStyle) -> Result<()> {
        let (x_mul, y_mul) = (style.width_mult, style.height_mult);
        let height = FONT_HEIGHT * y_mul as u32;

        for line in content.lines() {
            let y = self.reserve("text", height)?;
            if line.is_empty() {
                continue;
            }
            let width = line.chars().count() as u32 * FONT_WIDTH * x_mul as u32;
            let x = self.x_for("text line", style.alignment, width)?;

            self.label.text(x, y, FONT, Rotation::R0, x_mul, y_mul, line)?;
            if style.bold {
                // Overstrike one dot to the right
                self.label.text(x + 1, y, FONT, Rotation::R0, x_mul, y_mul, line)?;
            }
            if style.underline {
                self.label.line(x, y + height - 2, width, 2)?;
            }
            if style.inverse {
                self.label.reverse(x, y, width, height)?;
            }
        }
        Ok(())
    }

    fn barcode(&mut self, format: BarcodeFormat, content: &str, height: u8) -> Result<()> {
        if format == BarcodeFormat::Qr {
            return self.qrcode(content, QrErrorLevel::default(), qr::DEFAULT_CELL_SIZE);
        }
        let y = self.reserve("barcode", height as u32 + HRI_HEIGHT)?;
        self.label
            .barcode(self.margin, y, format, height as u32, true, Rotation::R0, 2, 2, content)?;
        Ok(())
    }

    fn qrcode(&mut self, content: &str, ecc: QrErrorLevel, cell_size: u8) -> Result<()> {
        // Only the smallest symbol size is known before the printer encodes it
        let side = QR_MIN_MODULES * cell_size as u32;
        let y = self.reserve("QR code", side)?;
        self.label.qrcode(self.margin, y, ecc, cell_size, Rotation::R0, content)?;
        Ok(())
    }

    fn image(&mut self, pixels: &[u8], width: u16, height: u16) -> Result<()> {
        let x = self.x_for("image", Alignment::Left, width as u32)?;
        let y = self.reserve("image", height as u32)?;
        self.label.bitmap(x, y, width, height, pixels)?;
        Ok(())
    }

    fn command(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Init => {
                self.label.clear();
                self.y = self.margin;
            }
            Command::Text { content, style } => self.text(content, style)?,
            Command::Barcode { content, format, height } => self.barcode(*format, content, *height)?,
            Command::QrCode { content, ecc_level, cell_size } => self.qrcode(content, *ecc_level, *cell_size)?,
            Command::Image { pixels, width, height } => self.image(pixels, *width, *height)?,
            Command::Feed { lines } => {
                self.y += *lines as u32 * (FONT_HEIGHT + LINE_GAP);
            }
            Command::Cut { .. } => self.cut_requested = true,
            Command::Bytes { .. } => {
                return Err(ThermalinkError::Encoding(
                    "raw bytes are not supported by the TSPL label language".into(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
