//! # TSPL Label Language
//!
//! TSPL is the line-oriented command language spoken by TSC-compatible label
//! printers (and most cheap Bluetooth label makers). Unlike ESC/POS, nothing
//! prints as it arrives: commands describe a label in an image buffer, and
//! `PRINT` renders it.
//!
//! ## Program Shape
//!
//! ```text
//! SIZE 40 mm,30 mm
//! GAP 2 mm,0 mm
//! DENSITY 8
//! CLS
//! TEXT 16,16,"3",0,1,1,"Hello"
//! BARCODE 16,64,"128",80,1,0,2,2,"ABC-123"
//! PRINT 1,1
//! ```
//!
//! Positions are in device dots. [`Dpi`] converts millimetres to dots for
//! the two common print heads (203 and 300 DPI).
//!
//! Each builder call appends exactly one line. [`TsplBuilder::build`] joins
//! them with CR LF; text lines must be ASCII, and the only binary content is
//! the payload of `BITMAP`.

use serde::{Deserialize, Serialize};

use super::barcode::BarcodeFormat;
use super::barcode::qr::QrErrorLevel;
use super::graphics;
use crate::error::{Result, ThermalinkError};

// ============================================================================
// UNITS
// ============================================================================

/// Print head resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Dpi {
    /// 203 DPI, 8 dots/mm
    #[default]
    Dpi203,
    /// 300 DPI, ~11.8 dots/mm
    Dpi300,
}

impl TryFrom<u16> for Dpi {
    type Error = ThermalinkError;

    fn try_from(value: u16) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Dpi> for u16 {
    fn from(dpi: Dpi) -> u16 {
        dpi.value()
    }
}

impl Dpi {
    /// Parse a numeric resolution. Only 203 and 300 are supported.
    pub fn from_value(dpi: u16) -> Result<Self> {
        match dpi {
            203 => Ok(Self::Dpi203),
            300 => Ok(Self::Dpi300),
            other => Err(ThermalinkError::Encoding(format!(
                "unsupported resolution {} DPI (expected 203 or 300)",
                other
            ))),
        }
    }

    pub fn value(self) -> u16 {
        match self {
            Self::Dpi203 => 203,
            Self::Dpi300 => 300,
        }
    }

    /// Dots per millimetre
    ///
    /// ```
    /// use thermalink::protocol::tspl::Dpi;
    ///
    /// assert!((Dpi::Dpi203.dots_per_mm() - 8.0).abs() < 0.1);
    /// ```
    #[inline]
    pub fn dots_per_mm(self) -> f32 {
        self.value() as f32 / 25.4
    }

    /// Convert millimetres to dots (rounded, negative clamps to 0)
    #[inline]
    pub fn mm_to_dots(self, mm: f32) -> u32 {
        (mm * self.dots_per_mm()).round().max(0.0) as u32
    }

    /// Convert dots to millimetres
    #[inline]
    pub fn dots_to_mm(self, dots: u32) -> f32 {
        dots as f32 / self.dots_per_mm()
    }
}

/// Clockwise rotation of a label element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Validate a rotation given in degrees.
    pub fn from_degrees(degrees: u16) -> Result<Self> {
        match degrees {
            0 => Ok(Self::R0),
            90 => Ok(Self::R90),
            180 => Ok(Self::R180),
            270 => Ok(Self::R270),
            other => Err(ThermalinkError::Encoding(format!(
                "invalid rotation {} (expected 0, 90, 180 or 270)",
                other
            ))),
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }
}

/// TSPL symbology name for a 1D barcode format
pub fn barcode_type(format: BarcodeFormat) -> Result<&'static str> {
    Ok(match format {
        BarcodeFormat::UpcA => "UPCA",
        BarcodeFormat::UpcE => "UPCE",
        BarcodeFormat::Ean13 => "EAN13",
        BarcodeFormat::Ean8 => "EAN8",
        BarcodeFormat::Code39 => "39",
        BarcodeFormat::Itf => "25",
        BarcodeFormat::Codabar => "CODA",
        BarcodeFormat::Code93 => "93",
        BarcodeFormat::Code128 => "128",
        BarcodeFormat::Qr => {
            return Err(ThermalinkError::Encoding(
                "QR is not a 1D symbology, use QRCODE".into(),
            ));
        }
    })
}

/// Quote a string argument, escaping embedded double quotes as `\["]`.
fn quote(content: &str) -> Result<String> {
    if let Some(ch) = content.chars().find(|c| !c.is_ascii() || c.is_ascii_control()) {
        return Err(ThermalinkError::Encoding(format!(
            "TSPL text must be printable ASCII, found U+{:04X}",
            ch as u32
        )));
    }
    Ok(format!("\"{}\"", content.replace('"', "\\[\"]")))
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ThermalinkError::Encoding(format!(
            "{} {} outside {}-{}",
            name, value, min, max
        )))
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Stateful TSPL program builder.
///
/// ```
/// use thermalink::protocol::tspl::{Dpi, Rotation, TsplBuilder};
///
/// let mut label = TsplBuilder::new(Dpi::Dpi203);
/// label.size(40.0, 30.0).unwrap().gap(2.0, 0.0).unwrap().clear();
/// label.text(16, 16, "3", Rotation::R0, 1, 1, "Hello").unwrap();
/// label.print(1, 1).unwrap();
///
/// let bytes = label.build();
/// assert!(bytes.starts_with(b"SIZE 40 mm,30 mm\r\nGAP 2 mm,0 mm\r\nCLS\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct TsplBuilder {
    dpi: Dpi,
    lines: Vec<Vec<u8>>,
}

impl TsplBuilder {
    pub fn new(dpi: Dpi) -> Self {
        Self {
            dpi,
            lines: Vec::new(),
        }
    }

    pub fn dpi(&self) -> Dpi {
        self.dpi
    }

    /// Convert millimetres to dots at this builder's resolution
    pub fn mm_to_dots(&self, mm: f32) -> u32 {
        self.dpi.mm_to_dots(mm)
    }

    /// Number of command lines so far
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, line: String) -> &mut Self {
        self.lines.push(line.into_bytes());
        self
    }

    /// `SIZE w mm,h mm`: label dimensions
    pub fn size(&mut self, width_mm: f32, height_mm: f32) -> Result<&mut Self> {
        if !(width_mm > 0.0 && height_mm > 0.0) {
            return Err(ThermalinkError::Encoding(format!(
                "label size {}x{} mm must be positive",
                width_mm, height_mm
            )));
        }
        Ok(self.push(format!("SIZE {} mm,{} mm", width_mm, height_mm)))
    }

    /// `GAP m mm,n mm`: gap between labels and its offset
    pub fn gap(&mut self, gap_mm: f32, offset_mm: f32) -> Result<&mut Self> {
        if gap_mm < 0.0 || offset_mm < 0.0 {
            return Err(ThermalinkError::Encoding(format!(
                "label gap {} mm / offset {} mm must not be negative",
                gap_mm, offset_mm
            )));
        }
        Ok(self.push(format!("GAP {} mm,{} mm", gap_mm, offset_mm)))
    }

    /// `SPEED n`: print speed in inches per second (1-12)
    pub fn speed(&mut self, ips: u8) -> Result<&mut Self> {
        check_range("speed", ips as u32, 1, 12)?;
        Ok(self.push(format!("SPEED {}", ips)))
    }

    /// `DENSITY n`: print darkness (0-15)
    pub fn density(&mut self, n: u8) -> Result<&mut Self> {
        check_range("density", n as u32, 0, 15)?;
        Ok(self.push(format!("DENSITY {}", n)))
    }

    /// `DIRECTION n`: 0 = normal feed direction, 1 = mirrored
    pub fn direction(&mut self, reversed: bool) -> &mut Self {
        self.push(format!("DIRECTION {}", reversed as u8))
    }

    /// `CLS`: clear the image buffer
    pub fn clear(&mut self) -> &mut Self {
        self.push("CLS".to_string())
    }

    /// `TEXT x,y,"font",rotation,x-mul,y-mul,"content"`
    ///
    /// Multipliers range 1-10.
    #[allow(clippy::too_many_arguments)]
    pub fn text(
        &mut self,
        x: u32,
        y: u32,
        font: &str,
        rotation: Rotation,
        x_mul: u8,
        y_mul: u8,
        content: &str,
    ) -> Result<&mut Self> {
        check_range("text x multiplier", x_mul as u32, 1, 10)?;
        check_range("text y multiplier", y_mul as u32, 1, 10)?;
        if font.is_empty() {
            return Err(ThermalinkError::Encoding("TSPL font name is empty".into()));
        }
        let line = format!(
            "TEXT {},{},{},{},{},{},{}",
            x,
            y,
            quote(font)?,
            rotation.degrees(),
            x_mul,
            y_mul,
            quote(content)?
        );
        Ok(self.push(line))
    }

    /// `BARCODE x,y,"type",height,readable,rotation,narrow,wide,"content"`
    #[allow(clippy::too_many_arguments)]
    pub fn barcode(
        &mut self,
        x: u32,
        y: u32,
        format: BarcodeFormat,
        height: u32,
        readable: bool,
        rotation: Rotation,
        narrow: u8,
        wide: u8,
        content: &str,
    ) -> Result<&mut Self> {
        let code = barcode_type(format)?;
        super::barcode::validate(format, content)?;
        check_range("barcode height", height, 1, 9999)?;
        check_range("barcode narrow width", narrow as u32, 1, 10)?;
        check_range("barcode wide width", wide as u32, 1, 10)?;
        let line = format!(
            "BARCODE {},{},\"{}\",{},{},{},{},{},{}",
            x,
            y,
            code,
            height,
            readable as u8,
            rotation.degrees(),
            narrow,
            wide,
            quote(content)?
        );
        Ok(self.push(line))
    }

    /// `QRCODE x,y,ecc,cell,A,rotation,"content"` (automatic encoding mode)
    pub fn qrcode(
        &mut self,
        x: u32,
        y: u32,
        ecc: QrErrorLevel,
        cell_size: u8,
        rotation: Rotation,
        content: &str,
    ) -> Result<&mut Self> {
        super::barcode::qr::validate(content.as_bytes(), ecc)?;
        check_range("QR cell size", cell_size as u32, 1, 10)?;
        let line = format!(
            "QRCODE {},{},{:?},{},A,{},{}",
            x,
            y,
            ecc,
            cell_size,
            rotation.degrees(),
            quote(content)?
        );
        Ok(self.push(line))
    }

    /// `BOX x,y,x_end,y_end,thickness`: rectangle outline
    pub fn draw_box(&mut self, x: u32, y: u32, x_end: u32, y_end: u32, thickness: u32) -> Result<&mut Self> {
        if x_end <= x || y_end <= y {
            return Err(ThermalinkError::Encoding(format!(
                "box ({},{})-({},{}) has no area",
                x, y, x_end, y_end
            )));
        }
        check_range("box thickness", thickness, 1, 999)?;
        Ok(self.push(format!("BOX {},{},{},{},{}", x, y, x_end, y_end, thickness)))
    }

    /// `BAR x,y,width,height`: filled rectangle, used for straight lines
    pub fn line(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<&mut Self> {
        if width == 0 || height == 0 {
            return Err(ThermalinkError::Encoding("line width and height must be non-zero".into()));
        }
        Ok(self.push(format!("BAR {},{},{},{}", x, y, width, height)))
    }

    /// `REVERSE x,y,width,height`: invert a region (white on black)
    pub fn reverse(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<&mut Self> {
        if width == 0 || height == 0 {
            return Err(ThermalinkError::Encoding("reverse region must have an area".into()));
        }
        Ok(self.push(format!("REVERSE {},{},{},{}", x, y, width, height)))
    }

    /// `BITMAP x,y,width_bytes,height,0,data`
    ///
    /// `data` uses the usual 1 = black packing; TSPL treats a set bit as
    /// white, so the payload is inverted on the way in.
    pub fn bitmap(&mut self, x: u32, y: u32, width_dots: u16, height: u16, data: &[u8]) -> Result<&mut Self> {
        graphics::validate_image(width_dots, height, data)?;
        let mut line = format!(
            "BITMAP {},{},{},{},0,",
            x,
            y,
            graphics::width_bytes(width_dots),
            height
        )
        .into_bytes();
        line.extend(graphics::invert(data));
        self.lines.push(line);
        Ok(self)
    }

    /// `PRINT sets,copies`
    pub fn print(&mut self, copies: u32, sets: u32) -> Result<&mut Self> {
        check_range("copies", copies, 1, 65535)?;
        check_range("sets", sets, 1, 65535)?;
        Ok(self.push(format!("PRINT {},{}", sets, copies)))
    }

    /// `CUT`: cut now (printers with a cutter)
    pub fn cut(&mut self) -> &mut Self {
        self.push("CUT".to_string())
    }

    /// `FEED n`: feed n dots
    pub fn feed(&mut self, dots: u32) -> &mut Self {
        self.push(format!("FEED {}", dots))
    }

    /// `HOME`: feed to the start of the next label
    pub fn home(&mut self) -> &mut Self {
        self.push("HOME".to_string())
    }

    /// Join all lines with CR LF (trailing CR LF included).
    pub fn build(&self) -> Vec<u8> {
        let total: usize = self.lines.iter().map(|l| l.len() + 2).sum();
        let mut out = Vec::with_capacity(total);
        for line in &self.lines {
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

// ============================================================================
// TESTS
// ============================================================================
