//! # Print Payloads
//!
//! The closed set of things a print job can ask for. The codec matches on
//! these exhaustively, so adding a variant is a compile error everywhere a
//! renderer forgets to handle it.
//!
//! Payloads deserialize from JSON with a `type` tag:
//!
//! ```
//! use thermalink::protocol::Payload;
//!
//! let p: Payload = serde_json::from_str(
//!     r#"{"type": "barcode", "content": "ABC-123", "format": "code128"}"#,
//! ).unwrap();
//! assert_eq!(p.kind(), "barcode");
//! ```

use serde::{Deserialize, Serialize};

use super::barcode::BarcodeFormat;
use super::barcode::qr::{self, QrErrorLevel};
use super::text::TextStyle;
use crate::error::{Result, ThermalinkError};

fn default_barcode_height() -> u8 {
    80
}

fn default_cell_size() -> u8 {
    qr::DEFAULT_CELL_SIZE
}

/// What a print job prints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Styled text, one printed line per `\n`
    Text {
        content: String,
        #[serde(default)]
        style: TextStyle,
    },
    /// 1D barcode (or QR when `format` is `qr`)
    Barcode {
        content: String,
        format: BarcodeFormat,
        #[serde(default = "default_barcode_height")]
        height: u8,
    },
    QrCode {
        content: String,
        #[serde(default)]
        ecc_level: QrErrorLevel,
        #[serde(default = "default_cell_size")]
        cell_size: u8,
    },
    /// Pre-dithered 1bpp row-major image, MSB = leftmost dot
    Image {
        pixels: Vec<u8>,
        width: u16,
        height: u16,
    },
    /// An explicit list of primitives, rendered in order without the
    /// automatic trailing feed and cut
    Raw { commands: Vec<Command> },
}

/// A single printing primitive inside [`Payload::Raw`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Init,
    Text {
        content: String,
        #[serde(default)]
        style: TextStyle,
    },
    Barcode {
        content: String,
        format: BarcodeFormat,
        #[serde(default = "default_barcode_height")]
        height: u8,
    },
    QrCode {
        content: String,
        #[serde(default)]
        ecc_level: QrErrorLevel,
        #[serde(default = "default_cell_size")]
        cell_size: u8,
    },
    Image {
        pixels: Vec<u8>,
        width: u16,
        height: u16,
    },
    Feed {
        lines: u8,
    },
    Cut {
        #[serde(default)]
        partial: bool,
    },
    /// Bytes passed through verbatim (streaming languages only)
    Bytes { data: Vec<u8> },
}

impl Payload {
    /// Short name of the variant, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Barcode { .. } => "barcode",
            Self::QrCode { .. } => "qr_code",
            Self::Image { .. } => "image",
            Self::Raw { .. } => "raw",
        }
    }

    /// Structural checks done at enqueue time.
    ///
    /// Only missing data is rejected here. Symbology limits and parameter
    /// ranges belong to the codec, which reports them as encoding errors
    /// when the job is rendered.
    pub fn validate(&self) -> Result<()> {
        let missing = |what: &str| Err(ThermalinkError::InvalidJob(format!("{} is empty", what)));
        match self {
            Self::Text { content, .. } if content.is_empty() => missing("text content"),
            Self::Barcode { content, .. } if content.is_empty() => missing("barcode content"),
            Self::QrCode { content, .. } if content.is_empty() => missing("QR content"),
            Self::Image { pixels, width, height } => {
                if pixels.is_empty() {
                    missing("image pixel data")
                } else if *width == 0 || *height == 0 {
                    Err(ThermalinkError::InvalidJob(format!(
                        "image size {}x{} must be non-zero",
                        width, height
                    )))
                } else {
                    Ok(())
                }
            }
            Self::Raw { commands } if commands.is_empty() => missing("raw command list"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_missing_data() {
        let empty_text = Payload::Text {
            content: String::new(),
            style: TextStyle::default(),
        };
        assert!(matches!(empty_text.validate(), Err(ThermalinkError::InvalidJob(_))));

        let empty_raw = Payload::Raw { commands: vec![] };
        assert!(empty_raw.validate().is_err());

        let zero_image = Payload::Image {
            pixels: vec![0xFF],
            width: 0,
            height: 1,
        };
        assert!(zero_image.validate().is_err());
    }

    #[test]
    fn test_validate_leaves_symbology_limits_to_codec() {
        let long = Payload::Barcode {
            content: "X".repeat(400),
            format: BarcodeFormat::Code39,
            height: 80,
        };
        assert!(long.validate().is_ok());
    }

    #[test]
    fn test_raw_deserializes() {
        let p: Payload = serde_json::from_str(
            r#"{"type": "raw", "commands": [
                {"op": "init"},
                {"op": "text", "content": "hi"},
                {"op": "feed", "lines": 2},
                {"op": "cut"}
            ]}"#,
        )
        .unwrap();
        let Payload::Raw { commands } = p else {
            panic!("expected raw payload");
        };
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[3], Command::Cut { partial: false });
    }

    #[test]
    fn test_qr_defaults() {
        let p: Payload = serde_json::from_str(r#"{"type": "qr_code", "content": "x"}"#).unwrap();
        assert_eq!(
            p,
            Payload::QrCode {
                content: "x".into(),
                ecc_level: QrErrorLevel::M,
                cell_size: qr::DEFAULT_CELL_SIZE,
            }
        );
    }
}
