//! # Text Encoding
//!
//! Converts Unicode strings into the byte encoding the printer's font ROM
//! expects. Most Bluetooth receipt printers sold today ship a GBK font, so
//! GBK is the default: it is a multi-byte encoding that passes ASCII through
//! unchanged and covers simplified Chinese.
//!
//! Encoding is strict. A character the target encoding cannot represent is
//! an [`ThermalinkError::Encoding`], never a silent `?`, so a job either
//! renders exactly or fails before any byte reaches the printer.

use encoding_rs::{BIG5, Encoding, GBK, SHIFT_JIS};
use serde::{Deserialize, Serialize};

use super::commands;
use crate::error::{Result, ThermalinkError};

/// Byte encoding used for text content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// Simplified Chinese, double-byte (default)
    #[default]
    Gbk,
    /// Traditional Chinese, double-byte
    Big5,
    /// Japanese, double-byte
    ShiftJis,
    /// Raw UTF-8 for printers with a Unicode font
    Utf8,
    /// 7-bit ASCII only
    Ascii,
}

impl TextEncoding {
    fn codec(self) -> Option<&'static Encoding> {
        match self {
            Self::Gbk => Some(GBK),
            Self::Big5 => Some(BIG5),
            Self::ShiftJis => Some(SHIFT_JIS),
            Self::Utf8 | Self::Ascii => None,
        }
    }

    /// Whether the printer needs `FS &` before text in this encoding.
    pub fn needs_cjk_mode(self) -> bool {
        matches!(self, Self::Gbk | Self::Big5)
    }

    /// Command selecting the printer character mode for this encoding.
    pub fn select_commands(self) -> Vec<u8> {
        if self.needs_cjk_mode() {
            commands::cjk_mode_on()
        } else {
            commands::cjk_mode_off()
        }
    }

    /// Encode `s`, failing on the first unmappable character.
    ///
    /// ## Example
    ///
    /// ```
    /// use thermalink::protocol::encoding::TextEncoding;
    ///
    /// assert_eq!(TextEncoding::Gbk.encode("AB").unwrap(), b"AB".to_vec());
    /// assert_eq!(TextEncoding::Gbk.encode("中").unwrap(), vec![0xD6, 0xD0]);
    /// assert!(TextEncoding::Ascii.encode("é").is_err());
    /// ```
    pub fn encode(self, s: &str) -> Result<Vec<u8>> {
        match self {
            Self::Utf8 => Ok(s.as_bytes().to_vec()),
            Self::Ascii => match s.chars().find(|c| !c.is_ascii()) {
                Some(ch) => Err(unmappable(ch, self)),
                None => Ok(s.as_bytes().to_vec()),
            },
            _ => {
                let codec = self.codec().ok_or_else(|| {
                    ThermalinkError::Encoding(format!("no codec for {:?}", self))
                })?;
                let (bytes, _, had_errors) = codec.encode(s);
                if had_errors {
                    // Locate the offending character for the error message
                    let ch = s
                        .chars()
                        .find(|c| codec.encode(c.encode_utf8(&mut [0; 4])).2)
                        .unwrap_or('\u{FFFD}');
                    return Err(unmappable(ch, self));
                }
                Ok(bytes.into_owned())
            }
        }
    }
}

fn unmappable(ch: char, encoding: TextEncoding) -> ThermalinkError {
    ThermalinkError::Encoding(format!(
        "character '{}' (U+{:04X}) cannot be encoded as {:?}",
        ch, ch as u32, encoding
    ))
}
