//! # Configuration
//!
//! All settings live in one TOML document with a section per concern.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [connection]
//! heartbeat_interval_ms = 5000
//! max_reconnect_attempts = 3
//!
//! [scheduler]
//! capacity = 100
//! retry_delay_ms = 1000
//!
//! [printer]
//! language = "tspl"
//! dpi = 203
//! width_dots = 320
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::ConnectionConfig;
use crate::error::{Result, ThermalinkError};
use crate::printer::PrinterConfig;
use crate::queue::SchedulerConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub scheduler: SchedulerConfig,
    pub printer: PrinterConfig,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| ThermalinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| ThermalinkError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), printer = %config.printer.name, "Loaded configuration");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ThermalinkError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        self.scheduler.validate()?;
        self.printer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::PrinterLanguage;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [connection]
            max_reconnect_attempts = 5

            [scheduler]
            capacity = 10

            [printer]
            language = "tspl"
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.max_reconnect_attempts, 5);
        assert_eq!(config.connection.heartbeat_interval_ms, 5_000);
        assert_eq!(config.scheduler.capacity, 10);
        assert_eq!(config.printer.language, PrinterLanguage::Tspl);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::from_toml_str("[scheduler]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ThermalinkError::Config(_)));

        let err = Config::from_toml_str("[printer]\nmtu = \"big\"\n").unwrap_err();
        assert!(matches!(err, ThermalinkError::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/thermalink.toml").unwrap_err();
        assert!(matches!(err, ThermalinkError::Io(_)));
    }
}
