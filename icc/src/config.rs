//! ICC configuration
//!
//! Defaults describe the hardware; a JSON document may override them.
//!
//! ```json
//! { "variant": "baikal", "timeout_ms": 15000 }
//! ```

use crate::layout::SouthbridgeVariant;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default reply timeout; some requests are slow
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("reply timeout must be non-zero")]
    ZeroTimeout,
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IccConfig {
    /// Southbridge generation, selects the register layout
    pub variant: SouthbridgeVariant,
    /// How long a request waits for its reply
    pub timeout_ms: u64,
}

impl Default for IccConfig {
    fn default() -> Self {
        Self {
            variant: SouthbridgeVariant::Aeolia,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl IccConfig {
    /// Parses and validates a JSON document
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Sets the variant
    pub fn with_variant(mut self, variant: SouthbridgeVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Sets the reply timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Reply timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_hardware() {
        let config = IccConfig::default();
        assert_eq!(config.variant, SouthbridgeVariant::Aeolia);
        assert_eq!(config.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = IccConfig::from_json(r#"{ "variant": "baikal" }"#).unwrap();
        assert_eq!(config.variant, SouthbridgeVariant::Baikal);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = IccConfig::from_json(r#"{ "timeout_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let err = IccConfig::from_json(r#"{ "variant": "belize" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "variant": "baikal", "timeout_ms": 250 }}"#).unwrap();

        let config = IccConfig::load(file.path()).unwrap();
        assert_eq!(config.variant, SouthbridgeVariant::Baikal);
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = IccConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_builder_roundtrips_through_json() {
        let config = IccConfig::default()
            .with_variant(SouthbridgeVariant::Baikal)
            .with_timeout(Duration::from_millis(40));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(IccConfig::from_json(&json).unwrap(), config);
    }
}
