use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Thresholds and limits applied to every exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound bytes queued to the backend at which the frontend stops reading
    /// from the client.
    pub output_upper_threshold: usize,
    /// Staged response body bytes at which backend reads are paused.
    pub body_buffer_upper_threshold: usize,
    pub max_header_fields: usize,
    pub max_head_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_upper_threshold: 64 * 1024,
            body_buffer_upper_threshold: 64 * 1024,
            max_header_fields: 100,
            max_head_size: 64 * 1024,
        }
    }
}

impl Config {
    /// Load from a file (format picked from its extension), with `H2RELAY_*`
    /// environment variables taking precedence.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("H2RELAY"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("H2RELAY"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("output_upper_threshold", self.output_upper_threshold),
            ("body_buffer_upper_threshold", self.body_buffer_upper_threshold),
            ("max_header_fields", self.max_header_fields),
            ("max_head_size", self.max_head_size),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(Error::invalid_config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.output_upper_threshold, 65536);
        assert_eq!(config.body_buffer_upper_threshold, 65536);
        assert_eq!(config.max_header_fields, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_head_size = 1024").unwrap();
        writeln!(file, "output_upper_threshold = 4096").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.max_head_size, 1024);
        assert_eq!(config.output_upper_threshold, 4096);
        assert_eq!(config.max_header_fields, 100);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"body_buffer_upper_threshold": 0}}"#).unwrap();

        match Config::from_file(file.path()) {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains("body_buffer_upper_threshold")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
