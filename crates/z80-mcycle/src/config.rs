//! CPU configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest trace ring the CPU will allocate.
pub const MAX_TRACE_DEPTH: usize = 1 << 20;

/// Runtime options for [`crate::Z80`].
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```
/// let config = z80_mcycle::Z80Config::from_json(r#"{ "trace_depth": 256 }"#).unwrap();
/// assert_eq!(config.trace_depth, 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Z80Config {
    /// Ticks kept in the trace ring. Zero disables tracing.
    pub trace_depth: usize,
    /// Check the bus invariants on every sub-phase and log violations.
    pub check_invariants: bool,
}

impl Default for Z80Config {
    fn default() -> Self {
        Self {
            trace_depth: 64,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

impl Z80Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        log::debug!("loaded config from {}: {config:?}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace_depth > MAX_TRACE_DEPTH {
            return Err(ConfigError::TraceDepthTooLarge {
                depth: self.trace_depth,
                max: MAX_TRACE_DEPTH,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = Z80Config::from_json("{}").unwrap();
        assert_eq!(config, Z80Config::default());
        assert_eq!(config.trace_depth, 64);
    }

    #[test]
    fn rejects_oversized_trace() {
        let err = Z80Config::from_json(r#"{ "trace_depth": 99999999 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::TraceDepthTooLarge { depth: 99_999_999, .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Z80Config::from_json("{ trace_depth: }").unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Z80Config::load("/nonexistent/z80.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/z80.json"));
    }
}
