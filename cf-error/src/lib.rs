//! Unified error handling for Chassisfan
//!
//! One error type shared by the core library and the daemon.

use std::io;
use std::path::PathBuf;

/// Result type alias using ChassisFanError
pub type Result<T> = std::result::Result<T, ChassisFanError>;

#[derive(thiserror::Error, Debug)]
pub enum ChassisFanError {
    // ============================================================================
    // Control Node Errors
    // ============================================================================
    #[error("Failed to read control node {path}: {source}")]
    NodeRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write control node {path}: {source}")]
    NodeWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Control node {path} holds no integer: {raw:?}")]
    NodeParse {
        path: PathBuf,
        raw: String,
    },

    #[error("No hwmon directory under {prefix} provides {suffix}")]
    NodeNotFound {
        prefix: PathBuf,
        suffix: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Tuning file line {line}: {reason}")]
    TuningParse {
        line: usize,
        reason: String,
    },

    // ============================================================================
    // Watchdog Errors
    // ============================================================================
    #[error("Watchdog error: {0}")]
    Watchdog(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl ChassisFanError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-config error for a named field
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by a missing or unreadable node, which the
    /// control loop treats as transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NodeRead { .. } | Self::NodeWrite { .. } | Self::NodeParse { .. } | Self::NodeNotFound { .. }
        )
    }
}

impl From<String> for ChassisFanError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for ChassisFanError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_read_display_names_path() {
        let err = ChassisFanError::NodeRead {
            path: PathBuf::from("/sys/x/temp1_input"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/sys/x/temp1_input"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_config_errors_are_not_transient() {
        assert!(!ChassisFanError::config("bad").is_transient());
        assert!(!ChassisFanError::invalid("zones[0].sensor", "out of range").is_transient());
    }

    #[test]
    fn test_from_str() {
        let err: ChassisFanError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
