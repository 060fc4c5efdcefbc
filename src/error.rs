//! Error types for xpuprobe
//!
//! This module defines the error type shared by the runtime model, the
//! device selector and the queue bring-up path.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for xpuprobe operations
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Exception reported by the device runtime
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The device does not support the requested partition scheme
    #[error("Feature not supported by device '{device}': {feature}")]
    FeatureNotSupported {
        /// Device that rejected the request
        device: String,
        /// Scheme or domain that was requested
        feature: String,
    },

    /// Device handle does not belong to the runtime
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// Context could not be built or does not contain the device
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    /// A submitted task failed
    #[error("Task failed: {0}")]
    Task(String),

    /// Topology description could not be loaded
    #[error("Topology error: {0}")]
    Topology(String),

    /// I/O error
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Create a "feature not supported" rejection for a device
    pub fn not_supported(device: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::FeatureNotSupported {
            device: device.into(),
            feature: feature.into(),
        }
    }

    /// Check if the runtime rejected a request as unsupported
    pub fn is_feature_not_supported(&self) -> bool {
        matches!(self, Self::FeatureNotSupported { .. })
    }
}

/// Result type alias for xpuprobe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::Topology(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ProbeError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = std::io::Result::<()>::Err(io_err)
            .with_path("/topologies/pvc.json")
            .unwrap_err();
        assert!(err.to_string().contains("/topologies/pvc.json"));
    }

    #[test]
    fn test_feature_not_supported_detection() {
        let err = ProbeError::not_supported("0.1", "partition_by_affinity_domain");
        assert!(err.is_feature_not_supported());
        assert!(!ProbeError::runtime("device lost").is_feature_not_supported());
    }

    #[test]
    fn test_json_error_maps_to_topology() {
        let err: ProbeError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, ProbeError::Topology(_)));
    }
}
