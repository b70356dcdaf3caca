//! Unified error type for the kernel dispatch core.
//!
//! Every fallible public entry point returns [`KernelResult`]. Variants are
//! grouped to match the three error classes the dispatch core distinguishes:
//! programmer errors, device/environment errors, and policy/soft errors that
//! respect [`crate::perf::PerfGuardConfig::strict_mode`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type KernelResult<T> = Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    // --- Device / environment errors ---
    #[error("no GPU adapter available")]
    DeviceUnavailable,

    #[error("device creation failed: {0}")]
    DeviceCreationFailed(String),

    #[error("device was lost: {reason}")]
    DeviceLost { reason: String },

    #[error("kernel variant requires unsupported features: {0:?}")]
    MissingFeatures(Vec<&'static str>),

    #[error("shader compilation failed for `{shader}`: {message}")]
    ShaderCompileFailed { shader: String, message: String },

    #[error(
        "dispatch for `{kernel}` exceeds device limits ({workgroups} workgroups on one axis, max {max}); {suggestion}"
    )]
    ExceedsDeviceDispatchLimit {
        kernel: String,
        workgroups: u64,
        max: u32,
        suggestion: String,
    },

    // --- Programmer / caller errors ---
    #[error("invalid dimensions for `{op}`: {reason}")]
    InvalidDimensions { op: String, reason: String },

    #[error("invalid buffer offset for `{op}`: {reason}")]
    InvalidOffsets { op: String, reason: String },

    #[error("buffer too small: need at least {required} bytes, got {actual}")]
    BufferTooSmall { required: u64, actual: u64 },

    #[error("requested buffer size {requested} exceeds device limit {limit}")]
    BufferTooLargeForDevice { requested: u64, limit: u64 },

    #[error("unknown kernel variant `{operation}:{variant}`")]
    UnknownVariant { operation: String, variant: String },

    #[error("command recorder already submitted")]
    DoubleSubmit,

    #[error("a compute pass is already open on this recorder")]
    PassAlreadyOpen,

    // --- Policy / soft errors ---
    #[error("readback disallowed: {reason}")]
    ReadbackDisallowed { reason: String },

    // --- Ambient plumbing ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("tuning cache (de)serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("{context}: {message}")]
    Context { context: String, message: String },
}

/// Adds human-readable context to a lower-level error, mirroring the
/// teacher's `ErrorContext` extension trait.
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> KernelResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, msg: &str) -> KernelResult<T> {
        self.map_err(|e| KernelError::Context {
            context: msg.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_features_lists_names() {
        let err = KernelError::MissingFeatures(vec!["subgroups", "f16"]);
        assert!(err.to_string().contains("subgroups"));
        assert!(err.to_string().contains("f16"));
    }

    #[test]
    fn context_wraps_display_error() {
        let result: Result<(), std::num::ParseIntError> = "x".parse::<i32>().map(|_| ());
        let wrapped = result.context("parsing kernel id");
        assert!(wrapped.is_err());
        assert!(wrapped.unwrap_err().to_string().contains("parsing kernel id"));
    }
}
