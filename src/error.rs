//! Error type for the domain-adversarial training pipeline.
//!
//! # Design Principles
//!
//! - **NO FALLBACKS**: errors must propagate, not be silently handled
//! - **FAIL FAST**: invalid configuration is rejected at construction time
//! - **CONTEXTUAL**: every variant carries the values needed to debug it

use thiserror::Error;

/// Error type for all model, segmentation and training failures.
#[derive(Debug, Error)]
pub enum DanError {
    // === Configuration Errors ===
    /// Configuration invalid (inconsistent window shape, zero dimensions, ...).
    #[error("Configuration error: {message}")]
    Config { message: String },

    // === Input Validation Errors ===
    /// Not a single sample in the batch spans one full resampling window.
    #[error(
        "Insufficient signal length: longest signal has {max_length} samples, \
         below one resampling window of {resampling}"
    )]
    InsufficientSignalLength { max_length: usize, resampling: usize },

    /// Per-batch array lengths disagree (signals vs lengths vs domains).
    #[error("Batch length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A declared true length exceeds the padded time axis.
    #[error("Signal {index}: declared length {length} exceeds padded width {padded}")]
    LengthExceedsSignal {
        index: usize,
        length: usize,
        padded: usize,
    },

    /// Tensor shape disagrees with what the pipeline expects.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    // === Infrastructure Errors ===
    /// Tensor/device operation failed inside candle.
    #[error("Tensor error: {message}")]
    Tensor { message: String },

    /// File I/O error (checkpoints, config files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for all operations in this crate.
pub type DanResult<T> = Result<T, DanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_length_message_names_both_values() {
        let err = DanError::InsufficientSignalLength {
            max_length: 300,
            resampling: 500,
        };
        let msg = format!("{err}");
        assert!(msg.contains("300"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "checkpoint missing");
        let err: DanError = io.into();
        assert!(format!("{err}").contains("checkpoint missing"));
    }

    #[test]
    fn config_error_message_passthrough() {
        let err = DanError::Config {
            message: "window height must be non-zero".into(),
        };
        assert!(format!("{err}").contains("window height"));
    }
}
