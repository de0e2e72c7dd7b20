// src/error.rs

use thiserror::Error;

/// Everything the core can fail with. Callers match on the variant to decide
/// between falling back to known values and informing the user.
#[derive(Debug, Error)]
pub enum TempoError {
    /// Input bytes could not be interpreted as audio.
    #[error("could not decode audio: {0}")]
    DecodeFailure(String),

    /// The estimator found no usable inter-peak intervals.
    #[error("no usable peaks detected in signal")]
    NoPeaksDetected,

    /// The analysis service call failed or reported `success: false`.
    #[error("analysis service failed: {0}")]
    NetworkFailure(String),

    /// Tempo ratio, semitone shift, bpm or similar outside the supported range.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid sample buffer: {0}")]
    InvalidBuffer(String),

    #[error("render failed: {0}")]
    RenderFailure(String),

    #[error("async runtime unavailable: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TempoError {
    /// Failures that the header-provided bpm/duration may stand in for.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TempoError::DecodeFailure(_) | TempoError::NetworkFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, TempoError>;
