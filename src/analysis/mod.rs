// src/analysis/mod.rs

pub mod client;
pub mod gate;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TempoError};

pub use client::{AnalysisClient, TempoAnalyzer};
pub use gate::{AnalysisGate, GateGuard};

/// Offset reported alongside header-derived values when analysis fails.
pub const FALLBACK_OFFSET: f64 = 0.1;

/// Tempo and length the caller already knows from file metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoHint {
    pub bpm: f64,
    pub duration: f64,
}

impl TempoHint {
    pub fn new(bpm: f64, duration: f64) -> Self {
        Self { bpm, duration }
    }

    pub fn is_usable(&self) -> bool {
        self.bpm.is_finite() && self.bpm > 0.0 && self.duration.is_finite() && self.duration > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoInfo {
    pub bpm: f64,
    /// Seconds.
    pub duration: f64,
    /// Seconds from the start of the file to the first downbeat.
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "tempo", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Analyzed(TempoInfo),
    /// Analysis failed; values come from the caller's hint.
    Fallback(TempoInfo),
}

impl AnalysisOutcome {
    pub fn info(&self) -> &TempoInfo {
        match self {
            AnalysisOutcome::Analyzed(info) | AnalysisOutcome::Fallback(info) => info,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AnalysisOutcome::Fallback(_))
    }
}

/// Turn an analysis attempt into an outcome. Decode and network failures
/// recover to the hint when it carries both a bpm and a duration; every
/// other error is returned as is.
pub fn resolve(result: Result<TempoInfo>, hint: Option<TempoHint>) -> Result<AnalysisOutcome> {
    match result {
        Ok(info) => Ok(AnalysisOutcome::Analyzed(info)),
        Err(err) if err.is_recoverable() => match hint.filter(TempoHint::is_usable) {
            Some(h) => {
                log::warn!("⚠️ Analysis failed ({}), falling back to {} BPM from metadata", err, h.bpm);
                Ok(AnalysisOutcome::Fallback(TempoInfo {
                    bpm: h.bpm,
                    duration: h.duration,
                    offset: FALLBACK_OFFSET,
                }))
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

/// Convenience for callers that only hold an error.
pub fn fallback_for(err: TempoError, hint: Option<TempoHint>) -> Result<AnalysisOutcome> {
    resolve(Err(err), hint)
}
