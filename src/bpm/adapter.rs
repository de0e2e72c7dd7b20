// src/bpm/adapter.rs

use std::path::Path;

use crate::analysis::{resolve, AnalysisOutcome, TempoHint, TempoInfo};
use crate::bpm::detector::estimate;
use crate::buffer::SampleBuffer;
use crate::decoder;
use crate::error::Result;

/// Offline analysis reports no downbeat offset; the estimator has no notion
/// of phase.
pub const LOCAL_OFFSET: f64 = 0.0;

fn analyze_buffer(buffer: &SampleBuffer) -> Result<TempoInfo> {
    let est = estimate(buffer)?;
    log::info!(
        "📊 Local analysis: {} BPM from {} peaks over {:.1}s",
        est.bpm,
        est.peak_count,
        buffer.duration_secs()
    );
    Ok(TempoInfo {
        bpm: est.bpm,
        duration: buffer.duration_secs(),
        offset: LOCAL_OFFSET,
    })
}

/// Decode then estimate. An undecodable file falls back to `hint`; a signal
/// without peaks is always an error.
pub fn analyze_bytes(bytes: Vec<u8>, extension: Option<&str>, hint: Option<TempoHint>) -> Result<AnalysisOutcome> {
    let result = decoder::decode_bytes(bytes, extension).and_then(|buf| analyze_buffer(&buf));
    resolve(result, hint)
}

pub fn analyze_file(path: impl AsRef<Path>, hint: Option<TempoHint>) -> Result<AnalysisOutcome> {
    let result = decoder::decode_file(path).and_then(|buf| analyze_buffer(&buf));
    resolve(result, hint)
}
