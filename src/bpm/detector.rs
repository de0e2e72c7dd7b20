// src/bpm/detector.rs

use serde::Serialize;

use crate::bpm::utils::{fold_bpm, find_peaks, mean, peak_intervals, round_to_tenth, window_energies};
use crate::buffer::SampleBuffer;
use crate::error::{Result, TempoError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BpmEstimate {
    /// Folded into `[min_bpm, max_bpm]`, one decimal.
    pub bpm: f64,
    pub peak_count: usize,
    /// Mean distance between consecutive peaks.
    pub interval_secs: f64,
    /// Energy window length in samples.
    pub window_size: usize,
}

#[derive(Clone, Debug)]
pub struct BpmOptions {
    pub window_secs: f64,
    pub threshold_factor: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for BpmOptions {
    fn default() -> Self {
        Self {
            window_secs: 0.05,
            threshold_factor: 1.5,
            min_bpm: 60.0,
            max_bpm: 180.0,
        }
    }
}

impl BpmOptions {
    fn validate(&self) -> Result<()> {
        if !(self.window_secs.is_finite() && self.window_secs > 0.0) {
            return Err(TempoError::InvalidParameters(format!("window_secs {}", self.window_secs)));
        }
        if !self.threshold_factor.is_finite() {
            return Err(TempoError::InvalidParameters(format!(
                "threshold_factor {}",
                self.threshold_factor
            )));
        }
        if !(self.min_bpm.is_finite() && self.min_bpm > 0.0 && self.max_bpm.is_finite() && self.max_bpm > self.min_bpm) {
            return Err(TempoError::InvalidParameters(format!(
                "bpm range {}..{}",
                self.min_bpm, self.max_bpm
            )));
        }
        Ok(())
    }

    /// Samples per energy window at `sample_rate`, never less than one.
    pub fn window_size(&self, sample_rate: u32) -> usize {
        ((sample_rate as f64 * self.window_secs).round() as usize).max(1)
    }
}

/// Energy-peak tempo estimator. Looks at channel 0 only.
pub struct BpmDetector {
    opts: BpmOptions,
}

impl BpmDetector {
    pub fn new(opts: BpmOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &BpmOptions {
        &self.opts
    }

    pub fn detect(&self, buffer: &SampleBuffer) -> Result<BpmEstimate> {
        self.opts.validate()?;
        let sample_rate = buffer.sample_rate();
        let samples = buffer.channel(0).unwrap_or(&[]);
        if samples.is_empty() {
            return Err(TempoError::NoPeaksDetected);
        }

        // 1. Energy envelope
        let window_size = self.opts.window_size(sample_rate);
        let energy = window_energies(samples, window_size);

        // 2. Peaks above the adaptive threshold
        let threshold = mean(&energy) * self.opts.threshold_factor;
        let peaks = find_peaks(&energy, threshold);

        // 3. Intervals in window units
        let intervals = peak_intervals(&peaks);
        if intervals.is_empty() {
            return Err(TempoError::NoPeaksDetected);
        }
        let avg_windows = intervals.iter().sum::<usize>() as f64 / intervals.len() as f64;
        let interval_secs = avg_windows * window_size as f64 / sample_rate as f64;

        // 4. Fold into the preferred range
        let raw = 60.0 / interval_secs;
        let bpm = round_to_tenth(fold_bpm(raw, self.opts.min_bpm, self.opts.max_bpm));

        Ok(BpmEstimate {
            bpm,
            peak_count: peaks.len(),
            interval_secs,
            window_size,
        })
    }
}

/// Estimate with the default 50 ms window, 1.5x threshold and 60..180 fold.
pub fn estimate(buffer: &SampleBuffer) -> Result<BpmEstimate> {
    BpmDetector::new(BpmOptions::default()).detect(buffer)
}
