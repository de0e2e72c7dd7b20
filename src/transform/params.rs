// src/transform/params.rs

use serde::{Deserialize, Serialize};

use crate::error::{Result, TempoError};

pub const MIN_SEMITONES: i32 = -12;
pub const MAX_SEMITONES: i32 = 12;
pub const MIN_TEMPO_RATIO: f64 = 0.5;
pub const MAX_TEMPO_RATIO: f64 = 2.0;

/// Pitch shift, speed and output level for one transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchTempoParams {
    semitones: i32,
    tempo_ratio: f64,
    gain: f32,
}

impl Default for PitchTempoParams {
    fn default() -> Self {
        Self::identity()
    }
}

impl PitchTempoParams {
    pub fn new(semitones: i32, tempo_ratio: f64) -> Result<Self> {
        Self::with_gain(semitones, tempo_ratio, 1.0)
    }

    pub fn with_gain(semitones: i32, tempo_ratio: f64, gain: f32) -> Result<Self> {
        if !(MIN_SEMITONES..=MAX_SEMITONES).contains(&semitones) {
            return Err(TempoError::InvalidParameters(format!(
                "semitones {semitones} outside {MIN_SEMITONES}..={MAX_SEMITONES}"
            )));
        }
        if !(tempo_ratio.is_finite() && (MIN_TEMPO_RATIO..=MAX_TEMPO_RATIO).contains(&tempo_ratio)) {
            return Err(TempoError::InvalidParameters(format!(
                "tempo ratio {tempo_ratio} outside {MIN_TEMPO_RATIO}..={MAX_TEMPO_RATIO}"
            )));
        }
        if !(gain.is_finite() && (0.0..=1.0).contains(&gain)) {
            return Err(TempoError::InvalidParameters(format!("gain {gain} outside 0..=1")));
        }
        Ok(Self { semitones, tempo_ratio, gain })
    }

    pub fn identity() -> Self {
        Self {
            semitones: 0,
            tempo_ratio: 1.0,
            gain: 1.0,
        }
    }

    /// Gain from a 0..=100 volume control.
    pub fn with_volume_percent(self, percent: f32) -> Result<Self> {
        Self::with_gain(self.semitones, self.tempo_ratio, percent / 100.0)
    }

    pub fn semitones(&self) -> i32 {
        self.semitones
    }

    pub fn tempo_ratio(&self) -> f64 {
        self.tempo_ratio
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn detune_cents(&self) -> f64 {
        self.semitones as f64 * 100.0
    }

    /// `2^(cents / 1200)`
    pub fn pitch_ratio(&self) -> f64 {
        2f64.powf(self.detune_cents() / 1200.0)
    }

    /// Speed at which source samples are consumed: tempo and detune both
    /// drive the same resampler, so they multiply.
    pub fn playback_rate(&self) -> f64 {
        self.tempo_ratio * self.pitch_ratio()
    }

    /// Output frames for `input_frames` of source.
    pub fn output_frames(&self, input_frames: usize) -> usize {
        (input_frames as f64 / self.tempo_ratio).floor() as usize
    }

    pub fn is_identity(&self) -> bool {
        self.semitones == 0 && self.tempo_ratio == 1.0 && self.gain == 1.0
    }
}
