// src/buffer.rs

use std::time::Duration;

use crate::decoder::dsp;
use crate::error::{Result, TempoError};

/// Decoded PCM held planar: one `Vec<f32>` per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(TempoError::InvalidBuffer("sample rate must be > 0".into()));
        }
        if channels.is_empty() {
            return Err(TempoError::InvalidBuffer("at least one channel required".into()));
        }
        let frames = channels[0].len();
        if let Some(bad) = channels.iter().position(|c| c.len() != frames) {
            return Err(TempoError::InvalidBuffer(format!(
                "channel {} has {} samples, channel 0 has {}",
                bad,
                channels[bad].len(),
                frames
            )));
        }
        Ok(Self { channels, sample_rate })
    }

    /// Silent buffer of `frames` frames.
    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Result<Self> {
        Self::new(vec![vec![0.0; frames]; channel_count], sample_rate)
    }

    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 {
            return Err(TempoError::InvalidBuffer("at least one channel required".into()));
        }
        if samples.len() % channel_count != 0 {
            return Err(TempoError::InvalidBuffer(format!(
                "{} interleaved samples do not divide into {} channels",
                samples.len(),
                channel_count
            )));
        }
        let mut planar = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        dsp::append_interleaved_to_planar(samples, &mut planar, channel_count);
        Self::new(planar, sample_rate)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    pub fn interleaved(&self) -> Vec<f32> {
        dsp::interleave(&self.channels)
    }
}
