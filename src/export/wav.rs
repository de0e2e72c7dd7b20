// src/export/wav.rs

use hound::{SampleFormat, WavReader};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use crate::buffer::SampleBuffer;
use crate::error::{Result, TempoError};

pub const WAV_HEADER_LEN: usize = 44;
const BYTES_PER_SAMPLE: usize = 2;

/// An encoded 16-bit linear PCM WAV, produced by one offline render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedClip {
    bytes: Vec<u8>,
    sample_rate: u32,
    channels: u16,
    frames: usize,
}

impl RenderedClip {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn decode(&self) -> Result<SampleBuffer> {
        decode_wav(&self.bytes)
    }
}

/// Clip to [-1, 1] then scale asymmetrically so both -1.0 and 1.0 land on
/// the extremes of i16.
#[inline]
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

#[inline]
pub fn pcm16_to_float(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

pub fn encode_wav(buffer: &SampleBuffer) -> Result<RenderedClip> {
    let channels = buffer.channel_count();
    let frames = buffer.len();
    let sample_rate = buffer.sample_rate();

    let channels_u16 = u16::try_from(channels)
        .map_err(|_| TempoError::InvalidParameters(format!("{channels} channels")))?;
    let data_len = frames
        .checked_mul(channels * BYTES_PER_SAMPLE)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| n.checked_add(36).is_some())
        .ok_or_else(|| TempoError::InvalidParameters("clip too long for a WAV container".into()))?;
    let byte_rate = sample_rate
        .checked_mul(channels as u32 * BYTES_PER_SAMPLE as u32)
        .ok_or_else(|| TempoError::InvalidParameters(format!("sample rate {sample_rate}")))?;
    let block_align = channels_u16 * BYTES_PER_SAMPLE as u16;

    let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels_u16.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    let planar = buffer.channels();
    for f in 0..frames {
        for ch in planar {
            bytes.extend_from_slice(&float_to_pcm16(ch[f]).to_le_bytes());
        }
    }

    Ok(RenderedClip {
        bytes,
        sample_rate,
        channels: channels_u16,
        frames,
    })
}

/// Read a 16-bit PCM WAV back into floats with the inverse of
/// [`float_to_pcm16`]'s scaling.
pub fn decode_wav(bytes: &[u8]) -> Result<SampleBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| TempoError::DecodeFailure(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(TempoError::DecodeFailure(format!(
            "expected 16-bit integer PCM, got {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }
    let channels = spec.channels as usize;
    let interleaved = reader
        .into_samples::<i16>()
        .map(|s| s.map(pcm16_to_float))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| TempoError::DecodeFailure(e.to_string()))?;
    SampleBuffer::from_interleaved(&interleaved, channels, spec.sample_rate)
}
