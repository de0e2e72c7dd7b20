// src/metronome/click.rs

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::error::{Result, TempoError};
use crate::metronome::phase::{is_accented_at, BEATS_PER_BAR};

pub const ACCENT_FREQ_HZ: f64 = 1000.0;
pub const BEAT_FREQ_HZ: f64 = 700.0;
pub const CLICK_GAIN: f32 = 0.2;
pub const CLICK_SECS: f64 = 0.05;

/// Levels for an offline click track. Accents play at
/// `volume * accent_volume`, plain beats at `volume` and the off-beat clicks
/// halfway between beats at `volume * offbeat_volume` with the plain timbre.
/// An `offbeat_volume` of 0 leaves the off-beats out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickOptions {
    pub volume: f32,
    pub accent_volume: f32,
    pub offbeat_volume: f32,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            volume: CLICK_GAIN,
            accent_volume: 1.0,
            offbeat_volume: 0.0,
        }
    }
}

impl ClickOptions {
    pub fn validate(&self) -> Result<()> {
        let levels = [
            ("volume", self.volume),
            ("accent volume", self.accent_volume),
            ("off-beat volume", self.offbeat_volume),
        ];
        for (name, level) in levels {
            if !(level.is_finite() && level >= 0.0) {
                return Err(TempoError::InvalidParameters(format!("{name} {level}")));
            }
        }
        Ok(())
    }

    fn accent_gain(&self) -> f32 {
        self.volume * self.accent_volume
    }

    fn offbeat_gain(&self) -> f32 {
        self.volume * self.offbeat_volume
    }
}

fn square_wave(freq: f64, gain: f32, sample_rate: u32) -> Vec<f32> {
    let len = (CLICK_SECS * sample_rate as f64).round() as usize;
    (0..len)
        .map(|n| {
            let cycle = (n as f64 * freq / sample_rate as f64).fract();
            if cycle < 0.5 { gain } else { -gain }
        })
        .collect()
}

/// 50 ms square wave, higher pitched on the downbeat.
pub fn synthesize_click(accent: bool, sample_rate: u32) -> Vec<f32> {
    let freq = if accent { ACCENT_FREQ_HZ } else { BEAT_FREQ_HZ };
    square_wave(freq, CLICK_GAIN, sample_rate)
}

fn mix_at(track: &mut [f32], start: usize, click: &[f32]) {
    if start >= track.len() {
        return;
    }
    let end = (start + click.len()).min(track.len());
    for (dst, src) in track[start..end].iter_mut().zip(click) {
        *dst += *src;
    }
}

/// Offline click stem at the reference levels: one click per beat at
/// `i * 60 / bpm`, accented where the beat shift puts the downbeat. Every
/// channel carries the same signal.
pub fn render_click_track(
    bpm: f64,
    offset: f64,
    duration_secs: f64,
    sample_rate: u32,
    channels: usize,
) -> Result<SampleBuffer> {
    render_click_track_with(bpm, offset, duration_secs, sample_rate, channels, &ClickOptions::default())
}

pub fn render_click_track_with(
    bpm: f64,
    offset: f64,
    duration_secs: f64,
    sample_rate: u32,
    channels: usize,
    opts: &ClickOptions,
) -> Result<SampleBuffer> {
    if !(bpm.is_finite() && bpm > 0.0) {
        return Err(TempoError::InvalidParameters(format!("bpm {bpm}")));
    }
    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(TempoError::InvalidParameters(format!("duration {duration_secs}")));
    }
    if sample_rate == 0 || channels == 0 {
        return Err(TempoError::InvalidParameters(format!(
            "{channels} channels at {sample_rate} Hz"
        )));
    }
    opts.validate()?;

    let frames = (duration_secs * sample_rate as f64).round() as usize;
    let mut track = vec![0.0f32; frames];
    let accent = square_wave(ACCENT_FREQ_HZ, opts.accent_gain(), sample_rate);
    let plain = square_wave(BEAT_FREQ_HZ, opts.volume, sample_rate);
    let offbeat = (opts.offbeat_volume > 0.0).then(|| square_wave(BEAT_FREQ_HZ, opts.offbeat_gain(), sample_rate));
    let beat_frames = 60.0 / bpm * sample_rate as f64;

    let mut i = 0u64;
    loop {
        let start = (i as f64 * beat_frames).round() as usize;
        if start >= frames {
            break;
        }
        let beat = (i % BEATS_PER_BAR as u64) as i64;
        let click = if is_accented_at(beat, offset) { &accent } else { &plain };
        mix_at(&mut track, start, click);
        if let Some(off) = &offbeat {
            mix_at(&mut track, ((i as f64 + 0.5) * beat_frames).round() as usize, off);
        }
        i += 1;
    }

    log::debug!("🥁 Rendered {} clicks over {:.2}s at {:.1} BPM", i, duration_secs, bpm);
    SampleBuffer::new(vec![track; channels], sample_rate)
}
