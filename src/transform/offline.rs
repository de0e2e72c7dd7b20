// src/transform/offline.rs

use std::sync::Arc;
use std::time::Instant;

use crate::buffer::SampleBuffer;
use crate::decoder::{dsp, resample};
use crate::error::{Result, TempoError};
use crate::export::wav::{encode_wav, RenderedClip};
use crate::transform::params::PitchTempoParams;

/// Render the whole buffer through the transform. The result has
/// `floor(len / tempo_ratio)` frames at the source sample rate; anything the
/// resampler does not fill is silence.
pub fn render_buffer(buffer: &SampleBuffer, params: PitchTempoParams) -> Result<SampleBuffer> {
    let out_len = params.output_frames(buffer.len());
    let rate = params.playback_rate();

    let mut channels = if resample::is_unity(rate) {
        buffer.channels().to_vec()
    } else {
        resample::resample_planar(buffer.channels(), 1.0 / rate)?
    };

    for ch in channels.iter_mut() {
        ch.resize(out_len, 0.0);
    }
    dsp::apply_gain(&mut channels, params.gain());

    SampleBuffer::new(channels, buffer.sample_rate())
}

/// Render and encode to a 16-bit WAV.
pub fn render(buffer: &SampleBuffer, params: PitchTempoParams) -> Result<RenderedClip> {
    let started = Instant::now();
    let rendered = render_buffer(buffer, params)?;
    let clip = encode_wav(&rendered)?;
    log::info!(
        "💾 Rendered {:.2}s -> {:.2}s ({:+} st, x{:.2}) in {:.2?}",
        buffer.duration_secs(),
        rendered.duration_secs(),
        params.semitones(),
        params.tempo_ratio(),
        started.elapsed()
    );
    Ok(clip)
}

/// [`render`] on the blocking pool.
pub async fn render_async(buffer: Arc<SampleBuffer>, params: PitchTempoParams) -> Result<RenderedClip> {
    tokio::task::spawn_blocking(move || render(&buffer, params))
        .await
        .map_err(|e| TempoError::Runtime(e.to_string()))?
}
