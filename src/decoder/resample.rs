// src/decoder/resample.rs

use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::decoder::dsp;
use crate::error::{Result, TempoError};

const CHUNK_SIZE: usize = 1024;

/// Largest factor a running resampler may be retuned by in either direction.
/// Covers the whole 0.5..2.0 tempo by -12..+12 semitone parameter space.
pub const MAX_RELATIVE_RATIO: f64 = 16.0;

pub fn is_unity(ratio: f64) -> bool {
    (ratio - 1.0).abs() < 1e-12
}

/// `ratio` is output frames per input frame.
pub fn build_resampler(ratio: f64, channels: usize) -> Result<SincFixedIn<f32>> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(TempoError::InvalidParameters(format!("resample ratio {ratio}")));
    }
    let sinc_len = 256usize;
    let window = WindowFunction::BlackmanHarris2;
    let f_cutoff = calculate_cutoff(sinc_len, window);
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    SincFixedIn::<f32>::new(ratio, MAX_RELATIVE_RATIO, params, CHUNK_SIZE, channels.max(1))
        .map_err(|e| TempoError::RenderFailure(e.to_string()))
}

/// Feed exactly one chunk starting at `*cursor` if enough input remains.
pub fn try_process_exact(
    resampler: &mut SincFixedIn<f32>,
    input: &[Vec<f32>],
    cursor: &mut usize,
) -> Result<Option<Vec<Vec<f32>>>> {
    let need = resampler.input_frames_next();
    let have = dsp::planar_len(input).saturating_sub(*cursor);
    if have < need {
        return Ok(None);
    }
    let block = dsp::planar_window(input, *cursor, need);
    let out = resampler
        .process(&block, None)
        .map_err(|e| TempoError::RenderFailure(e.to_string()))?;
    *cursor += need;
    Ok(Some(out))
}

/// Feed whatever is left after the last full chunk (zero-padded by rubato).
pub fn process_remaining(
    resampler: &mut SincFixedIn<f32>,
    input: &[Vec<f32>],
    cursor: &mut usize,
) -> Result<Option<Vec<Vec<f32>>>> {
    let have = dsp::planar_len(input).saturating_sub(*cursor);
    if have == 0 {
        return Ok(None);
    }
    let block = dsp::planar_window(input, *cursor, have);
    let out = resampler
        .process_partial(Some(block.as_slice()), None)
        .map_err(|e| TempoError::RenderFailure(e.to_string()))?;
    *cursor += have;
    Ok(Some(out))
}

/// Push silence through to drain the filter's delay line.
pub fn flush(resampler: &mut SincFixedIn<f32>) -> Result<Vec<Vec<f32>>> {
    resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| TempoError::RenderFailure(e.to_string()))
}

/// One-shot resample of a whole planar signal. The filter delay is trimmed so
/// output frame 0 lines up with input frame 0, and exactly
/// `ceil(len * ratio)` frames come back.
pub fn resample_planar(input: &[Vec<f32>], ratio: f64) -> Result<Vec<Vec<f32>>> {
    let channels = input.len();
    let in_len = dsp::planar_len(input);
    let expected = (in_len as f64 * ratio).ceil() as usize;
    if in_len == 0 || channels == 0 {
        return Ok(vec![Vec::new(); channels]);
    }

    let mut resampler = build_resampler(ratio, channels)?;
    let delay = resampler.output_delay();
    let target = delay + expected;

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(target); channels];
    let mut cursor = 0usize;

    while let Some(block) = try_process_exact(&mut resampler, input, &mut cursor)? {
        append(&mut out, block);
    }
    if let Some(block) = process_remaining(&mut resampler, input, &mut cursor)? {
        append(&mut out, block);
    }

    let mut guard = 0usize;
    while dsp::planar_len(&out) < target {
        let block = flush(&mut resampler)?;
        if block.first().map_or(true, |b| b.is_empty()) || guard > 64 {
            break;
        }
        append(&mut out, block);
        guard += 1;
    }

    for ch in out.iter_mut() {
        ch.drain(..delay.min(ch.len()));
        ch.resize(expected, 0.0);
    }
    Ok(out)
}

fn append(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (dst, src) in out.iter_mut().zip(block) {
        dst.extend_from_slice(&src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn output_length_follows_ratio() {
        let input = vec![sine(220.0, 8000, 4000)];
        let half = resample_planar(&input, 0.5).unwrap();
        assert_eq!(half[0].len(), 2000);
        let double = resample_planar(&input, 2.0).unwrap();
        assert_eq!(double[0].len(), 8000);
    }

    #[test]
    fn delay_is_trimmed() {
        // a slow sine survives 2x upsampling in phase: compare against the
        // analytic signal at the new rate away from the edges
        let input = vec![sine(100.0, 8000, 8000)];
        let out = resample_planar(&input, 2.0).unwrap();
        let reference = sine(100.0, 16000, 16000);
        for i in 2000..14000 {
            assert!((out[0][i] - reference[i]).abs() < 0.05, "frame {i}");
        }
    }

    #[test]
    fn rejects_bad_ratio() {
        assert!(build_resampler(0.0, 1).is_err());
        assert!(build_resampler(f64::NAN, 2).is_err());
    }
}
