// src/bpm/utils.rs

/// Mean absolute amplitude of each `window_size` block. The trailing partial
/// window is still divided by the full `window_size`.
pub fn window_energies(samples: &[f32], window_size: usize) -> Vec<f64> {
    if window_size == 0 {
        return Vec::new();
    }
    samples
        .chunks(window_size)
        .map(|w| w.iter().map(|s| s.abs() as f64).sum::<f64>() / window_size as f64)
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Indices strictly above `threshold` and strictly above both neighbours.
/// The first and last entries never qualify.
pub fn find_peaks(energy: &[f64], threshold: f64) -> Vec<usize> {
    if energy.len() < 3 {
        return Vec::new();
    }
    (1..energy.len() - 1)
        .filter(|&i| {
            let e = energy[i];
            e > threshold && e > energy[i - 1] && e > energy[i + 1]
        })
        .collect()
}

pub fn peak_intervals(peaks: &[usize]) -> Vec<usize> {
    peaks.windows(2).map(|p| p[1] - p[0]).collect()
}

/// Octave-fold into `[min, max]`: double while below, then halve while above.
pub fn fold_bpm(mut bpm: f64, min: f64, max: f64) -> f64 {
    if !bpm.is_finite() || bpm <= 0.0 {
        return bpm;
    }
    while bpm < min {
        bpm *= 2.0;
    }
    while bpm > max {
        bpm /= 2.0;
    }
    bpm
}

pub fn round_to_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
