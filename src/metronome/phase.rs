// src/metronome/phase.rs

use std::sync::atomic::{AtomicU64, Ordering};

pub const BEATS_PER_BAR: u32 = 4;

/// Anything that can report the current beat shift. The scheduler asks again
/// on every tick, so changes land on the next click.
pub trait OffsetProvider: Send + Sync {
    fn current_offset(&self) -> f64;
}

/// Downbeat test: `(beat + offset + 4) mod 4 == 0`, floating-point remainder.
/// Fractional offsets never accent.
pub fn is_accented_at(beat: i64, offset: f64) -> bool {
    (beat as f64 + offset + BEATS_PER_BAR as f64) % BEATS_PER_BAR as f64 == 0.0
}

/// Beat shift shared between the control surface and the metronome.
/// Stored as f64 bits so readers never block.
#[derive(Debug)]
pub struct BeatPhase {
    offset_bits: AtomicU64,
}

impl Default for BeatPhase {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl BeatPhase {
    pub fn new(offset: f64) -> Self {
        Self {
            offset_bits: AtomicU64::new(offset.to_bits()),
        }
    }

    pub fn offset(&self) -> f64 {
        f64::from_bits(self.offset_bits.load(Ordering::Relaxed))
    }

    pub fn set_offset(&self, value: f64) {
        self.offset_bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Add `delta` (±1 or ±0.25 from the usual controls) and return the new
    /// offset. No clamping.
    pub fn adjust_offset(&self, delta: f64) -> f64 {
        let prev = self
            .offset_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f64::from_bits(prev) + delta
    }

    pub fn is_accented(&self, beat: i64) -> bool {
        is_accented_at(beat, self.offset())
    }

    /// The shift expressed in seconds at `bpm` (e.g. 1 beat at 120 BPM -> 0.5s).
    pub fn shift_seconds(&self, bpm: f64) -> f64 {
        self.offset() * 60.0 / bpm
    }
}

impl OffsetProvider for BeatPhase {
    fn current_offset(&self) -> f64 {
        self.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn zero_offset_accents_beat_zero() {
        let phase = BeatPhase::default();
        let accents: Vec<bool> = (0..8).map(|b| phase.is_accented(b)).collect();
        assert_eq!(accents, vec![true, false, false, false, true, false, false, false]);
    }

    #[test]
    fn shifting_back_one_moves_accent_to_beat_one() {
        let phase = BeatPhase::new(-1.0);
        assert!(!phase.is_accented(0));
        assert!(phase.is_accented(1));
        assert!(!phase.is_accented(2));
    }

    #[test]
    fn accent_repeats_every_four_beats_and_offsets() {
        for offset in [-3.0, -1.0, 0.0, 2.0, 0.25] {
            for beat in -8i64..8 {
                assert_eq!(is_accented_at(beat, offset), is_accented_at(beat + 4, offset));
                assert_eq!(is_accented_at(beat, offset), is_accented_at(beat, offset + 4.0));
            }
        }
    }

    #[test]
    fn quarter_offsets_never_accent() {
        let phase = BeatPhase::new(0.25);
        assert!((0..16).all(|b| !phase.is_accented(b)));
    }

    #[test]
    fn adjustments_accumulate_without_bounds() {
        let phase = BeatPhase::default();
        assert_eq!(phase.adjust_offset(1.0), 1.0);
        assert_eq!(phase.adjust_offset(0.25), 1.25);
        assert_eq!(phase.adjust_offset(-0.25), 1.0);
        for _ in 0..10 {
            phase.adjust_offset(1.0);
        }
        assert_eq!(phase.offset(), 11.0);
        // 11 + 1 + 4 = 16
        assert!(phase.is_accented(1));
        phase.set_offset(-8.0);
        assert!(phase.is_accented(0));
    }

    #[test]
    fn shift_in_seconds_follows_tempo() {
        let phase = BeatPhase::new(1.0);
        assert!((phase.shift_seconds(120.0) - 0.5).abs() < 1e-12);
        phase.set_offset(-0.5);
        assert!((phase.shift_seconds(60.0) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn concurrent_adjustments_are_not_lost() {
        let phase = Arc::new(BeatPhase::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = phase.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        p.adjust_offset(0.25);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(phase.offset(), 1000.0);
    }
}
