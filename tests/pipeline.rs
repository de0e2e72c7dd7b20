// tests/pipeline.rs

use std::sync::Arc;
use std::time::Duration;

use tempo_core::bpm::analyze_bytes;
use tempo_core::decoder::decode_bytes;
use tempo_core::export::decode_wav;
use tempo_core::metronome::render_click_track;
use tempo_core::transform::{render, render_async};
use tempo_core::{
    estimate, encode_wav, AnalysisOutcome, BeatPhase, MetronomeScheduler, PitchTempoParams, SampleBuffer,
    TempoError, TempoHint,
};

const SR: u32 = 44100;

#[test]
fn click_track_round_trips_through_wav_and_estimator() {
    let track = render_click_track(120.0, 0.0, 8.0, SR, 2).unwrap();
    let clip = encode_wav(&track).unwrap();
    assert_eq!(clip.frames(), 8 * SR as usize);
    assert_eq!(clip.duration(), Duration::from_secs(8));

    let decoded = decode_bytes(clip.into_bytes(), Some("wav")).unwrap();
    assert_eq!(decoded.channel_count(), 2);
    assert_eq!(estimate(&decoded).unwrap().bpm, 120.0);
}

#[test]
fn slowed_render_reads_slower() {
    let track = render_click_track(120.0, 0.0, 8.0, SR, 1).unwrap();
    // 0.8x of 120 BPM
    let params = PitchTempoParams::new(0, 0.8).unwrap();
    let clip = render(&track, params).unwrap();
    let slowed = decode_wav(clip.bytes()).unwrap();

    assert_eq!(slowed.len(), params.output_frames(track.len()));
    assert!((slowed.len() as i64 - 441_000).abs() <= 1);
    let bpm = estimate(&slowed).unwrap().bpm;
    assert!((bpm - 96.0).abs() <= 1.0, "got {bpm}");
}

#[test]
fn undecodable_upload_falls_back_to_metadata() {
    let outcome = analyze_bytes(b"this is not audio".repeat(20), None, Some(TempoHint::new(128.0, 31.5))).unwrap();
    match outcome {
        AnalysisOutcome::Fallback(info) => {
            assert_eq!(info.bpm, 128.0);
            assert_eq!(info.offset, 0.1);
        }
        other => panic!("expected fallback, got {other:?}"),
    }

    let err = analyze_bytes(b"this is not audio".repeat(20), None, None).unwrap_err();
    assert!(matches!(err, TempoError::DecodeFailure(_)));
}

#[tokio::test]
async fn async_render_is_deterministic() {
    let src = Arc::new(render_click_track(100.0, 0.0, 3.0, 22050, 2).unwrap());
    let params = PitchTempoParams::with_gain(5, 1.25, 0.9).unwrap();
    let a = render_async(src.clone(), params).await.unwrap();
    let b = render_async(src, params).await.unwrap();
    assert_eq!(a.bytes(), b.bytes());
}

#[tokio::test(start_paused = true)]
async fn metronome_follows_shift_controls() {
    let phase = Arc::new(BeatPhase::default());
    let (metro, mut rx) = MetronomeScheduler::new();
    metro.start(120.0, phase.clone()).unwrap();

    let mut accents = Vec::new();
    for i in 0..8 {
        if i == 3 {
            // downbeat moves to beat 1 from the next bar on
            phase.adjust_offset(-1.0);
        }
        accents.push(rx.recv().await.unwrap().accent);
    }
    metro.stop();
    assert_eq!(accents, vec![true, false, false, false, false, true, false, false]);
}

#[test]
fn empty_buffer_has_nothing_to_estimate() {
    let empty = SampleBuffer::silent(1, 0, SR).unwrap();
    assert!(matches!(estimate(&empty), Err(TempoError::NoPeaksDetected)));
}
