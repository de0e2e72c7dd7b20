// src/metronome/scheduler.rs

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{Result, TempoError};
use crate::metronome::phase::{is_accented_at, OffsetProvider, BEATS_PER_BAR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClickEvent {
    /// Position in the bar, 0..=3.
    pub beat: u32,
    pub accent: bool,
    /// Time since `start`.
    pub at: Duration,
}

struct Shared {
    state: SchedulerState,
    /// Bumped on every start and stop; a tick from an older run is ignored.
    run_id: u64,
    interval: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

/// Emits one `ClickEvent` per beat while running. Events go out on the
/// channel returned by [`MetronomeScheduler::new`].
pub struct MetronomeScheduler {
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<ClickEvent>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetronomeScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClickEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            state: SchedulerState::Stopped,
            run_id: 0,
            interval: None,
            task: None,
        };
        (
            Self {
                shared: Arc::new(Mutex::new(shared)),
                events: tx,
            },
            rx,
        )
    }

    /// Click immediately on beat 0, then every `60 / bpm` seconds. Does
    /// nothing if already running. Must be called from within a Tokio runtime.
    pub fn start(&self, bpm: f64, offset: Arc<dyn OffsetProvider>) -> Result<()> {
        let period = beat_period(bpm)?;
        let handle = Handle::try_current().map_err(|e| TempoError::Runtime(e.to_string()))?;

        let mut shared = lock(&self.shared);
        if shared.state == SchedulerState::Running {
            return Ok(());
        }

        let started = Instant::now();
        let first_tick = started
            .checked_add(period)
            .ok_or_else(|| TempoError::InvalidParameters(format!("bpm {bpm}: beat period {period:?} out of range")))?;
        shared.run_id += 1;
        shared.state = SchedulerState::Running;
        shared.interval = Some(period);
        let run_id = shared.run_id;

        let first = ClickEvent {
            beat: 0,
            accent: is_accented_at(0, offset.current_offset()),
            at: Duration::ZERO,
        };
        let _ = self.events.send(first);

        let tx = self.events.clone();
        let state = self.shared.clone();
        shared.task = Some(handle.spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut beat = 0u32;
            loop {
                ticker.tick().await;
                beat = (beat + 1) % BEATS_PER_BAR;
                if !emit_tick(&state, run_id, beat, started, offset.as_ref(), &tx) {
                    break;
                }
            }
        }));

        log::debug!("🥁 Metronome started at {:.1} BPM ({:?} per beat)", bpm, period);
        Ok(())
    }

    /// Idempotent. No event is emitted after this returns.
    pub fn stop(&self) {
        let mut shared = lock(&self.shared);
        shared.run_id += 1;
        let was_running = shared.state == SchedulerState::Running;
        shared.state = SchedulerState::Stopped;
        if let Some(task) = shared.task.take() {
            task.abort();
        }
        if was_running {
            log::debug!("🛑 Metronome stopped");
        }
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.shared).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Beat period of the current (or last) run.
    pub fn interval(&self) -> Option<Duration> {
        lock(&self.shared).interval
    }
}

/// `60 / bpm` seconds; the timer cannot run on a zero or unrepresentable period.
fn beat_period(bpm: f64) -> Result<Duration> {
    if !(bpm.is_finite() && bpm > 0.0) {
        return Err(TempoError::InvalidParameters(format!("bpm {bpm}")));
    }
    match Duration::try_from_secs_f64(60.0 / bpm) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(TempoError::InvalidParameters(format!("bpm {bpm}: no usable beat period"))),
    }
}

/// Emission happens under the same lock `stop` takes.
fn emit_tick(
    shared: &Mutex<Shared>,
    run_id: u64,
    beat: u32,
    started: Instant,
    offset: &dyn OffsetProvider,
    tx: &mpsc::UnboundedSender<ClickEvent>,
) -> bool {
    let guard = lock(shared);
    if guard.run_id != run_id || guard.state != SchedulerState::Running {
        return false;
    }
    let event = ClickEvent {
        beat,
        accent: is_accented_at(beat as i64, offset.current_offset()),
        at: started.elapsed(),
    };
    tx.send(event).is_ok()
}

impl Drop for MetronomeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metronome::phase::BeatPhase;
    use tokio::sync::mpsc::error::TryRecvError;

    fn phase(offset: f64) -> Arc<BeatPhase> {
        Arc::new(BeatPhase::new(offset))
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_every_interval_with_downbeat_accent() {
        let (metro, mut rx) = MetronomeScheduler::new();
        metro.start(120.0, phase(0.0)).unwrap();
        assert!(metro.is_running());
        assert_eq!(metro.interval(), Some(Duration::from_millis(500)));

        let mut events = Vec::new();
        for _ in 0..8 {
            events.push(rx.recv().await.unwrap());
        }
        let beats: Vec<u32> = events.iter().map(|e| e.beat).collect();
        let accents: Vec<bool> = events.iter().map(|e| e.accent).collect();
        assert_eq!(beats, vec![0, 1, 2, 3, 0, 1, 2, 3]);
        assert_eq!(accents, vec![true, false, false, false, true, false, false, false]);
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.at, Duration::from_millis(500 * i as u64));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn offset_change_applies_on_next_tick() {
        let (metro, mut rx) = MetronomeScheduler::new();
        let beat_phase = phase(0.0);
        metro.start(120.0, beat_phase.clone()).unwrap();

        let first = rx.recv().await.unwrap();
        assert!(first.accent);
        beat_phase.adjust_offset(-1.0);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.beat, 1);
        assert!(second.accent);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_emitted_after_stop() {
        let (metro, mut rx) = MetronomeScheduler::new();
        metro.start(240.0, phase(0.0)).unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        metro.stop();
        metro.stop();
        assert_eq!(metro.state(), SchedulerState::Stopped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_running_is_ignored() {
        let (metro, mut rx) = MetronomeScheduler::new();
        metro.start(120.0, phase(0.0)).unwrap();
        metro.start(60.0, phase(0.0)).unwrap();
        assert_eq!(metro.interval(), Some(Duration::from_millis(500)));
        assert_eq!(rx.try_recv().unwrap().beat, 0);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_begins_again_at_beat_zero() {
        let (metro, mut rx) = MetronomeScheduler::new();
        metro.start(120.0, phase(0.0)).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().beat, 1);
        metro.stop();

        metro.start(80.0, phase(0.0)).unwrap();
        let first = rx.try_recv().unwrap();
        assert_eq!(first.beat, 0);
        assert_eq!(first.at, Duration::ZERO);
        assert_eq!(rx.recv().await.unwrap().at, Duration::from_millis(750));
    }

    #[tokio::test]
    async fn rejects_bad_bpm() {
        let (metro, _rx) = MetronomeScheduler::new();
        for bpm in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            let err = metro.start(bpm, phase(0.0)).unwrap_err();
            assert!(matches!(err, TempoError::InvalidParameters(_)));
        }
        assert!(!metro.is_running());
    }

    #[tokio::test]
    async fn rejects_bpm_without_a_usable_period() {
        let (metro, mut rx) = MetronomeScheduler::new();
        // 1e12 and MAX round to a zero period, 1e-300 overflows Duration,
        // 6e-18 fits Duration but not an Instant deadline
        for bpm in [1e12, f64::MAX, 1e-300, f64::MIN_POSITIVE, 6e-18] {
            let err = metro.start(bpm, phase(0.0)).unwrap_err();
            assert!(matches!(err, TempoError::InvalidParameters(_)), "bpm {bpm}: {err:?}");
            assert_eq!(metro.state(), SchedulerState::Stopped);
            assert_eq!(metro.interval(), None);
        }
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        // still usable afterwards
        metro.start(120.0, phase(0.0)).unwrap();
        assert_eq!(rx.try_recv().unwrap().beat, 0);
        metro.stop();
    }

    #[test]
    fn beat_period_bounds() {
        assert_eq!(beat_period(60.0).unwrap(), Duration::from_secs(1));
        assert_eq!(beat_period(1.0).unwrap(), Duration::from_secs(60));
        assert!(beat_period(1e12).is_err());
        assert!(beat_period(1e-300).is_err());
    }

    #[test]
    fn requires_a_runtime() {
        let (metro, _rx) = MetronomeScheduler::new();
        let err = metro.start(120.0, phase(0.0)).unwrap_err();
        assert!(matches!(err, TempoError::Runtime(_)));
        assert_eq!(metro.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_stops_the_clock() {
        let (metro, mut rx) = MetronomeScheduler::new();
        metro.start(120.0, phase(0.0)).unwrap();
        drop(metro);
        assert_eq!(rx.recv().await.unwrap().beat, 0);
        assert!(rx.recv().await.is_none());
    }
}
