// src/transform/live.rs

use anyhow::Context;
use cpal::traits::StreamTrait;
use cpal::{SampleFormat, Stream};
use ringbuf::traits::{Observer, Split};
use ringbuf::HeapRb;
use rubato::{Resampler, SincFixedIn};
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    mpsc::{channel, Receiver, RecvTimeoutError, Sender},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{build_stream, setup_output_device, OutputConfig};
use crate::buffer::SampleBuffer;
use crate::decoder::{dsp, resample};
use crate::error::{Result, TempoError};
use crate::transform::feed::push_blocking;
use crate::transform::params::PitchTempoParams;

const RING_CAPACITY: usize = 131_072;
const MAX_FLUSHES: usize = 64;

/// Pull-based renderer over an in-memory source. Reads the source through a
/// sinc resampler at `(output_rate / source_rate) / playback_rate` and maps
/// its channels onto the output layout. Gain is left to the output stage.
pub struct LiveVoice {
    source: Arc<SampleBuffer>,
    output_channels: usize,
    base_ratio: f64,
    ratio: f64,
    params: PitchTempoParams,
    resampler: SincFixedIn<f32>,
    cursor: usize,
    /// Source frame the current run started from.
    origin: usize,
    /// Source frames covered by what has been emitted since `origin`.
    played: f64,
    /// Output frames the source consumed so far should produce.
    expected: f64,
    emitted: usize,
    skip: usize,
    flushes: usize,
    pending: VecDeque<f32>,
    done: bool,
}

impl LiveVoice {
    pub fn new(
        source: Arc<SampleBuffer>,
        params: PitchTempoParams,
        output_rate: u32,
        output_channels: usize,
    ) -> Result<Self> {
        if output_rate == 0 || output_channels == 0 {
            return Err(TempoError::InvalidParameters(format!(
                "{output_channels} output channels at {output_rate} Hz"
            )));
        }
        let base_ratio = output_rate as f64 / source.sample_rate() as f64;
        let ratio = base_ratio / params.playback_rate();
        let resampler = retuned_resampler(base_ratio, ratio, source.channel_count())?;
        let skip = resampler.output_delay();

        Ok(Self {
            source,
            output_channels,
            base_ratio,
            ratio,
            params,
            resampler,
            cursor: 0,
            origin: 0,
            played: 0.0,
            expected: 0.0,
            emitted: 0,
            skip,
            flushes: 0,
            pending: VecDeque::new(),
            done: false,
        })
    }

    pub fn params(&self) -> PitchTempoParams {
        self.params
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Retune the running resampler; takes effect with the next block.
    pub fn set_params(&mut self, params: PitchTempoParams) -> Result<()> {
        let ratio = self.base_ratio / params.playback_rate();
        self.resampler
            .set_resample_ratio(ratio, true)
            .map_err(|e| TempoError::InvalidParameters(e.to_string()))?;
        self.ratio = ratio;
        self.params = params;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.done && self.pending.is_empty()
    }

    /// Source frame reached by the audio handed out so far.
    pub fn position(&self) -> usize {
        let played = self.origin + self.played.round() as usize;
        played.min(self.source.len())
    }

    /// Restart from source frame `frame` (clamped to the end) with the
    /// current parameters. Queued output is dropped.
    pub fn seek(&mut self, frame: usize) -> Result<()> {
        let frame = frame.min(self.source.len());
        self.resampler = retuned_resampler(self.base_ratio, self.ratio, self.source.channel_count())?;
        self.skip = self.resampler.output_delay();
        self.cursor = frame;
        self.origin = frame;
        self.played = 0.0;
        self.expected = 0.0;
        self.emitted = 0;
        self.flushes = 0;
        self.pending.clear();
        self.done = false;
        Ok(())
    }

    /// Next interleaved block in the output layout, `None` once drained.
    pub fn next_block(&mut self) -> Result<Option<Vec<f32>>> {
        while self.pending.is_empty() && !self.done {
            self.pump()?;
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let block: Vec<f32> = self.pending.drain(..).collect();
        self.advance(block.len());
        Ok(Some(block))
    }

    /// Fill `out` (interleaved) and return how many frames carried audio.
    /// Anything past the end of the source is silence.
    pub fn fill(&mut self, out: &mut [f32]) -> Result<usize> {
        while self.pending.len() < out.len() && !self.done {
            self.pump()?;
        }
        let n = self.pending.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        out[n..].fill(0.0);
        self.advance(n);
        Ok(n / self.output_channels)
    }

    /// Drain everything that is left into one interleaved buffer.
    pub fn render_to_end(&mut self) -> Result<Vec<f32>> {
        let mut out = Vec::new();
        while let Some(block) = self.next_block()? {
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    fn advance(&mut self, samples: usize) {
        let frames = samples / self.output_channels;
        self.played += frames as f64 / self.ratio;
    }

    fn pump(&mut self) -> Result<()> {
        let input = self.source.channels();
        let total = self.source.len();
        let before = self.cursor;

        let block = if let Some(out) = resample::try_process_exact(&mut self.resampler, input, &mut self.cursor)? {
            out
        } else if let Some(out) = resample::process_remaining(&mut self.resampler, input, &mut self.cursor)? {
            out
        } else {
            self.flushes += 1;
            resample::flush(&mut self.resampler)?
        };
        self.expected += (self.cursor - before) as f64 * self.ratio;

        let exhausted = self.cursor >= total;
        let limit = if exhausted {
            self.expected.round() as usize
        } else {
            usize::MAX
        };
        self.accept(block, limit);

        if exhausted && (self.emitted >= limit || self.flushes > MAX_FLUSHES) {
            self.done = true;
        }
        Ok(())
    }

    fn accept(&mut self, block: Vec<Vec<f32>>, limit: usize) {
        let in_ch = block.len();
        let interleaved = dsp::interleave(&block);
        let mapped = dsp::updown_mix_interleaved(&interleaved, in_ch, self.output_channels);

        for frame in mapped.chunks_exact(self.output_channels) {
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if self.emitted >= limit {
                break;
            }
            self.pending.extend(frame.iter().copied());
            self.emitted += 1;
        }
    }
}

/// Built at the unity playback ratio so any later retune stays within bounds.
fn retuned_resampler(base_ratio: f64, ratio: f64, channels: usize) -> Result<SincFixedIn<f32>> {
    let mut resampler = resample::build_resampler(base_ratio, channels)?;
    resampler
        .set_resample_ratio(ratio, false)
        .map_err(|e| TempoError::InvalidParameters(e.to_string()))?;
    Ok(resampler)
}

pub enum LiveCmd {
    SetParams(PitchTempoParams),
    /// Jump to a source frame.
    Seek(usize),
    Stop,
}

/// A `LiveVoice` playing on the default output device.
pub struct LivePlayback {
    stream: Stream,
    feeder: Option<JoinHandle<()>>,
    cmd_tx: Sender<LiveCmd>,
    alive: Arc<AtomicBool>,
    is_playing: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
    samples_played: Arc<AtomicU64>,
    source_sample_rate: u32,
    output_sample_rate: u32,
    output_channels: usize,
}

impl LivePlayback {
    pub fn start(source: Arc<SampleBuffer>, params: PitchTempoParams) -> anyhow::Result<Self> {
        Self::start_at(source, params, Duration::ZERO)
    }

    /// Start playing `at` into the source.
    pub fn start_at(source: Arc<SampleBuffer>, params: PitchTempoParams, at: Duration) -> anyhow::Result<Self> {
        let source_sample_rate = source.sample_rate();

        // --- 1. Output device ---
        let output = setup_output_device()?;
        let output_sample_rate = output.output_sample_rate;
        let output_channels = output.output_channels;

        // --- 2. Voice + ring buffer ---
        let mut voice = LiveVoice::new(source, params, output_sample_rate, output_channels)
            .context("building live voice")?;
        if !at.is_zero() {
            voice
                .seek(frame_at(at, source_sample_rate))
                .context("seeking live voice")?;
        }
        let (producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();

        // --- 3. Shared state ---
        let alive = Arc::new(AtomicBool::new(true));
        let is_playing = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));
        let volume = Arc::new(AtomicU32::new(params.gain().to_bits()));
        let samples_played = Arc::new(AtomicU64::new(0));
        let flush = Arc::new(AtomicBool::new(false));

        // --- 4. Build the stream ---
        let err_fn = |err| log::error!("❌ Output stream error: {}", err);
        let OutputConfig {
            device,
            config,
            sample_format,
            ..
        } = output;
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32, _>(
                device,
                config,
                is_playing.clone(),
                volume.clone(),
                samples_played.clone(),
                flush.clone(),
                consumer,
                err_fn,
            )?,
            SampleFormat::I16 => build_stream::<i16, _>(
                device,
                config,
                is_playing.clone(),
                volume.clone(),
                samples_played.clone(),
                flush.clone(),
                consumer,
                err_fn,
            )?,
            SampleFormat::U16 => build_stream::<u16, _>(
                device,
                config,
                is_playing.clone(),
                volume.clone(),
                samples_played.clone(),
                flush.clone(),
                consumer,
                err_fn,
            )?,
            other => anyhow::bail!("Unsupported sample format: {:?}", other),
        };

        // --- 5. Feeder thread, then play ---
        let (cmd_tx, cmd_rx) = channel();
        let feeder = spawn_feeder(voice, producer, cmd_rx, alive.clone(), finished.clone(), flush);
        if let Err(e) = stream.play() {
            alive.store(false, Ordering::Relaxed);
            let _ = feeder.join();
            return Err(e).context("starting output stream");
        }

        log::info!(
            "▶️ Live transform from {:.2}s: {:+} st, x{:.2}, {} Hz / {} ch out",
            at.as_secs_f64(),
            params.semitones(),
            params.tempo_ratio(),
            output_sample_rate,
            output_channels
        );

        Ok(Self {
            stream,
            feeder: Some(feeder),
            cmd_tx,
            alive,
            is_playing,
            finished,
            volume,
            samples_played,
            source_sample_rate,
            output_sample_rate,
            output_channels,
        })
    }

    /// Rate changes go to the feeder; gain applies immediately.
    pub fn set_params(&self, params: PitchTempoParams) -> anyhow::Result<()> {
        self.volume.store(params.gain().to_bits(), Ordering::Relaxed);
        self.cmd_tx
            .send(LiveCmd::SetParams(params))
            .context("live feeder has exited")?;
        Ok(())
    }

    /// Hold the current position; the device plays silence until `resume`.
    pub fn pause(&self) {
        if self.is_playing.swap(false, Ordering::Relaxed) {
            log::debug!("⏸️ Live transform paused");
        }
    }

    pub fn resume(&self) {
        if !self.is_playing.swap(true, Ordering::Relaxed) {
            log::debug!("▶️ Live transform resumed");
        }
    }

    /// Jump to `to` in the source. Queued audio is dropped and `position`
    /// restarts from zero.
    pub fn seek(&self, to: Duration) -> anyhow::Result<()> {
        self.cmd_tx
            .send(LiveCmd::Seek(frame_at(to, self.source_sample_rate)))
            .context("live feeder has exited")?;
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    /// True once the whole source has been handed to the device.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// Device time played since the start or the last seek.
    pub fn position(&self) -> Duration {
        let samples = self.samples_played.load(Ordering::Relaxed) as f64;
        let frames = samples / self.output_channels as f64;
        Duration::from_secs_f64(frames / self.output_sample_rate as f64)
    }

    /// Silence at once (no fade) and wait for the feeder to exit.
    pub fn stop(&mut self) {
        self.is_playing.store(false, Ordering::Relaxed);
        self.alive.store(false, Ordering::Relaxed);
        let _ = self.cmd_tx.send(LiveCmd::Stop);
        if let Err(e) = self.stream.pause() {
            log::warn!("⚠️ Could not pause output stream: {}", e);
        }
        if let Some(handle) = self.feeder.take() {
            if handle.join().is_err() {
                log::error!("❌ Live feeder panicked");
            }
            log::debug!("⏹️ Live transform stopped");
        }
    }
}

impl Drop for LivePlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame_at(at: Duration, sample_rate: u32) -> usize {
    (at.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Returns `false` on `Stop`.
fn apply_cmd(cmd: LiveCmd, voice: &mut LiveVoice, finished: &AtomicBool, flush: &AtomicBool, alive: &AtomicBool) -> bool {
    match cmd {
        LiveCmd::SetParams(p) => {
            if let Err(e) = voice.set_params(p) {
                log::warn!("⚠️ Rejected live params: {}", e);
            }
        }
        LiveCmd::Seek(frame) => {
            if let Err(e) = voice.seek(frame) {
                log::warn!("⚠️ Seek to frame {} failed: {}", frame, e);
                return true;
            }
            // wait for the callback to drop what was queued before the jump
            flush.store(true, Ordering::Release);
            while alive.load(Ordering::Relaxed) && flush.load(Ordering::Acquire) {
                thread::park_timeout(Duration::from_millis(1));
            }
            finished.store(false, Ordering::Relaxed);
            log::debug!("⏩ Live transform seek to frame {}", frame);
        }
        LiveCmd::Stop => return false,
    }
    true
}

fn spawn_feeder<P>(
    mut voice: LiveVoice,
    mut producer: P,
    cmd_rx: Receiver<LiveCmd>,
    alive: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    flush: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    P: ringbuf::traits::Producer<Item = f32> + Observer + Send + 'static,
{
    thread::spawn(move || {
        while alive.load(Ordering::Relaxed) {
            while let Ok(cmd) = cmd_rx.try_recv() {
                if !apply_cmd(cmd, &mut voice, &finished, &flush, &alive) {
                    return;
                }
            }

            match voice.next_block() {
                Ok(Some(block)) => {
                    if !push_blocking(&mut producer, &block, &alive) {
                        return;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("❌ Live render error: {}", e);
                    // park at the end until a seek
                    if voice.seek(usize::MAX).is_err() {
                        return;
                    }
                }
            }

            // source drained: mark finished once the device has played the
            // queue, then idle until a seek restarts the voice or we stop
            if !finished.load(Ordering::Relaxed) && producer.occupied_len() == 0 {
                finished.store(true, Ordering::Relaxed);
            }
            match cmd_rx.recv_timeout(Duration::from_millis(5)) {
                Ok(cmd) => {
                    if !apply_cmd(cmd, &mut voice, &finished, &flush, &alive) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    })
}
