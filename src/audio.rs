// src/audio.rs

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::Consumer;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

/// Default output device and the config it wants to be driven with.
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

pub fn setup_output_device() -> anyhow::Result<OutputConfig> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no output device available")?;
    let supported_config = device
        .default_output_config()
        .context("querying default output config")?;
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::debug!(
        "🔊 Output device: {} ch, {} Hz, {:?}",
        output_channels,
        output_sample_rate,
        sample_format
    );

    Ok(OutputConfig {
        device,
        config,
        sample_format,
        output_channels,
        output_sample_rate,
    })
}

/// Output stream that drains `consumer`. Underruns and pauses play silence;
/// `volume` holds the f32 gain bits. Setting `flush` drops whatever is queued
/// and restarts the played-sample count; the callback clears the flag once done.
pub fn build_stream<T, C>(
    device: Device,
    config: StreamConfig,
    is_playing: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
    samples_played: Arc<AtomicU64>,
    flush: Arc<AtomicBool>,
    mut consumer: C,
    err_fn: fn(cpal::StreamError),
) -> anyhow::Result<Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
    C: Consumer<Item = f32> + Send + 'static,
{
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if flush.load(Ordering::Acquire) {
                    consumer.clear();
                    samples_played.store(0, Ordering::Relaxed);
                    flush.store(false, Ordering::Release);
                }
                let gain = f32::from_bits(volume.load(Ordering::Relaxed));
                if !is_playing.load(Ordering::Relaxed) {
                    data.fill(T::from_sample(0.0f32));
                    return;
                }
                let mut popped = 0u64;
                for out in data.iter_mut() {
                    let s = match consumer.try_pop() {
                        Some(s) => {
                            popped += 1;
                            s
                        }
                        None => 0.0,
                    };
                    *out = T::from_sample(s * gain);
                }
                samples_played.fetch_add(popped, Ordering::Relaxed);
            },
            err_fn,
            None,
        )
        .context("building output stream")?;
    Ok(stream)
}
