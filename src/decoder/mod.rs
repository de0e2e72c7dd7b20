// src/decoder/mod.rs

pub mod dsp;
pub mod resample;

use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer as InterleavedBuf;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::buffer::SampleBuffer;
use crate::error::{Result, TempoError};

/// Decode an in-memory encoded file (WAV, MP3, FLAC, OGG, AAC).
/// `extension` is an optional probe hint such as `"mp3"`.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    decode_source(Box::new(Cursor::new(bytes)), hint)
        .map_err(|e| TempoError::DecodeFailure(format!("{e:#}")))
}

pub fn decode_file(path: impl AsRef<Path>) -> Result<SampleBuffer> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TempoError::DecodeFailure(format!("{}: {e}", path.display())))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    decode_source(Box::new(file), hint)
        .map_err(|e| TempoError::DecodeFailure(format!("{}: {e:#}", path.display())))
}

/// Decoding is CPU heavy; run it on the blocking pool so async callers can
/// keep servicing other work.
pub async fn decode_bytes_async(bytes: Vec<u8>, extension: Option<String>) -> Result<SampleBuffer> {
    tokio::task::spawn_blocking(move || decode_bytes(bytes, extension.as_deref()))
        .await
        .map_err(|e| TempoError::Runtime(e.to_string()))?
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> anyhow::Result<SampleBuffer> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("unrecognised container")?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("unsupported codec")?;

    let mut sample_buf: Option<InterleavedBuf<f32>> = None;
    let mut planar: Vec<Vec<f32>> = Vec::new();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break, // end of stream
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count();

        // lock the layout on the first packet that carries audio
        if planar.is_empty() {
            sample_rate = spec.rate;
            planar = vec![Vec::new(); packet_channels];
        }

        if sample_buf.as_ref().map_or(true, |b| b.capacity() < decoded.capacity()) {
            sample_buf = Some(InterleavedBuf::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else { continue };
        buf.copy_interleaved_ref(decoded);

        let channels = planar.len();
        if packet_channels == channels {
            dsp::append_interleaved_to_planar(buf.samples(), &mut planar, channels);
        } else {
            let mixed = dsp::updown_mix_interleaved(buf.samples(), packet_channels, channels);
            dsp::append_interleaved_to_planar(&mixed, &mut planar, channels);
        }
    }

    if planar.is_empty() || dsp::planar_len(&planar) == 0 {
        return Err(anyhow!("stream contained no audio frames"));
    }
    log::debug!(
        "decoded {} frames, {} Hz, {} ch",
        dsp::planar_len(&planar),
        sample_rate,
        planar.len()
    );
    Ok(SampleBuffer::new(planar, sample_rate)?)
}
