// src/export/mod.rs

pub mod wav;

pub use wav::{decode_wav, encode_wav, RenderedClip, WAV_HEADER_LEN};
