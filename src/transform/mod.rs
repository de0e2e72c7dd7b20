// src/transform/mod.rs

pub mod feed;
pub mod live;
pub mod offline;
pub mod params;

pub use live::{LiveCmd, LivePlayback, LiveVoice};
pub use offline::{render, render_async, render_buffer};
pub use params::PitchTempoParams;
