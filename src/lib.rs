// src/lib.rs

pub mod analysis;
pub mod audio;
pub mod bpm;
pub mod buffer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod export;
pub mod metronome;
pub mod transform;

pub use analysis::{AnalysisClient, AnalysisOutcome, TempoAnalyzer, TempoHint, TempoInfo};
pub use bpm::{estimate, BpmDetector, BpmEstimate, BpmOptions};
pub use buffer::SampleBuffer;
pub use config::AnalysisConfig;
pub use error::{Result, TempoError};
pub use export::{encode_wav, RenderedClip};
pub use metronome::{BeatPhase, ClickEvent, ClickOptions, MetronomeScheduler, OffsetProvider, SchedulerState};
pub use transform::{LivePlayback, LiveVoice, PitchTempoParams};
