// src/bpm/mod.rs

pub mod adapter;
pub mod detector;
pub mod utils;

pub use adapter::{analyze_bytes, analyze_file};
pub use detector::{estimate, BpmDetector, BpmEstimate, BpmOptions};
