// src/metronome/mod.rs

pub mod click;
pub mod phase;
pub mod scheduler;

pub use click::{render_click_track, render_click_track_with, synthesize_click, ClickOptions};
pub use phase::{is_accented_at, BeatPhase, OffsetProvider, BEATS_PER_BAR};
pub use scheduler::{ClickEvent, MetronomeScheduler, SchedulerState};
