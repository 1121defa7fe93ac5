pub mod audio;
pub mod clip;
pub mod config;
pub mod diagnostics;
pub mod dsp;
pub mod export;
pub mod fixtures;
pub mod playback;
pub mod preview;
pub mod session;
pub mod time;

pub use audio::{AudioBuffer, AudioInfo, load_audio_file, load_raw_pcm};
pub use clip::{
    ClipBounds, ClipError, ClipRange, GainAdjustment, RangeFault, slice, slice_with_gain,
};
pub use config::AppConfig;
pub use diagnostics::{TelemetryGuard, init_tracing_with_options};
pub use export::{
    ExportReport, OutputSpec, PAGEFILE_NAME, PATCHED_FIRMWARE_RATE, STOCK_FIRMWARE_RATE,
    convert_pagefile, export_clip,
};
pub use playback::{
    CancelToken, LoopHandle, LoopOutcome, LoopSettings, PlaybackSink, run_loop, spawn_loop,
};
pub use preview::{Preview, PreviewKind, build_preview};
pub use session::{InputKind, Session, SessionError};
