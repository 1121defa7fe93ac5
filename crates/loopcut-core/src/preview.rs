use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    audio::AudioBuffer,
    clip::{ClipBounds, ClipError, ClipRange, GainAdjustment, slice},
    dsp::repeat,
    time::{frames_to_ms, ms_to_frames},
};

pub const FULL_LOOP_REPEATS: usize = 3;
pub const TRANSITION_HALF_WINDOW_MS: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    FullLoop,
    Transition,
}

impl PreviewKind {
    #[must_use]
    pub fn bounds(self) -> ClipBounds {
        match self {
            Self::FullLoop => ClipBounds::STANDARD,
            Self::Transition => ClipBounds::TRANSITION,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub kind: PreviewKind,
    pub audio: AudioBuffer,
    pub splice_ms: f64,
}

#[instrument(skip(source), fields(start_ms = range.start_ms, end_ms = range.end_ms, gain_db = gain.db()))]
pub fn build_preview(
    source: &AudioBuffer,
    range: ClipRange,
    gain: GainAdjustment,
    kind: PreviewKind,
) -> Result<Preview, ClipError> {
    match kind {
        PreviewKind::FullLoop => full_loop_preview(source, range, gain),
        PreviewKind::Transition => transition_preview(source, range, gain),
    }
}

pub fn full_loop_preview(
    source: &AudioBuffer,
    range: ClipRange,
    gain: GainAdjustment,
) -> Result<Preview, ClipError> {
    let clip = slice(source, range, ClipBounds::STANDARD)?;
    let splice_ms = clip.duration_ms();
    let mut audio = repeat(&clip, FULL_LOOP_REPEATS);
    gain.apply(&mut audio);

    info!(frames = audio.frames(), splice_ms, "full loop preview built");
    Ok(Preview {
        kind: PreviewKind::FullLoop,
        audio,
        splice_ms,
    })
}

// Ten seconds centred on the point where the clip wraps back to its start.
pub fn transition_preview(
    source: &AudioBuffer,
    range: ClipRange,
    gain: GainAdjustment,
) -> Result<Preview, ClipError> {
    let mut clip = slice(source, range, ClipBounds::TRANSITION)?;
    gain.apply(&mut clip);
    let doubled = repeat(&clip, 2);

    let rate = doubled.sample_rate;
    let loop_point = clip.frames();
    let half_window = usize::try_from(ms_to_frames(TRANSITION_HALF_WINDOW_MS, rate)).unwrap_or(0);
    let window_start = loop_point.saturating_sub(half_window);
    let window_end = (loop_point + half_window).min(doubled.frames());
    let audio = doubled.frame_range(window_start, window_end);
    let splice_ms = frames_to_ms((loop_point - window_start) as u64, rate);

    info!(
        loop_point_ms = frames_to_ms(loop_point as u64, rate),
        window_start_ms = frames_to_ms(window_start as u64, rate),
        window_end_ms = frames_to_ms(window_end as u64, rate),
        "transition preview built"
    );
    Ok(Preview {
        kind: PreviewKind::Transition,
        audio,
        splice_ms,
    })
}
