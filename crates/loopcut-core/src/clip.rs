use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    audio::AudioBuffer,
    dsp::scale_in_place,
    time::{frames_to_ms, ms_to_frames},
};

// Overrun past the end of the source that is padded with silence instead of rejected.
pub const END_PADDING_TOLERANCE_MS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClipError {
    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid range {start_ms}..{end_ms} ms: {reason}")]
    InvalidRange {
        start_ms: f64,
        end_ms: f64,
        reason: RangeFault,
    },
    #[error("clip end ({end_ms} ms) lies beyond the end of the audio ({duration_ms} ms)")]
    OutOfBounds { end_ms: f64, duration_ms: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RangeFault {
    #[error("end position must be greater than a non-negative start position")]
    NotIncreasing,
    #[error("clip length must be between {min_exclusive_ms} and {max_inclusive_ms} milliseconds, got {length_ms} ms")]
    LengthOutOfBounds {
        length_ms: f64,
        min_exclusive_ms: f64,
        max_inclusive_ms: f64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClipRange {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl ClipRange {
    #[must_use]
    pub fn new(start_ms: f64, end_ms: f64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, ClipError> {
        Ok(Self {
            start_ms: parse_finite("start position", start)?,
            end_ms: parse_finite("end position", end)?,
        })
    }

    #[must_use]
    pub fn length_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }

    pub fn validate(&self, bounds: ClipBounds) -> Result<(), ClipError> {
        let checked = if self.start_ms < 0.0 || self.end_ms <= self.start_ms {
            Err(RangeFault::NotIncreasing)
        } else {
            bounds.check(self.length_ms())
        };
        checked.map_err(|reason| ClipError::InvalidRange {
            start_ms: self.start_ms,
            end_ms: self.end_ms,
            reason,
        })
    }
}

// Accepted clip lengths: (min_exclusive_ms, max_inclusive_ms].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClipBounds {
    pub min_exclusive_ms: f64,
    pub max_inclusive_ms: f64,
}

impl ClipBounds {
    pub const STANDARD: Self = Self {
        min_exclusive_ms: 100.0,
        max_inclusive_ms: 90_000.0,
    };
    // 5 s either side of the splice.
    pub const TRANSITION: Self = Self {
        min_exclusive_ms: 10_000.0,
        max_inclusive_ms: 90_000.0,
    };

    pub fn check(&self, length_ms: f64) -> Result<(), RangeFault> {
        if length_ms > self.min_exclusive_ms && length_ms <= self.max_inclusive_ms {
            Ok(())
        } else {
            Err(RangeFault::LengthOutOfBounds {
                length_ms,
                min_exclusive_ms: self.min_exclusive_ms,
                max_inclusive_ms: self.max_inclusive_ms,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GainAdjustment(pub f64);

impl GainAdjustment {
    pub const UNITY: Self = Self(0.0);

    pub fn parse(text: &str) -> Result<Self, ClipError> {
        if text.trim().is_empty() {
            return Ok(Self::UNITY);
        }
        parse_finite("gain", text).map(Self)
    }

    #[must_use]
    pub fn db(&self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_unity(&self) -> bool {
        self.0 == 0.0
    }

    #[must_use]
    pub fn factor(&self) -> f64 {
        10_f64.powf(self.0 / 20.0)
    }

    pub fn apply(&self, buffer: &mut AudioBuffer) {
        if self.is_unity() {
            return;
        }
        scale_in_place(&mut buffer.samples, self.factor() as f32);
        debug!(gain_db = self.0, "gain applied");
    }
}

#[instrument(skip(buffer), fields(start_ms = range.start_ms, end_ms = range.end_ms))]
pub fn slice(
    buffer: &AudioBuffer,
    range: ClipRange,
    bounds: ClipBounds,
) -> Result<AudioBuffer, ClipError> {
    range.validate(bounds)?;

    let duration_ms = buffer.duration_ms();
    if range.end_ms > duration_ms + END_PADDING_TOLERANCE_MS {
        return Err(ClipError::OutOfBounds {
            end_ms: range.end_ms,
            duration_ms,
        });
    }

    let start = usize::try_from(ms_to_frames(range.start_ms, buffer.sample_rate)).unwrap_or(usize::MAX);
    let end = usize::try_from(ms_to_frames(range.end_ms, buffer.sample_rate)).unwrap_or(usize::MAX);
    let mut clip = buffer.frame_range(start, end);

    let wanted_frames = end.saturating_sub(start);
    let missing_frames = wanted_frames.saturating_sub(clip.frames());
    if missing_frames > 0 {
        warn!(
            missing_frames,
            missing_ms = frames_to_ms(missing_frames as u64, buffer.sample_rate),
            "clip reaches past the source, padding with silence"
        );
        clip.samples
            .resize(wanted_frames * usize::from(clip.channels.max(1)), 0.0);
    }

    debug!(frames = clip.frames(), "clip sliced");
    Ok(clip)
}

pub fn slice_with_gain(
    buffer: &AudioBuffer,
    range: ClipRange,
    bounds: ClipBounds,
    gain: GainAdjustment,
) -> Result<AudioBuffer, ClipError> {
    let mut clip = slice(buffer, range, bounds)?;
    gain.apply(&mut clip);
    Ok(clip)
}

fn parse_finite(field: &'static str, text: &str) -> Result<f64, ClipError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ClipError::InvalidNumber {
            field,
            value: text.to_string(),
        })
}
