#[must_use]
pub fn ms_to_frames(ms: f64, sample_rate: u32) -> u64 {
    if ms <= 0.0 || sample_rate == 0 {
        return 0;
    }

    (ms * f64::from(sample_rate) / 1000.0).round() as u64
}

#[must_use]
pub fn frames_to_ms(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    frames as f64 * 1000.0 / f64::from(sample_rate)
}

#[must_use]
pub fn rescale_frames(frames: u64, source_rate: u32, target_rate: u32) -> u64 {
    if source_rate == 0 {
        return 0;
    }

    (frames as f64 * f64::from(target_rate) / f64::from(source_rate)).round() as u64
}

// Truncates partial seconds.
#[must_use]
pub fn format_mm_ss(ms: f64) -> String {
    let total_seconds = if ms.is_finite() && ms > 0.0 {
        (ms / 1000.0) as u64
    } else {
        0
    };
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}
