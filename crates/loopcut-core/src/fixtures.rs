use std::path::Path;

use anyhow::{Context, Result};

use crate::audio::AudioBuffer;

// Quantised to 16-bit steps so it survives a WAV round trip unchanged.
#[must_use]
pub fn sine_tone(
    sample_rate: u32,
    channels: u16,
    seconds: f64,
    frequency_hz: f64,
    amplitude: f32,
) -> AudioBuffer {
    let frames = (seconds * f64::from(sample_rate)).round() as usize;
    let channels = channels.max(1);
    let mut samples = Vec::with_capacity(frames * usize::from(channels));
    for frame in 0..frames {
        let phase = frame as f64 / f64::from(sample_rate) * frequency_hz * std::f64::consts::TAU;
        let value = (phase.sin() as f32 * amplitude * 32_768.0).round() / 32_768.0;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    AudioBuffer::new(sample_rate, channels, 16, samples)
}

pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file: {}", path.display()))?;
    for sample in &buffer.samples {
        writer
            .write_sample(crate::dsp::quantize_i16(*sample))
            .context("failed to write wav sample")?;
    }
    writer.finalize().context("failed to finalize wav file")?;
    Ok(())
}
