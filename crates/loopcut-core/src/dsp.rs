use tracing::{debug, instrument};

use crate::{audio::AudioBuffer, time::rescale_frames};

#[must_use]
pub fn downmix_mono(buffer: &AudioBuffer) -> AudioBuffer {
    if buffer.channels <= 1 {
        return buffer.clone();
    }

    let channel_count = usize::from(buffer.channels);
    let samples = buffer
        .samples
        .chunks_exact(channel_count)
        .map(|frame| frame.iter().copied().sum::<f32>() / channel_count as f32)
        .collect();

    AudioBuffer {
        channels: 1,
        samples,
        ..buffer.clone_format()
    }
}

// Output holds exactly round(frames * target_rate / source_rate) frames.
#[instrument(skip(buffer), fields(source_rate = buffer.sample_rate, target_rate))]
#[must_use]
pub fn resample_linear(buffer: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    if buffer.sample_rate == target_rate || buffer.sample_rate == 0 || target_rate == 0 {
        return buffer.clone();
    }

    let channels = usize::from(buffer.channels.max(1));
    let input_frames = buffer.frames();
    let output_frames =
        usize::try_from(rescale_frames(input_frames as u64, buffer.sample_rate, target_rate))
            .unwrap_or(0);
    let step = f64::from(buffer.sample_rate) / f64::from(target_rate);

    let mut samples = Vec::with_capacity(output_frames * channels);
    if input_frames > 0 {
        let last = input_frames - 1;
        for frame in 0..output_frames {
            let position = frame as f64 * step;
            let index = (position.floor() as usize).min(last);
            let next = (index + 1).min(last);
            let fraction = (position - index as f64).clamp(0.0, 1.0) as f32;
            for channel in 0..channels {
                let a = buffer.samples[index * channels + channel];
                let b = buffer.samples[next * channels + channel];
                samples.push(a + (b - a) * fraction);
            }
        }
    }

    debug!(input_frames, output_frames, "resample complete");
    AudioBuffer {
        sample_rate: target_rate,
        samples,
        ..buffer.clone_format()
    }
}

pub fn scale_in_place(samples: &mut [f32], factor: f32) {
    for sample in samples {
        *sample = (*sample * factor).clamp(-1.0, 1.0);
    }
}

#[must_use]
pub fn repeat(buffer: &AudioBuffer, times: usize) -> AudioBuffer {
    AudioBuffer {
        samples: buffer.samples.repeat(times),
        ..buffer.clone_format()
    }
}

#[must_use]
pub fn quantize_i16(sample: f32) -> i16 {
    (sample * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16
}

#[must_use]
pub fn to_s16le_bytes(buffer: &AudioBuffer) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(buffer.samples.len() * 2);
    for sample in &buffer.samples {
        bytes.extend_from_slice(&quantize_i16(*sample).to_le_bytes());
    }
    bytes
}
