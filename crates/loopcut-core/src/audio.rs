use std::{fs::File, io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::{debug, instrument, warn};

use crate::time::{format_mm_ss, frames_to_ms};

// MP3 and other codecs without a bit depth decode to 16-bit PCM.
pub const DEFAULT_BITS_PER_SAMPLE: u16 = 16;

/// Decoded PCM audio.
///
/// Samples are interleaved and normalised to `[-1.0, 1.0]`. Integer sources are scaled by
/// `2^(bits - 1)`, so 16-bit input re-quantises to the exact same values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    #[must_use]
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            bits_per_sample,
            samples,
        }
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        frames_to_ms(self.frames() as u64, self.sample_rate)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .copied()
            .map(f32::abs)
            .fold(0.0_f32, f32::max)
    }

    #[must_use]
    pub fn frame_range(&self, start: usize, end: usize) -> Self {
        let channels = usize::from(self.channels.max(1));
        let end = end.min(self.frames());
        let start = start.min(end);
        Self {
            samples: self.samples[start * channels..end * channels].to_vec(),
            ..self.clone_format()
        }
    }

    #[must_use]
    pub fn clone_format(&self) -> Self {
        Self {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            samples: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioInfo {
    pub format: String,
    pub duration_ms: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioInfo {
    #[must_use]
    pub fn describe(path: &Path, buffer: &AudioBuffer) -> Self {
        let format = path
            .extension()
            .and_then(|value| value.to_str())
            .map_or_else(|| "UNKNOWN".to_string(), str::to_ascii_uppercase);
        Self {
            format,
            duration_ms: buffer.duration_ms(),
            sample_rate: buffer.sample_rate,
            channels: buffer.channels,
            bits_per_sample: buffer.bits_per_sample,
        }
    }

    #[must_use]
    pub fn channel_label(&self) -> &'static str {
        if self.channels > 1 { "Stereo" } else { "Mono" }
    }
}

impl std::fmt::Display for AudioInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Format: {}, Length: {} ms ({}), Sample Rate: {}Hz, Channels: {}, Bit Depth: {}-bit",
            self.format,
            self.duration_ms as u64,
            format_mm_ss(self.duration_ms),
            self.sample_rate,
            self.channel_label(),
            self.bits_per_sample
        )
    }
}

#[instrument(fields(path = %path.display()))]
pub fn load_audio_file(path: &Path) -> Result<AudioBuffer> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognised audio container: {}", path.display()))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default audio track found in {}", path.display()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("unsupported audio codec in {}", path.display()))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut channels = track
        .codec_params
        .channels
        .map_or(2, |value| value.count() as u16);
    let bits_per_sample = track
        .codec_params
        .bits_per_sample
        .and_then(|bits| u16::try_from(bits).ok())
        .unwrap_or(DEFAULT_BITS_PER_SAMPLE);
    let mut samples = Vec::new();
    let mut skipped_packets = 0_usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow::anyhow!(
                    "audio stream reset required for {}",
                    path.display()
                ));
            }
            Err(error) => return Err(error.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped_packets += 1;
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;
        let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buffer.samples());
    }

    if skipped_packets > 0 {
        warn!(skipped_packets, "skipped undecodable packets");
    }

    if samples.is_empty() {
        return Err(anyhow::anyhow!(
            "decoded zero samples from {}",
            path.display()
        ));
    }

    let buffer = AudioBuffer::new(sample_rate, channels, bits_per_sample, samples);
    debug!(
        sample_rate,
        channels,
        bits_per_sample,
        frames = buffer.frames(),
        "audio decode complete"
    );
    Ok(buffer)
}

// Headerless signed 16-bit little-endian mono, the pagefile.sys layout.
#[instrument(fields(path = %path.display(), sample_rate))]
pub fn load_raw_pcm(path: &Path, sample_rate: u32) -> Result<AudioBuffer> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read raw pcm file: {}", path.display()))?;
    if bytes.len() % 2 != 0 {
        warn!(len = bytes.len(), "raw pcm has a trailing odd byte, ignoring it");
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0)
        .collect();
    debug!(frames = samples.len(), "raw pcm read complete");
    Ok(AudioBuffer::new(sample_rate, 1, 16, samples))
}
