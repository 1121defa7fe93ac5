use std::{
    ffi::OsString,
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    audio::{AudioBuffer, load_raw_pcm},
    dsp::{downmix_mono, quantize_i16, resample_linear, to_s16le_bytes},
};

/// Playback rate of the stock firmware. It runs its BGM clock slow, so audio
/// meant to sound right at 22050 Hz is written at this rate instead.
pub const STOCK_FIRMWARE_RATE: u32 = 21_560;
pub const PATCHED_FIRMWARE_RATE: u32 = 22_050;
pub const PAGEFILE_NAME: &str = "pagefile.sys";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputSpec {
    PagefileStock,
    PagefilePatched,
    Wav,
    Mp3,
}

impl OutputSpec {
    #[must_use]
    pub fn target_rate(self) -> Option<u32> {
        match self {
            Self::PagefileStock => Some(STOCK_FIRMWARE_RATE),
            Self::PagefilePatched => Some(PATCHED_FIRMWARE_RATE),
            Self::Wav | Self::Mp3 => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::PagefileStock | Self::PagefilePatched => "sys",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::PagefileStock => "Default pagefile.sys file",
            Self::PagefilePatched => "22050hz pagefile.sys file",
            Self::Wav => "WAV file",
            Self::Mp3 => "MP3 file",
        }
    }

    // `.sys` maps to the stock rate.
    #[must_use]
    pub fn infer(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "sys" => Some(Self::PagefileStock),
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("input and output files cannot be the same: {}", path.display())]
pub struct SamePathError {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub output: OutputSpec,
    pub bytes: u64,
    pub frames: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub sha256: String,
}

// Appends the extension when the name does not already carry it,
// so `pagefile` becomes `pagefile.sys`.
#[must_use]
pub fn with_output_extension(path: &Path, output: OutputSpec) -> PathBuf {
    let has_extension = path
        .extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case(output.extension()));
    if has_extension {
        return path.to_path_buf();
    }

    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(output.extension());
    PathBuf::from(name)
}

pub fn ensure_distinct(input: &Path, output: &Path) -> Result<(), SamePathError> {
    if normalize_path(input) == normalize_path(output) {
        return Err(SamePathError {
            path: output.to_path_buf(),
        });
    }
    Ok(())
}

fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match (parent.canonicalize(), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}

#[must_use]
pub fn render_for_output(clip: &AudioBuffer, output: OutputSpec) -> AudioBuffer {
    match output.target_rate() {
        Some(rate) => resample_linear(&downmix_mono(clip), rate),
        None => clip.clone(),
    }
}

#[instrument(skip(clip, ffmpeg_binary), fields(path = %path.display(), output = ?output))]
pub fn export_clip(
    clip: &AudioBuffer,
    output: OutputSpec,
    path: &Path,
    ffmpeg_binary: Option<&Path>,
) -> Result<ExportReport> {
    let rendered = render_for_output(clip, output);
    let bytes = match output {
        OutputSpec::PagefileStock | OutputSpec::PagefilePatched => to_s16le_bytes(&rendered),
        OutputSpec::Wav => wav_bytes(&rendered)?,
        OutputSpec::Mp3 => mp3_bytes(&rendered, ffmpeg_binary)?,
    };

    write_atomic(path, &bytes)?;
    let report = ExportReport {
        path: path.to_path_buf(),
        output,
        bytes: bytes.len() as u64,
        frames: rendered.frames() as u64,
        sample_rate: rendered.sample_rate,
        channels: rendered.channels,
        sha256: hash_hex(&bytes),
    };
    info!(bytes = report.bytes, frames = report.frames, "export completed");
    Ok(report)
}

#[instrument(fields(input = %input.display(), output = %output.display()))]
pub fn convert_pagefile(input: &Path, output: &Path) -> Result<ExportReport> {
    ensure_distinct(input, output)?;
    let stock = load_raw_pcm(input, STOCK_FIRMWARE_RATE)?;
    export_clip(&stock, OutputSpec::PagefilePatched, output, None)
}

pub(crate) fn wav_bytes(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let (bits_per_sample, sample_format) = match buffer.bits_per_sample {
        0..=16 => (16, hound::SampleFormat::Int),
        24 => (24, hound::SampleFormat::Int),
        _ => (32, hound::SampleFormat::Float),
    };
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample,
        sample_format,
    };

    let mut bytes = Vec::new();
    let mut writer =
        hound::WavWriter::new(Cursor::new(&mut bytes), spec).context("failed to start wav")?;
    for sample in &buffer.samples {
        let written = match bits_per_sample {
            16 => writer.write_sample(quantize_i16(*sample)),
            24 => writer.write_sample(quantize_i24(*sample)),
            _ => writer.write_sample(*sample),
        };
        written.context("failed to write wav sample")?;
    }
    writer.finalize().context("failed to finalize wav")?;
    Ok(bytes)
}

fn mp3_bytes(buffer: &AudioBuffer, ffmpeg_binary: Option<&Path>) -> Result<Vec<u8>> {
    let ffmpeg = ffmpeg_binary.map_or_else(|| PathBuf::from("ffmpeg"), Path::to_path_buf);

    let temp_dir = tempfile::tempdir().context("failed to create temporary export directory")?;
    let temp_wav = temp_dir.path().join("loopcut_export.wav");
    let temp_mp3 = temp_dir.path().join("loopcut_export.mp3");
    fs::write(&temp_wav, wav_bytes(buffer)?)
        .with_context(|| format!("failed to write {}", temp_wav.display()))?;

    let status = Command::new(&ffmpeg)
        .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
        .arg(&temp_wav)
        .args(["-codec:a", "libmp3lame", "-qscale:a", "2"])
        .arg(&temp_mp3)
        .status()
        .with_context(|| format!("failed to spawn ffmpeg: {}", ffmpeg.display()))?;

    if !status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg exited with status {status} while encoding mp3"
        ));
    }

    fs::read(&temp_mp3).with_context(|| format!("failed to read {}", temp_mp3.display()))
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create output directory: {}", parent.display()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    temp_file
        .write_all(bytes)
        .context("failed to write temp output file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist output: {}", path.display()))?;

    debug!(path = %path.display(), bytes = bytes.len(), "output written");
    Ok(())
}

fn quantize_i24(sample: f32) -> i32 {
    (f64::from(sample) * 8_388_608.0)
        .round()
        .clamp(-8_388_608.0, 8_388_607.0) as i32
}

fn hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
