use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    audio::{AudioBuffer, AudioInfo, load_audio_file},
    clip::{ClipBounds, ClipError, ClipRange, GainAdjustment, slice_with_gain},
    export::{self, ExportReport, OutputSpec, with_output_extension},
    preview::{Preview, PreviewKind, build_preview},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no audio file loaded")]
    NoAudioLoaded,
    #[error("unsupported audio file {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },
    #[error(transparent)]
    Clip(#[from] ClipError),
    #[error("input and output files cannot be the same: {0}")]
    SameInputOutput(PathBuf),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for SessionError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

impl From<export::SamePathError> for SessionError {
    fn from(value: export::SamePathError) -> Self {
        Self::SameInputOutput(value.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Audio,
    Pagefile,
}

impl InputKind {
    #[must_use]
    pub fn of(path: &Path) -> Self {
        let is_sys = path
            .extension()
            .and_then(|value| value.to_str())
            .is_some_and(|value| value.eq_ignore_ascii_case("sys"));
        if is_sys { Self::Pagefile } else { Self::Audio }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub path: PathBuf,
    pub buffer: AudioBuffer,
    pub info: AudioInfo,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    source: Option<LoadedSource>,
    ffmpeg_binary: Option<PathBuf>,
}

impl Session {
    #[must_use]
    pub fn new(ffmpeg_binary: Option<PathBuf>) -> Self {
        Self {
            source: None,
            ffmpeg_binary,
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&LoadedSource> {
        self.source.as_ref()
    }

    pub fn info(&self) -> Result<&AudioInfo, SessionError> {
        Ok(&self.loaded()?.info)
    }

    // On failure the previous source is kept.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load(&mut self, path: &Path) -> Result<&AudioInfo, SessionError> {
        if InputKind::of(path) == InputKind::Pagefile {
            return Err(SessionError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "raw pagefile input can only be converted to 22050 Hz".to_string(),
            });
        }
        if !path.is_file() {
            return Err(SessionError::Io(format!(
                "file could not be found: {}",
                path.display()
            )));
        }

        let buffer = load_audio_file(path).map_err(|error| SessionError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("{error:#}"),
        })?;
        let info = AudioInfo::describe(path, &buffer);
        info!(%info, "audio source loaded");

        let source = self.source.insert(LoadedSource {
            path: path.to_path_buf(),
            buffer,
            info,
        });
        Ok(&source.info)
    }

    #[instrument(skip(self), fields(start_ms = range.start_ms, end_ms = range.end_ms, gain_db = gain.db()))]
    pub fn clip(&self, range: ClipRange, gain: GainAdjustment) -> Result<AudioBuffer, SessionError> {
        let source = self.loaded()?;
        Ok(slice_with_gain(
            &source.buffer,
            range,
            ClipBounds::STANDARD,
            gain,
        )?)
    }

    pub fn preview(
        &self,
        range: ClipRange,
        gain: GainAdjustment,
        kind: PreviewKind,
    ) -> Result<Preview, SessionError> {
        let source = self.loaded()?;
        Ok(build_preview(&source.buffer, range, gain, kind)?)
    }

    #[instrument(skip(self, preview), fields(kind = ?preview.kind, path = %path.display()))]
    pub fn write_preview(&self, preview: &Preview, path: &Path) -> Result<PathBuf, SessionError> {
        let source = self.loaded()?;
        let path = with_output_extension(path, OutputSpec::Wav);
        export::ensure_distinct(&source.path, &path)?;

        export::write_atomic(&path, &export::wav_bytes(&preview.audio)?)?;
        info!(path = %path.display(), "preview written");
        Ok(path)
    }

    // The self-overwrite check runs on the path after the extension is appended.
    #[instrument(skip(self), fields(start_ms = range.start_ms, end_ms = range.end_ms, output = ?output, path = %path.display()))]
    pub fn export(
        &self,
        range: ClipRange,
        gain: GainAdjustment,
        output: OutputSpec,
        path: &Path,
    ) -> Result<ExportReport, SessionError> {
        let source = self.loaded()?;
        let clip = slice_with_gain(&source.buffer, range, ClipBounds::STANDARD, gain)?;

        let path = with_output_extension(path, output);
        export::ensure_distinct(&source.path, &path)?;

        let report = export::export_clip(&clip, output, &path, self.ffmpeg_binary.as_deref())?;
        info!(path = %report.path.display(), bytes = report.bytes, "file successfully saved");
        Ok(report)
    }

    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub fn convert_pagefile(&self, input: &Path, output: &Path) -> Result<ExportReport, SessionError> {
        export::ensure_distinct(input, output)?;
        Ok(export::convert_pagefile(input, output)?)
    }

    fn loaded(&self) -> Result<&LoadedSource, SessionError> {
        self.source.as_ref().ok_or(SessionError::NoAudioLoaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_kind_follows_extension() {
        assert_eq!(InputKind::of(Path::new("pagefile.SYS")), InputKind::Pagefile);
        assert_eq!(InputKind::of(Path::new("theme.mp3")), InputKind::Audio);
        assert_eq!(InputKind::of(Path::new("noext")), InputKind::Audio);
    }

    #[test]
    fn actions_need_a_loaded_source() {
        let session = Session::default();
        assert!(matches!(session.info(), Err(SessionError::NoAudioLoaded)));
        let error = session
            .clip(ClipRange::new(0.0, 1_000.0), GainAdjustment::UNITY)
            .expect_err("nothing loaded");
        assert!(matches!(error, SessionError::NoAudioLoaded));
    }

    #[test]
    fn missing_file_keeps_session_empty() {
        let mut session = Session::default();
        let error = session
            .load(Path::new("/definitely/not/here.wav"))
            .expect_err("missing file");
        assert!(matches!(error, SessionError::Io(_)));
        assert!(session.source().is_none());
    }
}
