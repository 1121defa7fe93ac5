use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{diagnostics, playback::LoopSettings};

pub const CONFIG_FILE_NAME: &str = "loopcut.config.toml";
pub const CONFIG_PATH_ENV: &str = "LOOPCUT_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub diagnostics: DiagnosticsConfig,
    pub export: ExportConfig,
    pub preview: PreviewConfig,
    pub clip: ClipConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub ffmpeg_binary: PathBuf,
    pub default_output_name: String,
    pub default_output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    pub poll_interval_ms: u64,
    pub gap_ms: u64,
    pub max_repeats: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipConfig {
    pub default_gain_db: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: diagnostics::DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: diagnostics::DEFAULT_LOG_PREFIX.to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            default_output_name: "pagefile".to_string(),
            default_output_dir: PathBuf::from("."),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            gap_ms: 200,
            max_repeats: None,
        }
    }
}

impl PreviewConfig {
    #[must_use]
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            gap: Duration::from_millis(self.gap_ms),
            max_repeats: self.max_repeats,
        }
    }
}

impl AppConfig {
    // A missing file yields the defaults; a file that fails to parse is still an error.
    pub fn load_or_default() -> Result<Self> {
        match discover_config_path() {
            Ok(path) => Self::load_from(&path),
            Err(_) => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;

        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}
