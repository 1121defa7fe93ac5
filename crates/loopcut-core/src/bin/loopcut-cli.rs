use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use loopcut_core::{
    AppConfig, ClipRange, GainAdjustment, InputKind, OutputSpec, PreviewKind, Session,
    init_tracing_with_options,
};

#[derive(Debug, Parser)]
#[command(name = "loopcut-cli")]
#[command(about = "Clip, loop-check and export background music for pagefile.sys firmware")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Info {
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },
    Export {
        input: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        start: String,

        #[arg(long, allow_hyphen_values = true)]
        end: String,

        #[arg(long, allow_hyphen_values = true)]
        gain: Option<String>,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    Preview {
        input: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        start: String,

        #[arg(long, allow_hyphen_values = true)]
        end: String,

        #[arg(long, allow_hyphen_values = true)]
        gain: Option<String>,

        #[arg(long, value_enum, default_value = "loop")]
        mode: PreviewModeArg,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        play: bool,
    },
    ConvertSys {
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum FormatArg {
    Pagefile,
    #[value(name = "pagefile-22050")]
    Pagefile22050,
    Wav,
    Mp3,
}

impl From<FormatArg> for OutputSpec {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Pagefile => Self::PagefileStock,
            FormatArg::Pagefile22050 => Self::PagefilePatched,
            FormatArg::Wav => Self::Wav,
            FormatArg::Mp3 => Self::Mp3,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum PreviewModeArg {
    Loop,
    Transition,
}

impl From<PreviewModeArg> for PreviewKind {
    fn from(value: PreviewModeArg) -> Self {
        match value {
            PreviewModeArg::Loop => Self::FullLoop,
            PreviewModeArg::Transition => Self::Transition,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_or_default()?,
    };
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| config.diagnostics.log_dir.clone());
    let _telemetry = init_tracing_with_options(
        &log_dir,
        &config.diagnostics.trace_file_prefix,
        &config.diagnostics.rust_log_filter,
    )?;

    let mut session = Session::new(Some(config.export.ffmpeg_binary.clone()));

    match cli.command {
        Commands::Info { input, json } => {
            let info = session.load(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(info)?);
            } else {
                println!("{info}");
            }
        }
        Commands::Export {
            input,
            start,
            end,
            gain,
            format,
            output,
        } => {
            let range = ClipRange::parse(&start, &end)?;
            let gain = parse_gain(gain.as_deref(), config.clip.default_gain_db)?;
            let output_path = output.unwrap_or_else(|| {
                config
                    .export
                    .default_output_dir
                    .join(&config.export.default_output_name)
            });

            let format = format
                .map(OutputSpec::from)
                .or_else(|| OutputSpec::infer(&output_path))
                .unwrap_or(OutputSpec::PagefileStock);

            session.load(&input)?;
            let report = session.export(range, gain, format, &output_path)?;
            tracing::info!(format = format.label(), path = %report.path.display(), "output ready");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Preview {
            input,
            start,
            end,
            gain,
            mode,
            output,
            play,
        } => {
            let range = ClipRange::parse(&start, &end)?;
            let gain = parse_gain(gain.as_deref(), config.clip.default_gain_db)?;

            session.load(&input)?;
            let preview = session.preview(range, gain, mode.into())?;
            tracing::info!(
                kind = ?preview.kind,
                duration_ms = preview.audio.duration_ms(),
                splice_ms = preview.splice_ms,
                "preview ready"
            );

            if let Some(path) = output {
                let written = session.write_preview(&preview, &path)?;
                println!("preview written to {}", written.display());
            }
            if play {
                play_preview(preview.audio, &config)?;
            }
        }
        Commands::ConvertSys { input, output } => {
            if InputKind::of(&input) != InputKind::Pagefile {
                tracing::warn!(path = %input.display(), "input does not end in .sys, treating it as raw pcm");
            }
            let report = session.convert_pagefile(&input, &output)?;
            tracing::info!(format = report.output.label(), path = %report.path.display(), "output ready");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn parse_gain(text: Option<&str>, default_db: f64) -> anyhow::Result<GainAdjustment> {
    match text {
        Some(text) => Ok(GainAdjustment::parse(text)?),
        None => Ok(GainAdjustment(default_db)),
    }
}

#[cfg(feature = "playback")]
fn play_preview(audio: loopcut_core::AudioBuffer, config: &AppConfig) -> anyhow::Result<()> {
    use anyhow::Context;
    use loopcut_core::playback::{RodioSink, spawn_loop};

    let settings = config.preview.loop_settings();
    let handle = spawn_loop(RodioSink::open_default, audio, settings)?;
    let outcome = if settings.max_repeats.is_some() {
        handle.wait()?
    } else {
        println!("looping preview, press Enter to stop");
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("failed to read from stdin")?;
        handle.stop()?
    };
    tracing::info!(passes = outcome.passes, "preview stopped");
    Ok(())
}

#[cfg(not(feature = "playback"))]
fn play_preview(_audio: loopcut_core::AudioBuffer, _config: &AppConfig) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(
        "cannot play preview: this build has no audio output; rebuild with `--features playback` or use --output"
    ))
}
