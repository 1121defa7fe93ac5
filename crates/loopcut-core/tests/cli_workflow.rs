use std::{
    fs,
    path::Path,
    process::{Command, Output},
};

use loopcut_core::fixtures::{sine_tone, write_wav};
use tempfile::tempdir;

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    let config = dir.join("loopcut.config.toml");
    if !config.exists() {
        fs::write(&config, "").expect("empty config should be writable");
    }

    Command::new(env!("CARGO_BIN_EXE_loopcut-cli"))
        .current_dir(dir)
        .env_remove("LOOPCUT_CONFIG_PATH")
        .env_remove("RUST_LOG")
        .arg("--log-dir")
        .arg(dir.join("logs"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .expect("loopcut-cli should run")
}

fn write_source(dir: &Path) -> Vec<u8> {
    let source = dir.join("theme.wav");
    write_wav(&source, &sine_tone(44_100, 2, 3.0, 440.0, 0.5))
        .expect("source wav should be writable");
    fs::read(&source).expect("source bytes")
}

fn report(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "cli failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be a json report")
}

#[test]
fn export_without_format_or_output_writes_stock_pagefile() {
    let temp = tempdir().expect("tempdir should be creatable");
    write_source(temp.path());

    let output = run_cli(
        temp.path(),
        &["export", "theme.wav", "--start", "0", "--end", "2000"],
    );
    let report = report(&output);

    assert_eq!(report["output"], "pagefile_stock");
    let pagefile = temp.path().join("pagefile.sys");
    assert_eq!(
        fs::metadata(&pagefile).expect("pagefile should exist").len(),
        43_120 * 2
    );
}

#[test]
fn export_infers_wav_from_output_name() {
    let temp = tempdir().expect("tempdir should be creatable");
    write_source(temp.path());

    let output = run_cli(
        temp.path(),
        &[
            "export", "theme.wav", "--start", "500", "--end", "1500", "--output", "clip.wav",
        ],
    );
    let report = report(&output);

    assert_eq!(report["output"], "wav");
    assert!(!temp.path().join("clip.wav.sys").exists());
    let reader = hound::WavReader::open(temp.path().join("clip.wav")).expect("clip should be a wav");
    assert_eq!(reader.spec().sample_rate, 44_100);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.duration(), 44_100);
}

#[test]
fn explicit_format_wins_over_output_name() {
    let temp = tempdir().expect("tempdir should be creatable");
    write_source(temp.path());

    let output = run_cli(
        temp.path(),
        &[
            "export",
            "theme.wav",
            "--start",
            "0",
            "--end",
            "1000",
            "--format",
            "pagefile-22050",
            "--output",
            "clip.wav",
        ],
    );
    let report = report(&output);

    assert_eq!(report["output"], "pagefile_patched");
    assert!(!temp.path().join("clip.wav").exists());
    assert_eq!(
        fs::metadata(temp.path().join("clip.wav.sys"))
            .expect("patched pagefile should exist")
            .len(),
        22_050 * 2
    );
}

#[test]
fn preview_output_cannot_replace_the_source() {
    let temp = tempdir().expect("tempdir should be creatable");
    let original = write_source(temp.path());

    for target in ["theme.wav", "./theme.wav", "theme"] {
        let output = run_cli(
            temp.path(),
            &[
                "preview", "theme.wav", "--start", "0", "--end", "1000", "--output", target,
            ],
        );
        assert!(!output.status.success(), "--output {target} must be refused");
        assert!(String::from_utf8_lossy(&output.stderr).contains("cannot be the same"));
    }
    assert_eq!(fs::read(temp.path().join("theme.wav")).expect("source bytes"), original);

    let output = run_cli(
        temp.path(),
        &[
            "preview", "theme.wav", "--start", "0", "--end", "1000", "--output", "check.wav",
        ],
    );
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reader =
        hound::WavReader::open(temp.path().join("check.wav")).expect("preview should be a wav");
    assert_eq!(reader.duration(), 3 * 44_100);
}

#[test]
fn convert_sys_refuses_to_overwrite_its_input() {
    let temp = tempdir().expect("tempdir should be creatable");
    let input = temp.path().join("pagefile.sys");
    let original: Vec<u8> = (0..21_560_u32)
        .flat_map(|frame| ((frame % 200) as i16 * 64).to_le_bytes())
        .collect();
    fs::write(&input, &original).expect("pagefile should be writable");

    for target in ["pagefile.sys", "./pagefile.sys"] {
        let output = run_cli(
            temp.path(),
            &["convert-sys", "pagefile.sys", "--output", target],
        );
        assert!(!output.status.success(), "--output {target} must be refused");
    }
    assert_eq!(fs::read(&input).expect("input bytes"), original);

    let output = run_cli(
        temp.path(),
        &["convert-sys", "pagefile.sys", "--output", "patched.sys"],
    );
    let report = report(&output);
    assert_eq!(report["sample_rate"], 22_050);
    assert_eq!(
        fs::metadata(temp.path().join("patched.sys"))
            .expect("converted pagefile should exist")
            .len(),
        22_050 * 2
    );
}
