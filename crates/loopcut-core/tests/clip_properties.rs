use loopcut_core::{
    AudioBuffer, ClipBounds, ClipRange, OutputSpec, export_clip, slice,
    fixtures::write_wav, load_audio_file, time::frames_to_ms,
};
use proptest::prelude::*;

const RATES: [u32; 4] = [8_000, 22_050, 44_100, 48_000];

fn silence(sample_rate: u32, channels: u16, seconds: u32) -> AudioBuffer {
    let len = (sample_rate * seconds) as usize * usize::from(channels);
    AudioBuffer::new(sample_rate, channels, 16, vec![0.0; len])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    #[test]
    fn slice_duration_matches_range(
        rate_index in 0usize..RATES.len(),
        start_ms in 0.0f64..5_000.0,
        length_ms in 100.5f64..20_000.0,
    ) {
        let rate = RATES[rate_index];
        let source = silence(rate, 1, 26);
        let range = ClipRange::new(start_ms, start_ms + length_ms);
        let clip = slice(&source, range, ClipBounds::STANDARD).expect("range lies inside the source");
        let frame_ms = frames_to_ms(1, rate);
        prop_assert!((clip.duration_ms() - length_ms).abs() <= frame_ms + 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        .. ProptestConfig::default()
    })]

    #[test]
    fn raw_export_size_follows_duration(
        rate_index in 0usize..RATES.len(),
        channels in 1u16..=2,
        frames in 1usize..40_000,
        patched in any::<bool>(),
    ) {
        let rate = RATES[rate_index];
        let clip = AudioBuffer::new(rate, channels, 16, vec![0.1; frames * usize::from(channels)]);
        let output = if patched { OutputSpec::PagefilePatched } else { OutputSpec::PagefileStock };
        let target = output.target_rate().expect("pagefile has a target rate");

        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join("pagefile.sys");
        let report = export_clip(&clip, output, &path, None).expect("raw export should succeed");

        // round(D / 1000 * R) frames of two bytes each, evaluated without the ms detour
        // so exact .5 ties round the same way.
        let expected_frames = (frames as f64 * f64::from(target) / f64::from(rate)).round();
        let expected = expected_frames as u64 * 2;
        prop_assert_eq!(report.bytes, expected);
        prop_assert_eq!(std::fs::metadata(&path).expect("output exists").len(), expected);

        let ideal_frames = clip.duration_ms() / 1_000.0 * f64::from(target);
        prop_assert!((report.frames as f64 - ideal_frames).abs() <= 0.5 + 1e-6);
    }
}

fn no_panic_load(path: &std::path::Path) -> bool {
    std::panic::catch_unwind(|| {
        let _ = load_audio_file(path);
    })
    .is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn truncated_wav_payloads_do_not_panic(prefix_len in 0usize..2_048usize) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join("truncated.wav");
        write_wav(&path, &silence(8_000, 2, 1)).expect("writing source wav should work");

        let mut payload = std::fs::read(&path).expect("reading source wav should work");
        payload.truncate(prefix_len.min(payload.len()));
        std::fs::write(&path, payload).expect("writing truncated payload should work");

        prop_assert!(no_panic_load(&path));
    }
}
