use std::fs;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ica_synth::{run_dataset, RunPaths, SynthConfig, SynthError};

const SAMPLE_RATE: u32 = 100;

fn write_samples(path: &Path, samples: &[i16]) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).expect("create wav");
    for &sample in samples {
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

fn write_source(path: &Path, num_samples: usize, amplitude: f64, freq: f64) {
    let samples: Vec<i16> = (0..num_samples)
        .map(|i| (amplitude * (freq * i as f64).sin()).round() as i16)
        .collect();
    write_samples(path, &samples);
}

fn read_csv_values(path: &Path) -> Vec<f64> {
    fs::read_to_string(path)
        .expect("read csv")
        .lines()
        .map(|line| line.parse().expect("float"))
        .collect()
}

#[test]
fn writes_complete_dataset_with_distance_map() {
    let data = tempfile::tempdir().expect("tempdir");
    write_source(&data.path().join("a.wav"), 450, 1000.0, 0.11);
    write_source(&data.path().join("b.wav"), 400, 1500.0, 0.23);
    write_source(&data.path().join("c.wav"), 420, 800.0, 0.05);
    let map_path = data.path().join("distances.yaml");
    fs::write(&map_path, "a.wav: 450\nb.wav: 520\nc.wav: 610\n").expect("write map");

    let out = tempfile::tempdir().expect("tempdir");
    let output_dir = out.path().join("dataset");
    let config = SynthConfig {
        num_active_sources: 3,
        num_time_points: 4,
        temporal_shift: true,
        seed: Some(99),
        ..Default::default()
    };
    let paths = RunPaths {
        data_dir: data.path().to_path_buf(),
        output_dir: output_dir.clone(),
        distance_map: Some(map_path),
    };

    let summary = run_dataset(&config, &paths).expect("run");

    assert_eq!(summary.seed, 99);
    assert_eq!(summary.sources, vec!["a.wav", "b.wav", "c.wav"]);
    assert_eq!(summary.corpus_samples, 400);
    assert_eq!(summary.output_samples, 300);
    assert_eq!(summary.time_points.len(), 4);
    for (initial, expected) in summary.initial_ranges_m.iter().zip([450.0, 520.0, 610.0]) {
        assert!((initial - expected).abs() < 1e-9);
    }
    for point in summary.time_points.iter().skip(1) {
        assert!(point.offset < SAMPLE_RATE as usize);
        assert!(point.min_range_m >= config.min_range_m);
    }

    let sources: Vec<String> =
        serde_yaml::from_str(&fs::read_to_string(output_dir.join("sources.yaml")).expect("read"))
            .expect("parse sources");
    assert_eq!(sources, summary.sources);

    for t in 0..4 {
        let values = read_csv_values(&output_dir.join(format!("t-{t}.csv")));
        assert_eq!(values.len(), 300);

        let mut reader = WavReader::open(output_dir.join(format!("t-{t}.wav"))).expect("wav");
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.expect("sample")).collect();
        assert_eq!(samples.len(), 300);
        for (pcm, value) in samples.iter().zip(&values) {
            assert!((f64::from(*pcm) - value).abs() <= 0.5);
        }
    }

    let positions = fs::read_to_string(output_dir.join("positions.csv")).expect("positions");
    assert_eq!(positions.lines().count(), 1 + 4 * 3);

    let raw = fs::read_to_string(output_dir.join("summary.json")).expect("summary");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(json["seed"], 99);
    assert_eq!(json["config"]["temporal_shift"], true);
}

#[test]
fn same_seed_writes_identical_clips() {
    let data = tempfile::tempdir().expect("tempdir");
    for (idx, freq) in [0.07, 0.13, 0.19, 0.31].iter().enumerate() {
        write_source(&data.path().join(format!("s{idx}.wav")), 256, 900.0, *freq);
    }

    let config = SynthConfig {
        num_active_sources: 2,
        num_time_points: 3,
        seed: Some(1234),
        ..Default::default()
    };

    let out = tempfile::tempdir().expect("tempdir");
    let mut runs = Vec::new();
    for name in ["first", "second"] {
        let paths = RunPaths {
            data_dir: data.path().to_path_buf(),
            output_dir: out.path().join(name),
            distance_map: None,
        };
        let summary = run_dataset(&config, &paths).expect("run");
        assert_eq!(summary.output_samples, 256);
        runs.push(summary);
    }

    assert_eq!(runs[0].sources, runs[1].sources);
    assert_eq!(runs[0].initial_ranges_m, runs[1].initial_ranges_m);
    for t in 0..3 {
        let first = read_csv_values(&out.path().join("first").join(format!("t-{t}.csv")));
        let second = read_csv_values(&out.path().join("second").join(format!("t-{t}.csv")));
        assert_eq!(first, second);
    }
}

#[test]
fn loud_mixture_is_clamped_not_wrapped() {
    let data = tempfile::tempdir().expect("tempdir");
    write_samples(&data.path().join("a.wav"), &[30000; 64]);
    write_samples(&data.path().join("b.wav"), &[30000; 64]);

    let out = tempfile::tempdir().expect("tempdir");
    let config = SynthConfig {
        num_active_sources: 2,
        num_time_points: 2,
        seed: Some(5),
        ..Default::default()
    };
    let paths = RunPaths {
        data_dir: data.path().to_path_buf(),
        output_dir: out.path().to_path_buf(),
        distance_map: None,
    };

    let summary = run_dataset(&config, &paths).expect("run");
    assert_eq!(summary.time_points[0].clamped_samples, 64);

    let mut reader = WavReader::open(out.path().join("t-0.wav")).expect("wav");
    assert!(reader
        .samples::<i32>()
        .map(|s| s.expect("sample"))
        .all(|s| s == i32::from(i16::MAX)));
}

#[test]
fn missing_sources_abort_before_writing() {
    let data = tempfile::tempdir().expect("tempdir");
    write_source(&data.path().join("only.wav"), 128, 500.0, 0.1);

    let out = tempfile::tempdir().expect("tempdir");
    let output_dir = out.path().join("never-created");
    let config = SynthConfig {
        num_active_sources: 2,
        seed: Some(3),
        ..Default::default()
    };
    let paths = RunPaths {
        data_dir: data.path().to_path_buf(),
        output_dir: output_dir.clone(),
        distance_map: None,
    };

    let err = run_dataset(&config, &paths).unwrap_err();
    assert!(matches!(
        err,
        SynthError::NotEnoughSources {
            requested: 2,
            available: 1
        }
    ));
    assert!(!output_dir.exists());
}
