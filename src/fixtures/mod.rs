//! Fixture utilities for the deterministic CLI harness.
//!
//! This module discovers recorded WAV fixtures, decodes them to mono PCM,
//! parses optional expectation JSON, and replays them through the same
//! adaptive-baseline detector the live microphone path uses. It is
//! desktop-focused to support CI and tuning workflows.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::volume::{normalize_i16, rms};
use crate::analysis::{DetectorState, ShotEvent, TickOutcome};
use crate::config::{AppConfig, AudioDetectionConfig, SamplingConfig};

/// Default location for fixture WAV/JSON assets.
pub const DEFAULT_FIXTURE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

/// Metadata describing an available fixture.
#[derive(Clone, Debug)]
pub struct FixtureMetadata {
    pub name: String,
    pub wav_path: PathBuf,
    pub expect_path: Option<PathBuf>,
}

/// Loaded fixture data with decoded mono PCM samples.
pub struct FixtureData {
    pub metadata: FixtureMetadata,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub expectations: Option<FixtureExpectations>,
}

impl FixtureData {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// JSON expectation schema for fixture verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureExpectations {
    pub fixture: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub shots: Vec<ExpectedShot>,
}

impl FixtureExpectations {
    /// Compare detected shots, in order, against the expected shot times.
    pub fn verify(&self, actual: &[ShotEvent]) -> std::result::Result<(), ExpectationDiff> {
        let mut failures = Vec::new();

        for (idx, expected) in self.shots.iter().enumerate() {
            match actual.get(idx) {
                Some(shot) => {
                    let delta = (shot.timestamp_ms as f64 - expected.offset_ms).abs();
                    if delta > expected.tolerance_ms {
                        failures.push(ExpectationFailure {
                            index: idx,
                            expected: Some(expected.clone()),
                            actual: Some(shot.clone()),
                            delta_ms: Some(delta),
                        });
                    }
                }
                None => failures.push(ExpectationFailure {
                    index: idx,
                    expected: Some(expected.clone()),
                    actual: None,
                    delta_ms: None,
                }),
            }
        }

        for (idx, shot) in actual.iter().enumerate().skip(self.shots.len()) {
            failures.push(ExpectationFailure {
                index: idx,
                expected: None,
                actual: Some(shot.clone()),
                delta_ms: None,
            });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Expected shot definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedShot {
    pub offset_ms: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance_ms: f64,
}

fn default_tolerance() -> f64 {
    50.0
}

/// Outcome of comparing actual results with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub failures: Vec<ExpectationFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failures": self.failures.iter().map(|failure| {
                serde_json::json!({
                    "index": failure.index,
                    "expected": failure.expected,
                    "actual": failure.actual,
                    "delta_ms": failure.delta_ms,
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// Detailed diff entry for a single failure.
///
/// `expected` is `None` for an unexpected extra shot, `actual` is `None`
/// for a missed one.
#[derive(Debug)]
pub struct ExpectationFailure {
    pub index: usize,
    pub expected: Option<ExpectedShot>,
    pub actual: Option<ShotEvent>,
    pub delta_ms: Option<f64>,
}

/// Catalog responsible for discovering fixtures on disk.
pub struct FixtureCatalog {
    root: PathBuf,
}

impl FixtureCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all fixtures by their metadata.
    pub fn discover(&self) -> Result<Vec<FixtureMetadata>> {
        let mut fixtures = Vec::new();
        if !self.root.exists() {
            return Ok(fixtures);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("wav") {
                    fixtures.push(self.metadata_for_path(&path)?);
                }
            }
        }

        fixtures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fixtures)
    }

    /// Load fixture samples + expectations for provided name or path.
    pub fn load(&self, fixture: &str, override_expect: Option<PathBuf>) -> Result<FixtureData> {
        let wav_path = self.resolve_fixture_path(fixture)?;
        let metadata = self.metadata_for_path(&wav_path)?;
        let (samples, sample_rate) = read_wav(&wav_path)?;

        let expectation_path = override_expect.or(metadata.expect_path.clone());
        let expectations = match expectation_path {
            Some(path) => {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("reading expectation {}", path.display()))?;
                Some(
                    serde_json::from_str(&json)
                        .with_context(|| format!("parsing {}", path.display()))?,
                )
            }
            None => None,
        };

        Ok(FixtureData {
            metadata,
            sample_rate,
            samples,
            expectations,
        })
    }

    fn resolve_fixture_path(&self, fixture: &str) -> Result<PathBuf> {
        let as_path = Path::new(fixture);
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }

        let candidate = self.root.join(format!("{fixture}.wav"));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(anyhow!(
                "Fixture '{fixture}' not found in {}",
                self.root.display()
            ))
        }
    }

    fn metadata_for_path(&self, wav_path: &Path) -> Result<FixtureMetadata> {
        let name = wav_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Invalid fixture name for {}", wav_path.display()))?
            .to_string();
        let expect_path = wav_path.with_extension("expect.json");
        Ok(FixtureMetadata {
            name,
            wav_path: wav_path.to_path_buf(),
            expect_path: expect_path.exists().then_some(expect_path),
        })
    }
}

impl Default for FixtureCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FIXTURE_ROOT)
    }
}

/// Replays decoded PCM through the shot detector offline.
///
/// One tick covers `tick_interval_ms` of audio; its frame is the last
/// `frame_size` samples up to the tick position. Timestamps are milliseconds
/// from the start of the file.
pub struct FixtureProcessor {
    detection: AudioDetectionConfig,
    sampling: SamplingConfig,
}

impl FixtureProcessor {
    pub fn new(app_config: &AppConfig) -> Self {
        Self {
            detection: app_config.detection,
            sampling: app_config.sampling,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: u32) -> Self {
        self.detection.sensitivity = sensitivity.min(100);
        self
    }

    pub fn with_min_delay_ms(mut self, min_delay_ms: u64) -> Self {
        self.detection.min_delay_ms = min_delay_ms;
        self
    }

    pub fn detection_config(&self) -> AudioDetectionConfig {
        self.detection
    }

    pub fn run(&self, data: &FixtureData) -> Result<Vec<ShotEvent>> {
        self.sampling
            .validate()
            .map_err(|err| anyhow!("invalid sampling config: {}", err))?;
        if data.sample_rate == 0 {
            return Err(anyhow!("fixture {} has a zero sample rate", data.metadata.name));
        }
        if data.samples.is_empty() {
            return Ok(Vec::new());
        }

        let hop = ((data.sample_rate as u64 * self.sampling.tick_interval_ms) / 1000).max(1) as usize;
        let mut state = DetectorState::new();
        let mut shots = Vec::new();
        let mut position = hop;

        while position <= data.samples.len() {
            let start = position.saturating_sub(self.sampling.frame_size);
            let volume = rms(&data.samples[start..position]);
            let now_ms = position as u64 * 1000 / data.sample_rate as u64;

            if let TickOutcome::ShotDetected(shot) = state.tick(volume, now_ms, &self.detection) {
                log::debug!(
                    "[Fixture] {} shot #{} at {} ms (volume {:.4}, threshold {:.4})",
                    data.metadata.name,
                    shot.shot_number,
                    shot.timestamp_ms,
                    shot.volume,
                    shot.threshold
                );
                shots.push(shot);
            }
            position += hop;
        }

        Ok(shots)
    }
}

/// Decode a WAV file to normalized mono samples, averaging multi-channel input.
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|sample| sample.map(normalize_i16).map_err(|err| anyhow!(err)))
                .collect::<Result<Vec<f32>>>()?,
            bits @ 8..=32 => {
                let max = ((1i64 << (bits - 1)) - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| {
                        sample
                            .map(|value| (value as f32 / max).clamp(-1.0, 1.0))
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<f32>>>()?
            }
            other => {
                return Err(anyhow!(
                    "Unsupported bits per sample {} in {}",
                    other,
                    path.display()
                ))
            }
        },
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

/// Write normalized mono samples as a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;

    /// Square-wave ambient floor with full-scale bursts at the given offsets.
    fn synthetic_recording(duration_ms: u64, bursts_ms: &[u64]) -> Vec<f32> {
        let total = (RATE as u64 * duration_ms / 1000) as usize;
        let burst_len = RATE as usize / 100;
        let mut samples: Vec<f32> = (0..total)
            .map(|i| if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        for &offset in bursts_ms {
            let start = (RATE as u64 * offset / 1000) as usize;
            for (i, sample) in samples.iter_mut().skip(start).take(burst_len).enumerate() {
                *sample = if i % 2 == 0 { 0.8 } else { -0.8 };
            }
        }
        samples
    }

    fn fixture(samples: Vec<f32>) -> FixtureData {
        FixtureData {
            metadata: FixtureMetadata {
                name: "synthetic".to_string(),
                wav_path: PathBuf::from("synthetic.wav"),
                expect_path: None,
            },
            sample_rate: RATE,
            samples,
            expectations: None,
        }
    }

    fn processor() -> FixtureProcessor {
        let mut config = AppConfig::default();
        config.sampling.frame_size = 256;
        FixtureProcessor::new(&config)
    }

    #[test]
    fn detects_bursts_after_warmup() {
        let data = fixture(synthetic_recording(3_000, &[1_000, 2_000]));
        let shots = processor().run(&data).unwrap();

        assert_eq!(shots.len(), 2);
        assert!((shots[0].timestamp_ms as i64 - 1_000).abs() <= 40);
        assert!((shots[1].timestamp_ms as i64 - 2_000).abs() <= 40);
    }

    #[test]
    fn burst_inside_warmup_is_ignored() {
        // Warm-up spans the first 30 ticks (~480 ms at 16 ms per tick).
        let data = fixture(synthetic_recording(1_500, &[100, 1_000]));
        let shots = processor().run(&data).unwrap();

        assert_eq!(shots.len(), 1);
        assert!((shots[0].timestamp_ms as i64 - 1_000).abs() <= 40);
    }

    #[test]
    fn min_delay_debounces_double() {
        let data = fixture(synthetic_recording(2_000, &[1_000, 1_100]));

        let debounced = processor().with_min_delay_ms(250).run(&data).unwrap();
        assert_eq!(debounced.len(), 1);

        let split = processor().with_min_delay_ms(50).run(&data).unwrap();
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn silence_yields_no_shots() {
        let data = fixture(vec![0.0; RATE as usize * 2]);
        assert!(processor().run(&data).unwrap().is_empty());
        assert!(processor().run(&fixture(Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn wav_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("range.wav");
        let samples = synthetic_recording(2_000, &[1_200]);
        write_wav(&path, &samples, RATE).unwrap();

        let catalog = FixtureCatalog::new(dir.path());
        let discovered = catalog.discover().unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].name, "range");

        let data = catalog.load("range", None).unwrap();
        assert_eq!(data.sample_rate, RATE);
        assert_eq!(data.samples.len(), samples.len());
        assert_eq!(data.duration_ms(), 2_000);

        let shots = processor().run(&data).unwrap();
        assert_eq!(shots.len(), 1);
    }

    #[test]
    fn stereo_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..4 {
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-0.1f32).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, rate) = read_wav(&path).unwrap();
        assert_eq!(rate, RATE);
        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn expectations_report_missing_and_extra_shots() {
        let expectations = FixtureExpectations {
            fixture: "synthetic".to_string(),
            notes: None,
            shots: vec![
                ExpectedShot {
                    offset_ms: 1_000.0,
                    tolerance_ms: 30.0,
                },
                ExpectedShot {
                    offset_ms: 2_000.0,
                    tolerance_ms: 30.0,
                },
            ],
        };
        let shot = |timestamp_ms| ShotEvent {
            shot_number: 1,
            timestamp_ms,
            volume: 0.8,
            baseline_volume: 0.01,
            threshold: 0.0575,
        };

        assert!(expectations.verify(&[shot(1_010), shot(1_990)]).is_ok());

        let diff = expectations.verify(&[shot(1_100)]).unwrap_err();
        assert_eq!(diff.failures.len(), 2);
        assert_eq!(diff.failures[0].delta_ms, Some(100.0));
        assert!(diff.failures[1].actual.is_none());

        let diff = expectations
            .verify(&[shot(1_000), shot(2_000), shot(2_500)])
            .unwrap_err();
        assert_eq!(diff.failures.len(), 1);
        assert!(diff.failures[0].expected.is_none());
        assert_eq!(diff.to_json()["failures"][0]["index"], 2);
    }

    #[test]
    fn expectation_tolerance_defaults() {
        let parsed: FixtureExpectations =
            serde_json::from_str(r#"{ "fixture": "x", "shots": [{ "offset_ms": 10 }] }"#).unwrap();
        assert_eq!(parsed.shots[0].tolerance_ms, 50.0);
    }
}
