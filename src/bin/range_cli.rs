use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use range_trainer::analysis::{compute_dispersion, GroupDispersion, ShotEvent};
use range_trainer::calibration::{CalibrationReference, PixelPoint};
use range_trainer::capture::{CalibrationMode, CaptureSession, CapturedTarget};
use range_trainer::config::AppConfig;
use range_trainer::fixtures::{ExpectationDiff, FixtureCatalog, FixtureProcessor};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "range_cli",
    about = "Shot-group analysis and acoustic shot detection harness"
)]
struct Cli {
    /// Override directory containing fixture assets (defaults to ./fixtures)
    #[arg(long)]
    fixtures_dir: Option<PathBuf>,
    /// Load settings from a JSON config file instead of the defaults
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute group metrics for a marked target described in JSON
    Group {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay a WAV fixture through the shot detector
    Detect {
        #[arg(long)]
        fixture: String,
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long)]
        sensitivity: Option<u32>,
        #[arg(long)]
        min_delay_ms: Option<u64>,
    },
    /// Listen on the default microphone and print shots as JSON lines
    #[cfg(not(target_os = "android"))]
    Listen {
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,
    },
    /// List available fixtures on disk
    DumpFixtures,
}

/// Marked target as produced by the capture UI.
#[derive(Debug, Deserialize)]
struct CaptureInput {
    #[serde(default = "default_mode")]
    mode: CalibrationMode,
    distance_yards: f64,
    references: Vec<CalibrationReference>,
    point_of_aim: PixelPoint,
    shots: Vec<PixelPoint>,
}

fn default_mode() -> CalibrationMode {
    CalibrationMode::ReferenceMarker
}

#[derive(Serialize)]
struct GroupReport<'a> {
    target: &'a CapturedTarget,
    dispersion: GroupDispersion,
}

#[derive(Serialize)]
struct DetectReport<'a> {
    fixture: &'a str,
    sample_rate: u32,
    duration_ms: u64,
    shot_count: usize,
    #[serde(skip_serializing_if = "slice_empty")]
    shots: &'a [ShotEvent],
}

fn slice_empty(shots: &&[ShotEvent]) -> bool {
    shots.is_empty()
}

fn main() -> ExitCode {
    range_trainer::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_default();
    let catalog = cli
        .fixtures_dir
        .map(FixtureCatalog::new)
        .unwrap_or_default();

    match cli.command {
        Commands::Group { input, output } => run_group(&config, &input, output),
        Commands::Detect {
            fixture,
            expect,
            sensitivity,
            min_delay_ms,
        } => run_detect(&catalog, &config, &fixture, expect, sensitivity, min_delay_ms),
        #[cfg(not(target_os = "android"))]
        Commands::Listen { duration_secs } => run_listen(&config, duration_secs),
        Commands::DumpFixtures => run_dump(&catalog),
    }
}

fn run_group(config: &AppConfig, input: &Path, output_path: Option<PathBuf>) -> Result<ExitCode> {
    let json =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let request: CaptureInput =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", input.display()))?;

    let mut session = CaptureSession::with_config(request.mode, config.capture);
    match request.references.as_slice() {
        [] => return Err(anyhow!("capture input needs at least one reference")),
        [single] => session.calibrate(single)?,
        many => session.calibrate_multi(many)?,
    };
    session.set_point_of_aim(request.point_of_aim)?;
    for point in request.shots {
        session.add_shot(point)?;
    }

    let target = session.finish(request.distance_yards)?;
    let dispersion = compute_dispersion(&target.shots)?;
    let report = GroupReport {
        target: &target,
        dispersion,
    };
    let json = serde_json::to_string_pretty(&report)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(ExitCode::from(0))
}

fn run_detect(
    catalog: &FixtureCatalog,
    config: &AppConfig,
    fixture: &str,
    override_expect: Option<PathBuf>,
    sensitivity: Option<u32>,
    min_delay_ms: Option<u64>,
) -> Result<ExitCode> {
    let mut processor = FixtureProcessor::new(config);
    if let Some(sensitivity) = sensitivity {
        processor = processor.with_sensitivity(sensitivity);
    }
    if let Some(min_delay_ms) = min_delay_ms {
        processor = processor.with_min_delay_ms(min_delay_ms);
    }

    let data = catalog.load(fixture, override_expect)?;
    let shots = processor
        .run(&data)
        .with_context(|| format!("processing fixture {}", fixture))?;

    let report = DetectReport {
        fixture: &data.metadata.name,
        sample_rate: data.sample_rate,
        duration_ms: data.duration_ms(),
        shot_count: shots.len(),
        shots: &shots,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(expectations) = data.expectations {
        match expectations.verify(&shots) {
            Ok(()) => Ok(ExitCode::from(0)),
            Err(diff) => {
                emit_diff(&diff)?;
                Ok(ExitCode::from(2))
            }
        }
    } else {
        Ok(ExitCode::from(0))
    }
}

#[cfg(not(target_os = "android"))]
fn run_listen(config: &AppConfig, duration_secs: u64) -> Result<ExitCode> {
    use range_trainer::engine::{DetectorEvent, ShotDetectorHandle};
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast::error::TryRecvError;

    let detector = ShotDetectorHandle::with_default_microphone(config);
    let mut events = detector.subscribe();
    detector.start()?;
    eprintln!("Listening for {duration_secs}s (baseline warm-up first)...");

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut code = ExitCode::from(0);
    while Instant::now() < deadline {
        match events.try_recv() {
            Ok(DetectorEvent::ShotDetected(shot)) => {
                println!("{}", serde_json::to_string(&shot)?);
            }
            Ok(DetectorEvent::Error(err)) => {
                eprintln!("Detector stopped: {err}");
                code = ExitCode::from(1);
                break;
            }
            Err(TryRecvError::Empty) => std::thread::sleep(Duration::from_millis(10)),
            Err(TryRecvError::Lagged(skipped)) => {
                eprintln!("Skipped {skipped} events");
            }
            Err(TryRecvError::Closed) => break,
        }
    }

    detector.stop()?;
    Ok(code)
}

fn run_dump(catalog: &FixtureCatalog) -> Result<ExitCode> {
    let fixtures = catalog.discover()?;
    if fixtures.is_empty() {
        println!("No fixtures found under {}", catalog.root().display());
        return Ok(ExitCode::from(0));
    }

    for metadata in fixtures {
        if let Some(expect) = metadata.expect_path {
            println!("{} -> {}", metadata.name, expect.display());
        } else {
            println!("{}", metadata.name);
        }
    }
    Ok(ExitCode::from(0))
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}
