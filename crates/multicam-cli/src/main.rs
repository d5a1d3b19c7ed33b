//! Multicam CLI
//!
//! Headless access to the engine: inspect sectors, generate compilations
//! and drive the playback engine against a catalog file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use multicam_engine::core::catalog::{MediaCatalog, Track};
use multicam_engine::core::compilation::{
    distribute_seeded, find_bitrate_peaks, resolve_scenes, BitrateTable, CompilationSettings,
    SceneDistribution, SceneResolution, SourceWindow, PEAK_MIN_DISTANCE,
};
use multicam_engine::core::playback::{
    EngineOutput, MediaCommand, PlaybackCore, PlaybackEngine, PlaybackHandle,
};
use multicam_engine::core::sectors::Sector;
use multicam_engine::core::settings::EngineConfig;
use multicam_engine::core::{CameraIndex, TimeSec};

#[derive(Parser, Debug)]
#[command(name = "multicam")]
#[command(version)]
#[command(about = "Multi-camera timeline and compilation tools")]
struct Cli {
    /// Engine configuration file (JSON); defaults apply when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the day sectors of a catalog
    Sectors {
        /// Catalog file (`{ "clips": [...] }`)
        catalog: PathBuf,

        /// Zoom used for the reported sector widths
        #[arg(long)]
        zoom: Option<f64>,
    },

    /// Generate a compilation scene list
    Distribute {
        catalog: PathBuf,

        /// Compilation length in seconds
        #[arg(short, long)]
        duration: f64,

        /// Restrict the source window to one sector (YYYY-MM-DD)
        #[arg(long)]
        sector: Option<String>,

        /// Random seed; derived from the clock when omitted
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        main_camera: Option<CameraIndex>,

        /// Probability of picking the main camera; defaults to the configured value
        #[arg(long)]
        main_camera_prob: Option<f64>,

        /// Probability of forcing a cut when a camera repeats
        #[arg(long)]
        change_frequency: Option<f64>,

        /// Ignore bitrate samples and pick cameras uniformly
        #[arg(long)]
        no_bitrate: bool,

        /// Report this many bitrate peaks per camera
        #[arg(long, default_value_t = 0)]
        peaks: usize,
    },

    /// Run the playback engine with an acknowledging fake backend
    Simulate {
        catalog: PathBuf,

        /// Seconds of wall time to play
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,

        /// Start position (absolute seconds)
        #[arg(long)]
        seek: Option<f64>,

        /// Tracks to switch to, spread evenly over the run
        #[arg(long = "switch")]
        switches: Vec<String>,

        /// Record the switches as a montage
        #[arg(long)]
        record: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SectorReport {
    #[serde(flatten)]
    sector: Sector,
    zoom: f64,
    width_px: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DistributeReport {
    seed: u64,
    window: SourceWindow,
    settings: CompilationSettings,
    distribution: SceneDistribution,
    resolution: SceneResolution,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    peaks: BTreeMap<CameraIndex, Vec<TimeSec>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref())?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Sectors { catalog, zoom } => run_sectors(&config, &catalog, zoom),
        Command::Distribute {
            catalog,
            duration,
            sector,
            seed,
            main_camera,
            main_camera_prob,
            change_frequency,
            no_bitrate,
            peaks,
        } => {
            let settings = compilation_settings(
                &config,
                duration,
                main_camera,
                main_camera_prob,
                change_frequency,
            );
            let options = DistributeOptions {
                sector,
                seed,
                use_bitrate: !no_bitrate,
                peaks,
            };
            run_distribute(&config, &catalog, settings, options)
        }
        Command::Simulate {
            catalog,
            seconds,
            seek,
            switches,
            record,
        } => run_simulate(&config, &catalog, seconds, seek, switches, record).await,
    }
}

/// Stderr logging filtered by `RUST_LOG` (info by default), plus an optional
/// daily file. The returned guard must live until exit to flush the file.
fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "multicam.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        debug!("Tracing subscriber already installed");
    }

    Ok(guard)
}

fn load_tracks(path: &Path) -> Result<(MediaCatalog, Vec<Track>)> {
    let catalog = MediaCatalog::from_path(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    let tracks = catalog.tracks().context("building tracks")?;
    Ok((catalog, tracks))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// sectors
// =============================================================================

fn run_sectors(config: &EngineConfig, catalog: &Path, zoom: Option<f64>) -> Result<()> {
    let (_, tracks) = load_tracks(catalog)?;
    let sectors = config.partitioner().partition(&tracks);
    let mapper = config.zoom_mapper();
    let zoom = mapper.clamp(zoom.unwrap_or(config.timeline.default_zoom));

    let reports: Vec<SectorReport> = sectors
        .into_iter()
        .map(|sector| {
            let width_px = mapper
                .scale_for(&sector, zoom, config.timeline.pixels_per_second)
                .width_px();
            SectorReport {
                sector,
                zoom,
                width_px,
            }
        })
        .collect();

    info!("{} sectors", reports.len());
    print_json(&reports)
}

// =============================================================================
// distribute
// =============================================================================

/// Compilation request from the configured defaults plus command-line overrides
fn compilation_settings(
    config: &EngineConfig,
    duration: f64,
    main_camera: Option<CameraIndex>,
    main_camera_prob: Option<f64>,
    change_frequency: Option<f64>,
) -> CompilationSettings {
    let mut settings = config.compilation_settings(duration, 0);
    if let Some(camera) = main_camera {
        let probability = main_camera_prob.unwrap_or(settings.main_camera_prob);
        settings = settings.with_main_camera(camera, probability);
    }
    if let Some(frequency) = change_frequency {
        settings = settings.with_camera_change_frequency(frequency);
    }
    settings
}

struct DistributeOptions {
    sector: Option<String>,
    seed: Option<u64>,
    use_bitrate: bool,
    peaks: usize,
}

fn run_distribute(
    config: &EngineConfig,
    catalog: &Path,
    mut settings: CompilationSettings,
    options: DistributeOptions,
) -> Result<()> {
    let (catalog, tracks) = load_tracks(catalog)?;

    let (window, cameras) = match &options.sector {
        Some(date) => {
            let sectors = config.partitioner().partition(&tracks);
            let Some(sector) = sectors.iter().find(|s| &s.date == date) else {
                bail!("no sector for {date}");
            };
            let cameras: Vec<CameraIndex> = sector.tracks.iter().map(|t| t.camera_index).collect();
            (SourceWindow::for_sector(sector, settings.target_duration), cameras)
        }
        None => {
            let window = SourceWindow::for_tracks(&tracks, settings.target_duration)
                .context("catalog has no clips")?;
            (window, catalog.camera_indices())
        }
    };
    settings.num_cameras = cameras.iter().copied().max().unwrap_or(0);

    let bitrate = if options.use_bitrate {
        Some(BitrateTable::from_tracks(&tracks, &window))
    } else {
        None
    };
    let bitrate = bitrate.filter(|table| !table.is_empty());
    debug!(weighted = bitrate.is_some(), "Camera pick weighting");

    let seed = options.seed.unwrap_or_else(clock_seed);
    let distribution = distribute_seeded(&settings, &cameras, bitrate.as_ref(), seed);
    if let Some(issue) = &distribution.issue {
        warn!("Distribution produced no scenes: {:?}", issue);
    }

    let tolerance = config.sync_config().clip_tolerance;
    let resolution = resolve_scenes(&distribution.scenes, &tracks, &window, tolerance);
    for warning in &resolution.warnings {
        warn!("{}", warning);
    }

    let mut peaks = BTreeMap::new();
    if options.peaks > 0 {
        if let Some(table) = &bitrate {
            for camera in &cameras {
                let times = find_bitrate_peaks(table.samples(*camera), options.peaks, PEAK_MIN_DISTANCE);
                peaks.insert(*camera, times);
            }
        }
    }

    info!(
        seed,
        scenes = distribution.scenes.len(),
        resolved = resolution.resolved.len(),
        "Compilation generated"
    );

    print_json(&DistributeReport {
        seed,
        window,
        settings,
        distribution,
        resolution,
        peaks,
    })
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

// =============================================================================
// simulate
// =============================================================================

async fn run_simulate(
    config: &EngineConfig,
    catalog: &Path,
    seconds: f64,
    seek: Option<f64>,
    switches: Vec<String>,
    record: bool,
) -> Result<()> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("--seconds must be positive");
    }

    let (_, tracks) = load_tracks(catalog)?;
    let core = PlaybackCore::from_config(config, tracks);
    let (handle, outputs, task) = PlaybackEngine::spawn(core, config.playback.tick_hz);

    let backend = tokio::spawn(fake_backend(handle.clone(), outputs));

    if record {
        handle.start_recording()?;
    }
    if let Some(time) = seek {
        handle.seek(time)?;
    }
    handle.play()?;

    let slice = Duration::from_secs_f64(seconds / (switches.len() + 1) as f64);
    for track_id in switches {
        tokio::time::sleep(slice).await;
        info!(track_id = %track_id, "Switching camera");
        handle.switch_camera(track_id)?;
    }
    tokio::time::sleep(slice).await;

    handle.pause()?;
    if record {
        handle.stop_recording()?;
    }
    // let the engine drain the last commands before reading state
    tokio::time::sleep(Duration::from_millis(50)).await;

    print_json(&handle.snapshot())?;

    handle.shutdown();
    task.await.context("playback engine task failed")?;
    drop(handle);
    backend.await.context("backend task failed")?;
    Ok(())
}

/// Prints every engine output and acknowledges loads immediately
async fn fake_backend(handle: PlaybackHandle, mut outputs: mpsc::UnboundedReceiver<EngineOutput>) {
    while let Some(output) = outputs.recv().await {
        match serde_json::to_string(&output) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Unprintable engine output: {}", e),
        }

        if let EngineOutput::Media(MediaCommand::Load {
            track_id, generation, ..
        }) = output
        {
            if handle.media_ready(track_id, generation).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribute_settings(config: &EngineConfig, args: &[&str]) -> CompilationSettings {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Distribute {
                duration,
                main_camera,
                main_camera_prob,
                change_frequency,
                ..
            } => compilation_settings(config, duration, main_camera, main_camera_prob, change_frequency),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_main_camera_uses_configured_probability() {
        let config =
            EngineConfig::from_json_str(r#"{"compilation": {"mainCameraProb": 0.8}}"#).unwrap();

        let settings = distribute_settings(
            &config,
            &["multicam", "distribute", "catalog.json", "-d", "30", "--main-camera", "2"],
        );

        assert_eq!(settings.main_camera, Some(2));
        assert_eq!(settings.main_camera_prob, 0.8);
    }

    #[test]
    fn test_main_camera_prob_flag_overrides_config() {
        let config =
            EngineConfig::from_json_str(r#"{"compilation": {"mainCameraProb": 0.8}}"#).unwrap();

        let settings = distribute_settings(
            &config,
            &[
                "multicam",
                "distribute",
                "catalog.json",
                "-d",
                "30",
                "--main-camera",
                "2",
                "--main-camera-prob",
                "0.25",
                "--change-frequency",
                "1.0",
            ],
        );

        assert_eq!(settings.main_camera_prob, 0.25);
        assert_eq!(settings.camera_change_frequency, 1.0);
        assert_eq!(settings.target_duration, 30.0);
    }
}
