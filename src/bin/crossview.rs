//! crossview CLI: stream synchronization and field-plane calibration tools.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use crossview_rs::projection::Calibration;
use crossview_rs::sync::SyncConfig;
use crossview_rs::video::ImageSequenceSource;
use crossview_rs::{PlaneProjection, TemporalAligner};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "crossview")]
#[command(about = "Align and calibrate two camera views of the same scene")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the frame offset between two image sequences.
    Sync {
        /// Directory of frames from the reference view.
        #[arg(long)]
        first: PathBuf,

        /// Directory of frames from the second view.
        #[arg(long)]
        second: PathBuf,

        /// Capture rate of both sequences.
        #[arg(long, default_value = "30.0")]
        fps: f64,

        /// Synchronization settings (JSON).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to write the sync result (JSON); printed when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Project pixel positions onto the field plane.
    Project {
        /// Calibration file (JSON).
        #[arg(long)]
        calibration: PathBuf,

        /// Pixel position as `x,y`; repeatable.
        #[arg(long = "point", value_parser = parse_point, required = true)]
        points: Vec<[f64; 2]>,
    },

    /// Warp a frame into the field plane.
    Warp {
        /// Calibration file (JSON).
        #[arg(long)]
        calibration: PathBuf,

        /// Input frame.
        #[arg(long)]
        image: PathBuf,

        /// Output image path.
        #[arg(long)]
        out: PathBuf,
    },
}

fn parse_point(s: &str) -> Result<[f64; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{}`", s))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x in `{}`: {}", s, e))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y in `{}`: {}", s, e))?;
    Ok([x, y])
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            first,
            second,
            fps,
            config,
            out,
        } => run_sync(&first, &second, fps, config.as_deref(), out.as_deref()),
        Commands::Project { calibration, points } => run_project(&calibration, &points),
        Commands::Warp {
            calibration,
            image,
            out,
        } => run_warp(&calibration, &image, &out),
    }
}

fn run_sync(
    first: &Path,
    second: &Path,
    fps: f64,
    config_path: Option<&Path>,
    out_path: Option<&Path>,
) -> CliResult<()> {
    let config = match config_path {
        Some(path) => serde_json::from_str::<SyncConfig>(&std::fs::read_to_string(path)?)?,
        None => SyncConfig::default(),
    };
    let aligner = TemporalAligner::new(config)?;

    let mut a = ImageSequenceSource::new(first, fps);
    let mut b = ImageSequenceSource::new(second, fps);
    let state = aligner.synchronize(&mut a, &mut b)?;

    let json = serde_json::to_string_pretty(&state)?;
    match out_path {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Sync result written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run_project(calibration_path: &Path, points: &[[f64; 2]]) -> CliResult<()> {
    let projector = Calibration::from_json_file(calibration_path)?.build()?;
    tracing::info!("Calibrated with {} inliers", projector.inlier_count());

    let projected = projector.project_points(points);
    let rows: Vec<serde_json::Value> = points
        .iter()
        .zip(&projected)
        .map(|(p, f)| serde_json::json!({ "pixel": p, "field": f }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn run_warp(calibration_path: &Path, image_path: &Path, out_path: &Path) -> CliResult<()> {
    let projector = Calibration::from_json_file(calibration_path)?.build()?;

    let frame = image::open(image_path)
        .map_err(|e| -> CliError { format!("Failed to open image {}: {}", image_path.display(), e).into() })?
        .to_rgb8();
    tracing::info!("Warping {}x{} frame", frame.width(), frame.height());

    let warped = projector.transform(&frame)?;
    warped.save(out_path)?;
    tracing::info!("Warped frame written to {}", out_path.display());
    Ok(())
}
