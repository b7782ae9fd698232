use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use cell_counter::batch::{BatchSettings, discover_images, run_batch};
use cell_counter::detect::{
    BlobColor, Connectivity, DetectionConfig, DetectionParams, RepresentativeLevel,
};
use cell_counter::logging::setup_logging;
use cell_counter::report::{write_summary_csv, write_summary_json};
use cell_counter::synth::write_sample;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorArg {
    Any,
    Dark,
    Bright,
}

impl From<ColorArg> for BlobColor {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Any => BlobColor::Any,
            ColorArg::Dark => BlobColor::Dark,
            ColorArg::Bright => BlobColor::Bright,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ConnectivityArg {
    #[value(name = "4")]
    Four,
    #[value(name = "8")]
    Eight,
}

impl From<ConnectivityArg> for Connectivity {
    fn from(value: ConnectivityArg) -> Self {
        match value {
            ConnectivityArg::Four => Connectivity::Four,
            ConnectivityArg::Eight => Connectivity::Eight,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RepresentativeArg {
    First,
    AreaBandCenter,
}

impl From<RepresentativeArg> for RepresentativeLevel {
    fn from(value: RepresentativeArg) -> Self {
        match value {
            RepresentativeArg::First => RepresentativeLevel::First,
            RepresentativeArg::AreaBandCenter => RepresentativeLevel::AreaBandCenter,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "cell_counter",
    about = "Count blobs (cells) in each cropped chamber image",
    version
)]
struct Cli {
    /// Directory containing input images
    #[arg(short = 'd', long = "dir", default_value = ".")]
    dir: PathBuf,

    /// File pattern to process, e.g. `*.jpg` or `data/*.jpg` (relative to --dir)
    #[arg(long = "glob", default_value = "*.jpg")]
    glob: String,

    /// Output folder
    #[arg(short = 'o', long = "out", default_value = "results")]
    out: PathBuf,

    /// Min blob area (px²)
    #[arg(long = "min-area", default_value_t = 30)]
    min_area: u32,

    /// Max blob area (px²)
    #[arg(long = "max-area", default_value_t = 1500)]
    max_area: u32,

    /// Min circularity (0-1); disable with --no-circularity
    #[arg(long = "circularity", default_value_t = 0.40)]
    circularity: f32,

    /// Turn off the circularity filter
    #[arg(long = "no-circularity")]
    no_circularity: bool,

    /// Skip writing overlay images
    #[arg(long = "no-overlay")]
    no_overlay: bool,

    /// Sample dilution factor (×). With --frame-vol, concentration (cells/mL) is reported
    #[arg(long = "dilution", value_parser = positive_f64)]
    dilution: Option<f64>,

    /// Volume represented by ONE cropped frame in mL (e.g. 1e-4 for 0.1 mm depth × 1 cm²)
    #[arg(long = "frame-vol", value_parser = positive_f64)]
    frame_vol: Option<f64>,

    /// First threshold level of the sweep
    #[arg(long = "min-threshold", default_value_t = 10)]
    min_threshold: u8,

    /// Last threshold level of the sweep (inclusive)
    #[arg(long = "max-threshold", default_value_t = 220)]
    max_threshold: u8,

    /// Distance between threshold levels
    #[arg(long = "threshold-step", default_value_t = 10)]
    threshold_step: u8,

    /// Max centroid shift (px) for a region to continue a blob at the next level
    #[arg(long = "match-tolerance", default_value_t = 10.0)]
    match_tolerance: f32,

    /// Levels a blob must persist to be counted
    #[arg(long = "min-repeatability", default_value_t = 2)]
    min_repeatability: u32,

    /// Blob color to look for
    #[arg(long = "polarity", value_enum, default_value_t = ColorArg::Any)]
    polarity: ColorArg,

    /// Pixel connectivity for region labeling
    #[arg(long = "connectivity", value_enum, default_value_t = ConnectivityArg::Eight)]
    connectivity: ConnectivityArg,

    /// Level whose measurements represent a blob
    #[arg(long = "representative", value_enum, default_value_t = RepresentativeArg::First)]
    representative: RepresentativeArg,

    /// JSON file with detection parameters; replaces the detection flags above
    #[arg(long = "params")]
    params: Option<PathBuf>,

    /// Worker threads (defaults to one per core)
    #[arg(long = "threads")]
    threads: Option<usize>,

    /// Write a synthetic sample frame to this path and exit
    #[arg(long = "generate-sample")]
    generate_sample: Option<PathBuf>,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            min_area: self.min_area,
            max_area: self.max_area,
            use_circularity_filter: !self.no_circularity,
            min_circularity: self.circularity,
            min_threshold: self.min_threshold,
            max_threshold: self.max_threshold,
            threshold_step: self.threshold_step,
            centroid_match_tolerance: self.match_tolerance,
            min_repeatability: self.min_repeatability,
            blob_color: self.polarity.into(),
            connectivity: self.connectivity.into(),
            representative: self.representative.into(),
        }
    }
}

fn positive_f64(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("must be a positive number, got {s}"))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _logger = setup_logging(&cli.log_level)?;

    if let Some(path) = &cli.generate_sample {
        write_sample(path)?;
        info!("wrote {}", path.display());
        return Ok(());
    }

    let params = match &cli.params {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => cli.detection_params(),
    };
    let config = DetectionConfig::new(params)?;

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    if !cli.dir.is_dir() {
        return Err(format!("Not a directory: {}", cli.dir.display()).into());
    }
    fs::create_dir_all(&cli.out)?;

    let images = discover_images(&cli.dir, Some(&cli.glob))?;
    if images.is_empty() {
        warn!("No images matching {} in {}", cli.glob, cli.dir.display());
    }

    let settings = BatchSettings {
        config,
        out_dir: cli.out.clone(),
        write_overlay: !cli.no_overlay,
        dilution: cli.dilution,
        frame_volume_ml: cli.frame_vol,
    };
    let records = run_batch(&images, &settings);

    let csv_path = cli.out.join("summary.csv");
    write_summary_csv(&csv_path, &records)?;
    write_summary_json(&cli.out.join("summary.json"), &records)?;
    info!(
        "{} of {} images counted; summary saved to {}",
        records.len(),
        images.len(),
        csv_path.display()
    );

    Ok(())
}
