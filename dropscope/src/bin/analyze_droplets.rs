//! Droplet analysis for microscope frames
//!
//! Detects droplets in a single image or in every image of a folder, writes
//! an annotated copy of each frame and exports one CSV row per droplet.
//!
//! Usage:
//! ```bash
//! # Analyse a folder of 16-bit TIFFs, keeping every intermediate raster
//! analyze_droplets data/run3 --extension tif --output out/run3 --debug
//!
//! # Single image with a larger search radius and a per-image time budget
//! analyze_droplets frame.png --max-radius 45 --deadline 2s
//! ```
//!
//! Set `RUST_LOG=debug` for per-stage detail.

use std::path::PathBuf;

use clap::Parser;
use dropscope::batch::{analyze_folder, analyze_paths, BatchOptions};
use dropscope::config::AnalysisConfig;
use dropscope::shared_args::DurationArg;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

/// Command line arguments for droplet analysis
#[derive(Parser, Debug)]
#[command(
    name = "analyze_droplets",
    about = "Detect, segment and measure droplets in grayscale microscope images",
    long_about = None
)]
struct Args {
    /// Image file or folder of images
    input: PathBuf,

    /// Folder for annotated images (and per-image debug folders)
    #[arg(short, long, default_value = "droplet_output")]
    output: PathBuf,

    /// Image extension to analyse when INPUT is a folder
    #[arg(short, long, default_value = "png")]
    extension: String,

    /// CSV export path (defaults to <output>/droplets.csv)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// JSON file with analysis parameters; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum droplet radius in pixels
    #[arg(long)]
    min_radius: Option<i32>,

    /// Maximum droplet radius in pixels
    #[arg(long)]
    max_radius: Option<i32>,

    /// Inverse accumulator resolution of the circle detector
    #[arg(long)]
    dp: Option<f64>,

    /// Upper edge threshold of the circle detector (lower is more sensitive)
    #[arg(long)]
    param1: Option<f64>,

    /// Accumulator threshold of the circle detector (lower is more sensitive)
    #[arg(long)]
    param2: Option<f64>,

    /// Write every intermediate raster to a per-image folder
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Time budget for re-thresholding each image (e.g. "500ms", "2s")
    #[arg(long)]
    deadline: Option<DurationArg>,

    /// Analyse images serially instead of in parallel
    #[arg(long, default_value_t = false)]
    serial: bool,

    /// Worker threads for parallel analysis (defaults to all cores)
    #[arg(long)]
    threads: Option<usize>,
}

impl Args {
    fn analysis_config(&self) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load_from_file(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(v) = self.min_radius {
            config.min_radius = v;
        }
        if let Some(v) = self.max_radius {
            config.max_radius = v;
        }
        if let Some(v) = self.dp {
            config.dp = v;
        }
        if let Some(v) = self.param1 {
            config.param1 = v;
        }
        if let Some(v) = self.param2 {
            config.param2 = v;
        }
        if self.debug {
            config.debug = true;
        }
        if let Some(deadline) = self.deadline {
            config.deadline = Some(deadline.into());
        }

        config.validate()?;
        Ok(config)
    }
}

fn progress_bar(len: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("#>-"),
    );
    Ok(pb)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = args.analysis_config()?;

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let pb = progress_bar(0)?;
    let options = BatchOptions {
        serial: args.serial,
        progress: Some(pb.clone()),
    };

    let collection = if args.input.is_dir() {
        analyze_folder(&args.input, &args.output, &args.extension, &config, &options)?
    } else {
        pb.set_length(1);
        analyze_paths(
            std::slice::from_ref(&args.input),
            &args.output,
            &config,
            &options,
        )
    };
    pb.finish_and_clear();

    std::fs::create_dir_all(&args.output)?;
    let csv_path = args
        .csv
        .clone()
        .unwrap_or_else(|| args.output.join("droplets.csv"));
    collection.write_csv(&csv_path)?;

    println!("Images analysed: {}", collection.len());
    println!("Droplets found:  {}", collection.droplet_count());
    for record in &collection {
        if record.poor_quality {
            warn!("{}: poor quality, detections discarded", record.name);
        }
    }
    if !collection.failures().is_empty() {
        println!("Failed images:   {}", collection.failures().len());
        for failure in collection.failures() {
            println!("  {}: {}", failure.path.display(), failure.reason);
        }
    }
    info!("CSV written to {}", csv_path.display());

    Ok(())
}
