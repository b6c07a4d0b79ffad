//! The per-image droplet analysis.
//!
//! ```text
//! raster -> 8-bit copy -> adaptive threshold -> detection blur
//!        -> circle detection -> false-positive filter -> overlap merge
//!        -> ring brightness + background peak -> ImageRecord
//! ```
//!
//! Each call owns all of its intermediate rasters, so images can be analysed
//! concurrently without coordination.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use image::DynamicImage;
use log::{debug, info, warn};
use ndarray::Array2;
use thiserror::Error;

use crate::config::{AnalysisConfig, ConfigError};
use crate::droplet::{record_name, DebugStage, ImageRecord};
use crate::image_proc::detection::candidates::CandidateSet;
use crate::image_proc::detection::false_positive::is_false_positive;
use crate::image_proc::detection::hough::{CircleDetector, HoughGradient};
use crate::image_proc::detection::overlap::OverlapResolver;
use crate::image_proc::filter::{detection_blur, threshold_binary};
use crate::image_proc::measure::{background_median, measure_droplets};
use crate::image_proc::raster::{array2_to_gray_image, normalize_to_8bit, Raster, RasterError};
use crate::image_proc::thresholding::{adaptive_threshold, ThresholdStop};
use crate::output::annotate;

/// Note attached to frames that fail the quality gate.
pub const POOR_QUALITY_NOTE: &str = "No droplets or image is poor quality";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid input path {0}")]
    InvalidPath(String),
}

/// Decode and analyse one image file with the gradient Hough detector.
pub fn analyze_image(path: &Path, config: &AnalysisConfig) -> Result<ImageRecord, AnalysisError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AnalysisError::InvalidPath(path.display().to_string()))?;
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("png");

    let raster = Raster::open(path)?;
    debug!(
        "Loaded {} ({}x{}, {}-bit)",
        path.display(),
        raster.dim().1,
        raster.dim().0,
        raster.bit_depth()
    );
    analyze_raster(&record_name(stem, extension), &raster, config, &HoughGradient)
}

/// 8-bit working copy of a raster; 16-bit data is min-max stretched.
fn working_copy(original: &Raster) -> Result<Array2<u8>, RasterError> {
    match original {
        Raster::Gray8(pixels) => Ok(pixels.clone()),
        Raster::Gray16(_) => normalize_to_8bit(original),
    }
}

fn gray(pixels: &Array2<u8>) -> DynamicImage {
    DynamicImage::ImageLuma8(array2_to_gray_image(pixels))
}

/// Analyse an in-memory raster with any circle detector.
pub fn analyze_raster<D: CircleDetector + ?Sized>(
    name: &str,
    original: &Raster,
    config: &AnalysisConfig,
    detector: &D,
) -> Result<ImageRecord, AnalysisError> {
    config.validate()?;
    let deadline = config.deadline.map(|d| Instant::now() + d);
    let mut notes = Vec::new();
    // Notes that are also written onto the annotated images
    let mut banners = Vec::new();

    let working = working_copy(original)?;

    let thresholded = adaptive_threshold(working.view(), &config.threshold_settings(), deadline);
    if thresholded.passes > 0 {
        banners.push(format!("re-filtered {} time(s)", thresholded.passes));
    }
    match thresholded.stop {
        ThresholdStop::Converged => {}
        ThresholdStop::PassLimit => banners.push(format!(
            "poor quality: mask still noisy after {} re-threshold passes",
            thresholded.passes
        )),
        ThresholdStop::Deadline => {
            banners.push("poor quality: re-thresholding stopped at deadline".to_string())
        }
    }
    notes.extend(banners.iter().cloned());

    let blurred = detection_blur(thresholded.masked.view());
    let blurred_threshed = threshold_binary(blurred.view(), 0);

    let mask_mean = thresholded.mask_mean();
    let poor_quality = mask_mean >= config.quality_gate;

    let mut candidates = if poor_quality {
        warn!("{name}: mask mean {mask_mean:.1} fails the quality gate, skipping detection");
        CandidateSet::default()
    } else {
        CandidateSet::new(detector.detect(blurred.view(), &config.hough_params()))
    };
    debug!("{name}: {} first-pass circles", candidates.accepted().len());

    let false_positives = candidates.reject_where(|c| {
        is_false_positive(blurred_threshed.view(), c, config.false_positive_fraction)
    });
    if false_positives > 0 {
        debug!("{name}: {false_positives} false positive(s) rejected");
    }

    let resolver = OverlapResolver::new(detector, config.overlap_settings());
    let overlap = resolver.resolve(&mut candidates, blurred.view(), blurred_threshed.view());
    if overlap.had_overlap() {
        debug!("{name}: {} overlap merge(s)", overlap.merges.len());
    }
    for merge in &overlap.merges {
        notes.push(format!(
            "merged {} circle(s) into ({}, {}) r={}",
            merge.replaced.len(),
            merge.merged.x,
            merge.merged.y,
            merge.merged.r
        ));
    }

    let (accepted, rejected) = candidates.into_parts();
    let verdict = if poor_quality {
        Some(POOR_QUALITY_NOTE)
    } else if accepted.is_empty() {
        Some("no droplets found")
    } else {
        None
    };
    if let Some(verdict) = verdict {
        notes.push(verdict.to_string());
        banners.push(verdict.to_string());
    }

    let background = background_median(original, blurred_threshed.view())?;
    let droplets = measure_droplets(original, &accepted, background);

    let (final_image, all_droplets) = annotate(&working, &accepted, &rejected, &banners);

    let mut debug_rasters = BTreeMap::new();
    if config.debug {
        debug_rasters.insert(DebugStage::Original, original.to_dynamic());
        debug_rasters.insert(DebugStage::Mask, gray(&thresholded.mask));
        debug_rasters.insert(DebugStage::Blurred, gray(&blurred));
        debug_rasters.insert(DebugStage::Overlapping, gray(&overlap.overlapping));
        debug_rasters.insert(DebugStage::Markers, gray(&overlap.markers));
        debug_rasters.insert(DebugStage::OverlapResult, gray(&overlap.overlap_result));
        debug_rasters.insert(DebugStage::AllDroplets, DynamicImage::ImageRgb8(all_droplets));
    }
    debug_rasters.insert(DebugStage::Final, DynamicImage::ImageRgb8(final_image));

    for note in &notes {
        debug!("{name}: {note}");
    }
    info!(
        "{name}: {} droplet(s), {} rejected, background {background}",
        droplets.len(),
        rejected.len()
    );

    Ok(ImageRecord {
        name: name.to_string(),
        droplets,
        rejected,
        background_median: background,
        rethreshold_passes: thresholded.passes,
        poor_quality,
        notes,
        debug_rasters,
    })
}
