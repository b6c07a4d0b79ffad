//! Per-droplet and per-image results.

use std::collections::BTreeMap;
use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::image_proc::detection::candidates::Circle;

/// A measured droplet.
///
/// Built once, after measurement; the background-subtracted brightness is
/// derived on demand rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Droplet {
    pub x: i32,
    pub y: i32,
    pub r: i32,
    /// Mean native-depth intensity along the droplet outline
    pub raw_mean: f64,
    /// Background peak of the image this droplet belongs to
    pub background_median: f64,
}

impl Droplet {
    pub fn new(circle: Circle, raw_mean: f64, background_median: f64) -> Self {
        Self {
            x: circle.x,
            y: circle.y,
            r: circle.r,
            raw_mean,
            background_median,
        }
    }

    pub fn circle(&self) -> Circle {
        Circle::new(self.x, self.y, self.r)
    }

    pub fn adjusted_mean(&self) -> f64 {
        self.raw_mean - self.background_median
    }

    /// Raw mean rounded to two decimals, as reported in exports.
    pub fn rounded_raw_mean(&self) -> f64 {
        (self.raw_mean * 100.0).round() / 100.0
    }

    /// Adjusted mean as reported in exports: rounded raw mean minus background.
    pub fn reported_adjusted_mean(&self) -> f64 {
        self.rounded_raw_mean() - self.background_median
    }
}

/// Intermediate rasters kept for inspection, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DebugStage {
    Original,
    Mask,
    Blurred,
    Overlapping,
    Markers,
    OverlapResult,
    AllDroplets,
    Final,
}

impl DebugStage {
    pub const ALL: [DebugStage; 8] = [
        DebugStage::Original,
        DebugStage::Mask,
        DebugStage::Blurred,
        DebugStage::Overlapping,
        DebugStage::Markers,
        DebugStage::OverlapResult,
        DebugStage::AllDroplets,
        DebugStage::Final,
    ];

    /// Position in the pipeline, used as the file name prefix.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            DebugStage::Original => "original",
            DebugStage::Mask => "mask",
            DebugStage::Blurred => "blurred",
            DebugStage::Overlapping => "overlapping",
            DebugStage::Markers => "markers",
            DebugStage::OverlapResult => "overlapResult",
            DebugStage::AllDroplets => "allDroplets",
            DebugStage::Final => "final",
        }
    }

    /// `"<index>-<name>.png"`, sorting in pipeline order.
    pub fn file_name(self) -> String {
        format!("{}-{}.png", self.index(), self.name())
    }
}

impl fmt::Display for DebugStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything the pipeline produced for one source image.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub name: String,
    /// Accepted droplets in detection-completion order
    pub droplets: Vec<Droplet>,
    /// Circles rejected as false positives or replaced by merges
    pub rejected: Vec<Circle>,
    pub background_median: f64,
    /// Re-threshold passes the frame needed
    pub rethreshold_passes: usize,
    /// The frame failed the quality gate and its detections were discarded
    pub poor_quality: bool,
    /// Human-readable annotations, in the order they were made
    pub notes: Vec<String>,
    pub debug_rasters: BTreeMap<DebugStage, DynamicImage>,
}

impl ImageRecord {
    pub fn droplet_count(&self) -> usize {
        self.droplets.len()
    }

    pub fn debug_raster(&self, stage: DebugStage) -> Option<&DynamicImage> {
        self.debug_rasters.get(&stage)
    }

    /// The annotated output image.
    pub fn final_image(&self) -> Option<&DynamicImage> {
        self.debug_raster(DebugStage::Final)
    }
}

/// Record name for a source file: the stem with `-` replaced by `_` and `.`
/// by `-`, followed by `.<extension>`.
pub fn record_name(stem: &str, extension: &str) -> String {
    format!("{}.{}", sanitize_stem(stem), extension)
}

/// File stem with `-` replaced by `_` and `.` by `-`.
pub fn sanitize_stem(stem: &str) -> String {
    stem.replace('-', "_").replace('.', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_adjusted_mean() {
        let d = Droplet::new(Circle::new(10, 12, 5), 180.456, 20.0);
        assert_relative_eq!(d.adjusted_mean(), 160.456, epsilon = 1e-9);
        assert_relative_eq!(d.rounded_raw_mean(), 180.46, epsilon = 1e-9);
        assert_relative_eq!(d.reported_adjusted_mean(), 160.46, epsilon = 1e-9);
        assert_eq!(d.circle(), Circle::new(10, 12, 5));
    }

    #[test]
    fn test_debug_stage_file_names_are_ordered() {
        let names: Vec<String> = DebugStage::ALL.iter().map(|s| s.file_name()).collect();
        assert_eq!(names[0], "0-original.png");
        assert_eq!(names[5], "5-overlapResult.png");
        assert_eq!(names[7], "7-final.png");

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, names);
    }

    #[test]
    fn test_record_name() {
        assert_eq!(record_name("run-3.tile.02", "tif"), "run_3-tile-02.tif");
        assert_eq!(record_name("plain", "png"), "plain.png");
    }
}
