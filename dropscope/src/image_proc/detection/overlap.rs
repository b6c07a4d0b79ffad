//! Recovery of large droplets that the first detection pass split into
//! several overlapping circles.
//!
//! Accepted circles are accumulated into a coverage raster; wherever two or
//! more disks overlap, the participating circles are grouped into clusters,
//! the clusters are grown over the blurred foreground with a seeded
//! watershed, and each sufficiently large grown region is searched again for
//! a single bigger circle. A cluster is only merged when that local search
//! is unambiguous: exactly one circle which also passes the false-positive
//! check. Otherwise the original circles stay as they are.

use log::debug;
use ndarray::{Array2, ArrayView2, Zip};

use super::aabb::AABB;
use super::candidates::{CandidateSet, Circle};
use super::false_positive::is_false_positive;
use super::hough::{CircleDetector, HoughParams};
use crate::image_proc::draw::{disk_pixels, outline_circle, outline_rect};
use crate::image_proc::filter::FOREGROUND;
use crate::image_proc::segment::{connected_components, find_regions, watershed};

/// Gray level used to outline search windows and merged circles on the
/// debug rasters.
pub const DEBUG_OUTLINE: u8 = 100;

/// Tuning for the overlap pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapSettings {
    /// First-pass detector parameters; the local search relaxes these.
    pub detection: HoughParams,
    /// Regions must exceed `merge_area_factor * max_radius²` pixels.
    pub merge_area_factor: f64,
    /// Search window padding on each side, as a fraction of region size.
    pub merge_padding: f64,
    pub false_positive_fraction: f64,
}

impl OverlapSettings {
    /// Minimum region area (exclusive) worth searching for a merged droplet.
    pub fn min_region_area(&self) -> f64 {
        let max_r = self.detection.max_radius as f64;
        self.merge_area_factor * max_r * max_r
    }

    /// Relaxed detector parameters for a search window of `block_size` pixels.
    ///
    /// `min_dist` equals the window size, so the gradient detector returns at
    /// most one circle per window; several results only come from other
    /// [`CircleDetector`] implementations.
    pub fn local_params(&self, block_size: usize) -> HoughParams {
        let base = &self.detection;
        let min_radius = ((base.max_radius as f64 * 0.5) as i32).max(base.min_radius);
        HoughParams {
            dp: base.dp,
            min_dist: block_size as f64,
            param1: (base.param1 * 0.5).trunc(),
            param2: (base.param2 * 0.5).trunc(),
            min_radius,
            max_radius: block_size as i32,
        }
    }
}

/// One successful merge: the new circle and the circles it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeEvent {
    pub merged: Circle,
    pub replaced: Vec<Circle>,
}

/// Debug rasters and merge log of one overlap pass.
#[derive(Debug, Clone)]
pub struct OverlapOutcome {
    /// Disk coverage counts, with search windows outlined
    pub overlapping: Array2<u8>,
    /// Binary watershed result (label > 1 is foreground)
    pub markers: Array2<u8>,
    /// Windowed regions handed to the local search, with merged circles outlined
    pub overlap_result: Array2<u8>,
    pub merges: Vec<MergeEvent>,
}

impl OverlapOutcome {
    fn empty(shape: (usize, usize), overlapping: Array2<u8>) -> Self {
        Self {
            overlapping,
            markers: Array2::zeros(shape),
            overlap_result: Array2::zeros(shape),
            merges: Vec::new(),
        }
    }

    pub fn had_overlap(&self) -> bool {
        self.overlapping.iter().any(|&v| v > 1)
    }
}

/// Odd search size derived from a region's bounding box.
pub fn block_size(bbox: &AABB) -> usize {
    let size = (bbox.width() as f64 * 1.5).max(bbox.height() as f64 * 1.5) as usize;
    if size % 2 == 1 {
        size
    } else {
        size + 1
    }
}

/// Coverage raster: the number of accepted disks covering each pixel.
pub fn coverage(shape: (usize, usize), circles: &[Circle]) -> Array2<u8> {
    let mut counts = Array2::<u8>::zeros(shape);
    for circle in circles {
        for (row, col) in disk_pixels(shape, circle) {
            counts[[row, col]] = counts[[row, col]].saturating_add(1);
        }
    }
    counts
}

/// Mask of every disk that shares at least one pixel with another disk.
pub fn overlapping_disks(coverage: ArrayView2<u8>, circles: &[Circle]) -> Array2<u8> {
    let shape = coverage.dim();
    let mut mask = Array2::<u8>::zeros(shape);
    for circle in circles {
        let pixels = disk_pixels(shape, circle);
        if pixels.iter().any(|&p| coverage[p] >= 2) {
            for p in pixels {
                mask[p] = FOREGROUND;
            }
        }
    }
    mask
}

/// Overlap pass over a candidate set.
pub struct OverlapResolver<'a, D: CircleDetector + ?Sized> {
    detector: &'a D,
    settings: OverlapSettings,
}

impl<'a, D: CircleDetector + ?Sized> OverlapResolver<'a, D> {
    pub fn new(detector: &'a D, settings: OverlapSettings) -> Self {
        Self { detector, settings }
    }

    /// Grow overlap clusters and merge those with an unambiguous replacement.
    ///
    /// `blurred` is the detection image; `blurred_threshed` its binary
    /// foreground, used for the false-positive check on merged circles.
    pub fn resolve(
        &self,
        candidates: &mut CandidateSet,
        blurred: ArrayView2<u8>,
        blurred_threshed: ArrayView2<u8>,
    ) -> OverlapOutcome {
        let shape = blurred.dim();
        let mut overlapping = coverage(shape, candidates.accepted());
        if !overlapping.iter().any(|&v| v > 1) {
            return OverlapOutcome::empty(shape, overlapping);
        }

        let clusters = overlapping_disks(overlapping.view(), candidates.accepted());
        let grown = self.grow_clusters(clusters.view(), blurred);

        let mut overlap_result = Array2::<u8>::zeros(shape);
        let mut merges = Vec::new();
        let min_area = self.settings.min_region_area();

        for region in find_regions(grown.view()) {
            if region.area as f64 <= min_area {
                continue;
            }

            let window = region
                .bbox
                .with_fractional_padding(self.settings.merge_padding, shape);
            outline_rect(&mut overlapping, &window, DEBUG_OUTLINE);

            let mut local = Array2::<u8>::zeros(shape);
            for row in window.min_row..=window.max_row {
                for col in window.min_col..=window.max_col {
                    local[[row, col]] = grown[[row, col]];
                }
            }
            Zip::from(&mut overlap_result)
                .and(&local)
                .for_each(|acc, &v| *acc |= v);

            let params = self.settings.local_params(block_size(&region.bbox));
            let found = self.detector.detect(local.view(), &params);
            debug!(
                "overlap region {:?} (area {}): local search found {} circle(s)",
                region.bbox.to_tuple(),
                region.area,
                found.len()
            );

            let [merged] = found.as_slice() else {
                continue;
            };
            if is_false_positive(
                blurred_threshed,
                merged,
                self.settings.false_positive_fraction,
            ) {
                debug!("merged circle {merged:?} rejected as false positive");
                continue;
            }

            let replaced = candidates.replace_cluster(*merged);
            outline_circle(&mut overlap_result, merged, DEBUG_OUTLINE);
            merges.push(MergeEvent {
                merged: *merged,
                replaced,
            });
        }

        OverlapOutcome {
            overlapping,
            markers: grown,
            overlap_result,
            merges,
        }
    }

    /// Flood the blurred foreground from the labelled clusters.
    ///
    /// Everything outside both the clusters and the foreground seeds the
    /// background basin; foreground pixels outside any cluster (and cluster
    /// pixels outside the foreground) are left for the flood to decide.
    fn grow_clusters(&self, clusters: ArrayView2<u8>, blurred: ArrayView2<u8>) -> Array2<u8> {
        let (labels, count) = connected_components(clusters);
        debug!("overlap: {count} cluster(s)");

        let mut markers = labels.mapv(|l| l as i32 + 1);
        Zip::from(&mut markers)
            .and(&clusters)
            .and(&blurred)
            .for_each(|m, &c, &b| {
                let in_cluster = c != 0;
                let in_foreground = b > 1;
                if in_cluster != in_foreground {
                    *m = 0;
                }
            });

        watershed(blurred, &mut markers);
        markers.mapv(|m| if m > 1 { FOREGROUND } else { 0 })
    }
}
