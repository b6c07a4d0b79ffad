//! Gradient Hough transform for circular droplets.
//!
//! Edge pixels (Canny) vote along their Sobel gradient direction into a
//! center accumulator; accumulator peaks become candidate centers and each
//! center is assigned the radius best supported by the surrounding edge
//! pixels. Sensitivity follows the familiar `dp`/`param1`/`param2` knobs:
//!
//! - `dp`: inverse accumulator resolution (1 = full resolution)
//! - `param1`: upper Canny threshold; the lower one is half of it
//! - `param2`: minimum accumulator votes for a center and minimum edge
//!   support for its radius; lower values detect more (and falser) circles
//!
//! The transform is deterministic: candidates are ordered by vote count with
//! ties broken by raster position.

use std::cmp::Reverse;

use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::debug;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::candidates::Circle;
use crate::image_proc::raster::array2_to_gray_image;

/// Parameters for a single detector invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoughParams {
    pub dp: f64,
    /// Minimum distance between accepted centers, in pixels
    pub min_dist: f64,
    pub param1: f64,
    pub param2: f64,
    pub min_radius: i32,
    pub max_radius: i32,
}

impl HoughParams {
    /// Parameters with the default center spacing of `2 * min_radius + 1`.
    pub fn new(dp: f64, param1: f64, param2: f64, min_radius: i32, max_radius: i32) -> Self {
        Self {
            dp,
            min_dist: (2 * min_radius + 1) as f64,
            param1,
            param2,
            min_radius,
            max_radius,
        }
    }
}

/// Anything able to find circles in an 8-bit raster.
///
/// The pipeline is written against this trait so the local re-detection in
/// the overlap pass can be exercised with scripted detectors in tests.
pub trait CircleDetector {
    fn detect(&self, image: ArrayView2<u8>, params: &HoughParams) -> Vec<Circle>;
}

/// The gradient Hough circle transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoughGradient;

impl CircleDetector for HoughGradient {
    fn detect(&self, image: ArrayView2<u8>, params: &HoughParams) -> Vec<Circle> {
        hough_circles(image, params)
    }
}

/// Edge pixel with its unit gradient direction.
#[derive(Debug, Clone, Copy)]
struct EdgePoint {
    x: f64,
    y: f64,
    ux: f64,
    uy: f64,
}

fn collect_edge_points(image: ArrayView2<u8>, param1: f64) -> Vec<EdgePoint> {
    let gray = array2_to_gray_image(&image.to_owned());
    let high = param1.max(1.0) as f32;
    let low = high / 2.0;

    let edges = canny(&gray, low, high);
    let gx = horizontal_sobel(&gray);
    let gy = vertical_sobel(&gray);

    let mut points = Vec::new();
    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let vx = gx.get_pixel(x, y)[0] as f64;
        let vy = gy.get_pixel(x, y)[0] as f64;
        let mag = vx.hypot(vy);
        if mag < f64::EPSILON {
            continue;
        }
        points.push(EdgePoint {
            x: x as f64,
            y: y as f64,
            ux: vx / mag,
            uy: vy / mag,
        });
    }

    // enumerate_pixels walks row-major already; sort anyway so the order never
    // depends on the image backend.
    points.sort_by(|a, b| {
        a.y.partial_cmp(&b.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });
    points
}

/// Run the transform and return circles in candidate order.
pub fn hough_circles(image: ArrayView2<u8>, params: &HoughParams) -> Vec<Circle> {
    let (rows, cols) = image.dim();
    if rows < 3 || cols < 3 || params.dp <= 0.0 {
        return Vec::new();
    }

    let min_radius = params.min_radius.max(0);
    let max_radius = if params.max_radius <= 0 {
        rows.max(cols) as i32
    } else {
        params.max_radius
    };
    if max_radius < min_radius {
        return Vec::new();
    }

    let edge_points = collect_edge_points(image, params.param1);
    if edge_points.is_empty() {
        debug!("hough: no edge pixels");
        return Vec::new();
    }

    let dp = params.dp;
    let accumulator = vote(&edge_points, (rows, cols), dp, min_radius, max_radius);
    let centers = find_center_candidates(&accumulator, params.param2);
    debug!(
        "hough: {} edge pixels, {} center candidates",
        edge_points.len(),
        centers.len()
    );

    let min_dist_sq = params.min_dist * params.min_dist;
    let mut circles: Vec<Circle> = Vec::new();
    let mut accepted_centers: Vec<(f64, f64)> = Vec::new();

    for (_, arow, acol) in centers {
        let cx = (acol - 1) as f64 * dp;
        let cy = (arow - 1) as f64 * dp;

        let too_close = accepted_centers.iter().any(|&(ax, ay)| {
            let dx = ax - cx;
            let dy = ay - cy;
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }

        if let Some(r) = estimate_radius(&edge_points, (cx, cy), min_radius, max_radius, params.param2)
        {
            accepted_centers.push((cx, cy));
            circles.push(Circle::new(cx.round() as i32, cy.round() as i32, r));
        }
    }

    circles
}

/// Accumulate votes along each edge pixel's gradient line, both directions.
///
/// The accumulator has a one-cell border so neighbour comparisons never leave
/// the array; cell `(row + 1, col + 1)` holds votes for center `(col, row) * dp`.
fn vote(
    edge_points: &[EdgePoint],
    shape: (usize, usize),
    dp: f64,
    min_radius: i32,
    max_radius: i32,
) -> Array2<u32> {
    let (rows, cols) = shape;
    let arows = (rows as f64 / dp).ceil() as usize;
    let acols = (cols as f64 / dp).ceil() as usize;
    let mut accumulator = Array2::<u32>::zeros((arows + 2, acols + 2));

    let step_min = (min_radius as f64 / dp).ceil().max(0.0) as i64;
    let step_max = (max_radius as f64 / dp).floor() as i64;

    for p in edge_points {
        let ax = p.x / dp;
        let ay = p.y / dp;
        for direction in [1.0, -1.0] {
            for step in step_min..=step_max {
                let s = direction * step as f64;
                let col = (ax + s * p.ux).round();
                let row = (ay + s * p.uy).round();
                if col < 0.0 || row < 0.0 || col >= acols as f64 || row >= arows as f64 {
                    break;
                }
                accumulator[[row as usize + 1, col as usize + 1]] += 1;
            }
        }
    }

    accumulator
}

/// Local maxima above `threshold`, sorted by votes (descending) then raster order.
fn find_center_candidates(accumulator: &Array2<u32>, threshold: f64) -> Vec<(u32, usize, usize)> {
    let (arows, acols) = accumulator.dim();
    let mut centers = Vec::new();

    for row in 1..arows.saturating_sub(1) {
        for col in 1..acols.saturating_sub(1) {
            let v = accumulator[[row, col]];
            if (v as f64) > threshold
                && v > accumulator[[row, col - 1]]
                && v >= accumulator[[row, col + 1]]
                && v > accumulator[[row - 1, col]]
                && v >= accumulator[[row + 1, col]]
            {
                centers.push((v, row, col));
            }
        }
    }

    centers.sort_by_key(|&(v, row, col)| (Reverse(v), row, col));
    centers
}

/// Radius in `[min_radius, max_radius]` with the best edge support per unit
/// radius, provided that support exceeds `min_support` pixels.
fn estimate_radius(
    edge_points: &[EdgePoint],
    center: (f64, f64),
    min_radius: i32,
    max_radius: i32,
    min_support: f64,
) -> Option<i32> {
    let bins = (max_radius - min_radius + 1) as usize;
    let mut support = vec![0u32; bins];

    for p in edge_points {
        let d = (p.x - center.0).hypot(p.y - center.1).round() as i64;
        if d >= min_radius as i64 && d <= max_radius as i64 {
            support[(d - min_radius as i64) as usize] += 1;
        }
    }

    let mut best: Option<(i32, u32)> = None;
    let mut best_score = 0.0;
    for (i, &count) in support.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let r = min_radius + i as i32;
        let score = count as f64 / r.max(1) as f64;
        if score > best_score {
            best_score = score;
            best = Some((r, count));
        }
    }

    match best {
        Some((r, count)) if count as f64 > min_support => Some(r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::draw::disk_pixels;
    use crate::image_proc::filter::gaussian_blur;

    fn disk_image(shape: (usize, usize), circles: &[(i32, i32, i32)], value: u8) -> Array2<u8> {
        let mut image = Array2::<u8>::zeros(shape);
        for &(x, y, r) in circles {
            for (row, col) in disk_pixels(shape, &Circle::new(x, y, r)) {
                image[[row, col]] = value;
            }
        }
        gaussian_blur(image.view(), 3, 1.0)
    }

    #[test]
    fn test_uniform_images_have_no_circles() {
        let params = HoughParams::new(1.0, 15.0, 15.0, 5, 30);
        for value in [0u8, 90, 255] {
            let image = Array2::from_elem((80, 80), value);
            assert!(HoughGradient.detect(image.view(), &params).is_empty());
        }
    }

    #[test]
    fn test_single_disk_found() {
        let image = disk_image((120, 120), &[(60, 55, 18)], 200);
        let params = HoughParams::new(1.0, 15.0, 15.0, 5, 30);
        let circles = HoughGradient.detect(image.view(), &params);

        assert_eq!(circles.len(), 1, "found {circles:?}");
        let c = circles[0];
        assert!((c.x - 60).abs() <= 2);
        assert!((c.y - 55).abs() <= 2);
        assert!((c.r - 18).abs() <= 2);
    }

    #[test]
    fn test_two_separate_disks_found() {
        let image = disk_image((120, 200), &[(50, 60, 15), (150, 60, 20)], 220);
        let params = HoughParams::new(1.0, 15.0, 15.0, 5, 30);
        let mut circles = HoughGradient.detect(image.view(), &params);
        circles.sort_by_key(|c| c.x);

        assert_eq!(circles.len(), 2, "found {circles:?}");
        assert!((circles[0].x - 50).abs() <= 2);
        assert!((circles[1].x - 150).abs() <= 2);
        assert!((circles[1].r - 20).abs() <= 2);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let image = disk_image((100, 160), &[(40, 50, 12), (110, 45, 16)], 180);
        let params = HoughParams::new(1.0, 15.0, 15.0, 5, 30);
        let first = HoughGradient.detect(image.view(), &params);
        let second = HoughGradient.detect(image.view(), &params);
        assert_eq!(first, second);
    }

    #[test]
    fn test_candidate_ordering() {
        let mut acc = Array2::<u32>::zeros((6, 6));
        acc[[2, 2]] = 20;
        acc[[2, 4]] = 30;
        acc[[4, 1]] = 20;
        let centers = find_center_candidates(&acc, 15.0);
        assert_eq!(centers, vec![(30, 2, 4), (20, 2, 2), (20, 4, 1)]);
    }

    #[test]
    fn test_inverted_radius_range_is_empty() {
        let image = disk_image((60, 60), &[(30, 30, 10)], 200);
        let params = HoughParams::new(1.0, 15.0, 15.0, 20, 10);
        assert!(HoughGradient.detect(image.view(), &params).is_empty());
    }
}
