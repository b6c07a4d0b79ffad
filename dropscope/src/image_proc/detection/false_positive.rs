//! Rejection of circles that sit mostly on thresholded background.

use ndarray::ArrayView2;

use super::candidates::Circle;
use crate::image_proc::draw::disk_pixels;

/// Fraction of the circle's filled disk where `thresholded == 0`.
///
/// Returns `None` when the disk lies entirely outside the raster.
pub fn background_fraction(thresholded: ArrayView2<u8>, circle: &Circle) -> Option<f64> {
    let pixels = disk_pixels(thresholded.dim(), circle);
    if pixels.is_empty() {
        return None;
    }

    let background = pixels
        .iter()
        .filter(|&&(row, col)| thresholded[[row, col]] == 0)
        .count();
    Some(background as f64 / pixels.len() as f64)
}

/// True when more than `max_fraction` of the disk is background.
///
/// A disk with no pixels inside the raster is always a false positive.
pub fn is_false_positive(thresholded: ArrayView2<u8>, circle: &Circle, max_fraction: f64) -> bool {
    match background_fraction(thresholded, circle) {
        Some(fraction) => fraction > max_fraction,
        None => true,
    }
}
