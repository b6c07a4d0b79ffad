//! Brightness measurement against the untouched native-depth raster.

use ndarray::{Array2, ArrayView2};

use super::detection::candidates::Circle;
use super::draw::ring_pixels;
use super::filter::FOREGROUND;
use super::histogram::masked_histogram_median;
use super::raster::{Raster, RasterError};
use crate::droplet::Droplet;

/// Mean native-depth intensity over the circle's one-pixel outline.
///
/// Returns 0 when no outline pixel falls inside the raster.
pub fn ring_mean(raster: &Raster, circle: &Circle) -> f64 {
    let pixels = ring_pixels(raster.dim(), circle);
    if pixels.is_empty() {
        return 0.0;
    }
    let sum: u64 = pixels
        .iter()
        .map(|&(row, col)| raster.value(row, col) as u64)
        .sum();
    sum as f64 / pixels.len() as f64
}

/// Background peak of `original` over the pixels where `foreground == 0`.
pub fn background_median(original: &Raster, foreground: ArrayView2<u8>) -> Result<f64, RasterError> {
    let inverse: Array2<u8> = foreground.mapv(|v| if v == 0 { FOREGROUND } else { 0 });
    Ok(masked_histogram_median(original, inverse.view())? as f64)
}

/// Measure every circle, keeping their order.
pub fn measure_droplets(original: &Raster, circles: &[Circle], background: f64) -> Vec<Droplet> {
    circles
        .iter()
        .map(|c| Droplet::new(*c, ring_mean(original, c), background))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_ring_mean_on_uniform_disk() {
        let mut pixels = Array2::<u16>::from_elem((60, 60), 1000);
        let circle = Circle::new(30, 30, 10);
        for (row, col) in ring_pixels((60, 60), &circle) {
            pixels[[row, col]] = 40000;
        }
        let raster = Raster::from_u16(pixels).unwrap();
        assert_relative_eq!(ring_mean(&raster, &circle), 40000.0);
    }

    #[test]
    fn test_ring_mean_outside_raster_is_zero() {
        let raster = Raster::from_u8(Array2::from_elem((10, 10), 50)).unwrap();
        assert_eq!(ring_mean(&raster, &Circle::new(-100, -100, 5)), 0.0);
    }

    #[test]
    fn test_background_ignores_foreground() {
        let mut pixels = Array2::<u8>::from_elem((20, 20), 12);
        let mut foreground = Array2::<u8>::zeros((20, 20));
        for row in 0..8 {
            for col in 0..20 {
                pixels[[row, col]] = 200;
                foreground[[row, col]] = 255;
            }
        }
        let raster = Raster::from_u8(pixels).unwrap();
        assert_eq!(background_median(&raster, foreground.view()).unwrap(), 12.0);
    }

    #[test]
    fn test_background_shape_mismatch_is_an_error() {
        let raster = Raster::from_u8(Array2::zeros((4, 4))).unwrap();
        let foreground = Array2::<u8>::zeros((4, 5));
        assert!(matches!(
            background_median(&raster, foreground.view()),
            Err(RasterError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_measure_keeps_order() {
        let raster = Raster::from_u8(Array2::from_elem((50, 50), 90)).unwrap();
        let circles = [Circle::new(10, 10, 4), Circle::new(30, 30, 6)];
        let droplets = measure_droplets(&raster, &circles, 30.0);
        assert_eq!(droplets.len(), 2);
        assert_eq!(droplets[1].circle(), circles[1]);
        assert_relative_eq!(droplets[0].adjusted_mean(), 60.0);
    }
}
