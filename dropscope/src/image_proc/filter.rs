//! Elementary 8-bit raster operations: blurs, binary threshold, masking.
//!
//! All functions are pure and allocate a fresh output array.

use imageproc::filter::median_filter;
use ndarray::{Array2, ArrayView2};

use super::raster::{array2_to_gray_image, gray_image_to_array2};

/// Value written for foreground pixels by [`threshold_binary`].
pub const FOREGROUND: u8 = 255;

/// Normalized 1D Gaussian kernel of odd `size`.
pub fn gaussian_kernel_1d(size: usize, sigma: f64) -> Vec<f64> {
    assert!(size % 2 == 1, "Gaussian kernel size must be odd");
    let half = (size / 2) as f64;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge
/// pixel (`dcb|abcd|cba`).
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

/// Separable Gaussian blur with an explicit odd kernel size.
pub fn gaussian_blur(image: ArrayView2<u8>, size: usize, sigma: f64) -> Array2<u8> {
    let kernel = gaussian_kernel_1d(size, sigma);
    let half = (size / 2) as isize;
    let (rows, cols) = image.dim();

    // Horizontal pass in float space
    let mut horizontal = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let cc = reflect_101(c as isize + k as isize - half, cols);
                acc += w * image[[r, cc]] as f64;
            }
            horizontal[[r, c]] = acc;
        }
    }

    // Vertical pass, rounding back to u8
    let mut output = Array2::<u8>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let rr = reflect_101(r as isize + k as isize - half, rows);
                acc += w * horizontal[[rr, c]];
            }
            output[[r, c]] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    output
}

/// Median filter over an odd square aperture; borders replicate the edge pixel.
pub fn median_blur(image: ArrayView2<u8>, aperture: usize) -> Array2<u8> {
    assert!(aperture % 2 == 1, "median aperture must be odd");
    let radius = (aperture / 2) as u32;
    let filtered = median_filter(&array2_to_gray_image(&image.to_owned()), radius, radius);
    gray_image_to_array2(&filtered)
}

/// Binary threshold: pixels strictly above `threshold` become [`FOREGROUND`],
/// everything else 0.
pub fn threshold_binary(image: ArrayView2<u8>, threshold: u8) -> Array2<u8> {
    image.mapv(|v| if v > threshold { FOREGROUND } else { 0 })
}

/// Bitwise AND of a raster with a mask (both 8-bit).
pub fn apply_mask(image: ArrayView2<u8>, mask: ArrayView2<u8>) -> Array2<u8> {
    let mut output = image.to_owned();
    output.zip_mut_with(&mask, |v, &m| *v &= m);
    output
}

/// Mean pixel value over the whole raster.
pub fn mean_u8(image: ArrayView2<u8>) -> f64 {
    let n = image.len();
    if n == 0 {
        return 0.0;
    }
    image.iter().map(|&v| v as u64).sum::<u64>() as f64 / n as f64
}

/// Smoothing chain applied to the masked image before circle detection.
///
/// The median passes strip isolated background specks, the Gaussian passes
/// fill in and round off droplet interiors.
pub fn detection_blur(masked: ArrayView2<u8>) -> Array2<u8> {
    let med1 = median_blur(masked, 3);
    let gauss1 = gaussian_blur(med1.view(), 3, 1.0);
    let med2 = median_blur(gauss1.view(), 5);
    gaussian_blur(med2.view(), 3, 1.0)
}
