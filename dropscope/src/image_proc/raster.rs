//! Single-channel rasters at native bit depth.
//!
//! Microscope frames arrive as either 8-bit or 16-bit grayscale images. The
//! pipeline needs both views of the same frame: an 8-bit copy for detection
//! (thresholding, blurring and circle finding all operate on `u8`) and the
//! untouched native-depth pixels for brightness measurement. [`Raster`] keeps
//! the depth as a tagged variant so histogram sizing is decided once, when the
//! raster is constructed, rather than inferred per call.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Errors raised at the raster boundary.
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("unsupported pixel format {0}: expected single-channel 8-bit or 16-bit grayscale")]
    UnsupportedFormat(String),
    #[error("raster is empty ({width}x{height})")]
    Empty { width: usize, height: usize },
    #[error("expected a {expected}-bit raster, got {actual}-bit")]
    WrongDepth { expected: u8, actual: u8 },
    #[error("mask shape {mask:?} does not match raster shape {raster:?}")]
    ShapeMismatch {
        raster: (usize, usize),
        mask: (usize, usize),
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A grayscale raster tagged with its bit depth.
///
/// Arrays are indexed `[[row, col]]`, i.e. `[[y, x]]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    Gray8(Array2<u8>),
    Gray16(Array2<u16>),
}

impl Raster {
    /// Wrap an 8-bit array, rejecting empty input.
    pub fn from_u8(pixels: Array2<u8>) -> Result<Self, RasterError> {
        check_not_empty(pixels.dim())?;
        Ok(Raster::Gray8(pixels))
    }

    /// Wrap a 16-bit array, rejecting empty input.
    pub fn from_u16(pixels: Array2<u16>) -> Result<Self, RasterError> {
        check_not_empty(pixels.dim())?;
        Ok(Raster::Gray16(pixels))
    }

    /// Convert a decoded image, accepting only `L8` and `L16` layouts.
    ///
    /// Color or alpha images are refused rather than silently converted.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, RasterError> {
        match image {
            DynamicImage::ImageLuma8(gray) => Raster::from_u8(gray_image_to_array2(&gray)),
            DynamicImage::ImageLuma16(gray) => {
                let (width, height) = gray.dimensions();
                let pixels = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
                    gray.get_pixel(x as u32, y as u32)[0]
                });
                Raster::from_u16(pixels)
            }
            other => Err(RasterError::UnsupportedFormat(format!("{:?}", other.color()))),
        }
    }

    /// Decode a raster from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RasterError> {
        let image = image::open(path)?;
        Raster::from_dynamic(image)
    }

    /// Bits per pixel of the native data.
    pub fn bit_depth(&self) -> u8 {
        match self {
            Raster::Gray8(_) => 8,
            Raster::Gray16(_) => 16,
        }
    }

    /// Number of histogram bins needed to cover every representable value.
    pub fn histogram_bins(&self) -> usize {
        1usize << self.bit_depth()
    }

    /// Raster shape as `(rows, cols)`.
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Raster::Gray8(a) => a.dim(),
            Raster::Gray16(a) => a.dim(),
        }
    }

    /// Pixel value widened to `u32`.
    pub fn value(&self, row: usize, col: usize) -> u32 {
        match self {
            Raster::Gray8(a) => a[[row, col]] as u32,
            Raster::Gray16(a) => a[[row, col]] as u32,
        }
    }

    /// Image representation for writing debug output at native depth.
    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            Raster::Gray8(a) => DynamicImage::ImageLuma8(array2_to_gray_image(a)),
            Raster::Gray16(a) => {
                let (height, width) = a.dim();
                let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
                    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
                        Luma([a[[y as usize, x as usize]]])
                    });
                DynamicImage::ImageLuma16(buffer)
            }
        }
    }
}

fn check_not_empty((height, width): (usize, usize)) -> Result<(), RasterError> {
    if width == 0 || height == 0 {
        return Err(RasterError::Empty { width, height });
    }
    Ok(())
}

/// Linear min-max stretch of a 16-bit raster into `[0, 255]`.
///
/// Fails with [`RasterError::WrongDepth`] for anything other than 16-bit input.
/// A flat raster (max == min) maps to all zeros.
pub fn normalize_to_8bit(raster: &Raster) -> Result<Array2<u8>, RasterError> {
    match raster {
        Raster::Gray16(a) => Ok(stretch_u16(a.view())),
        other => Err(RasterError::WrongDepth {
            expected: 16,
            actual: other.bit_depth(),
        }),
    }
}

fn stretch_u16(pixels: ArrayView2<u16>) -> Array2<u8> {
    let min = pixels.iter().copied().min().unwrap_or(0) as f64;
    let max = pixels.iter().copied().max().unwrap_or(0) as f64;
    let range = max - min;
    let scale = if range > f64::EPSILON {
        255.0 / range
    } else {
        0.0
    };

    pixels.mapv(|v| ((v as f64 - min) * scale).round().clamp(0.0, 255.0) as u8)
}

/// Converts an ndarray Array2<u8> to an image::GrayImage
///
/// Array indices `[y, x]` map to pixel coordinates `(x, y)`; array dimensions are
/// (height, width) while image dimensions are (width, height).
pub fn array2_to_gray_image(arr: &Array2<u8>) -> GrayImage {
    let (height, width) = arr.dim();
    let mut img = GrayImage::new(width as u32, height as u32);

    for y in 0..height {
        for x in 0..width {
            img.put_pixel(x as u32, y as u32, Luma([arr[[y, x]]]));
        }
    }

    img
}

/// Inverse of [`array2_to_gray_image`].
pub fn gray_image_to_array2(img: &GrayImage) -> Array2<u8> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use ndarray::arr2;

    #[test]
    fn test_normalize_stretches_to_full_range() {
        let raster = Raster::from_u16(arr2(&[[1000u16, 2000], [3000, 1000]])).unwrap();
        let normalized = normalize_to_8bit(&raster).unwrap();

        assert_eq!(normalized[[0, 0]], 0);
        assert_eq!(normalized[[0, 1]], 128); // 127.5 rounds away from zero
        assert_eq!(normalized[[1, 0]], 255);
    }

    #[test]
    fn test_normalize_flat_raster_is_black() {
        let raster = Raster::from_u16(Array2::from_elem((4, 4), 777u16)).unwrap();
        let normalized = normalize_to_8bit(&raster).unwrap();
        assert!(normalized.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_normalize_rejects_8bit() {
        let raster = Raster::from_u8(Array2::zeros((3, 3))).unwrap();
        match normalize_to_8bit(&raster) {
            Err(RasterError::WrongDepth { expected, actual }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 8);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_empty_raster_rejected() {
        assert!(matches!(
            Raster::from_u8(Array2::zeros((0, 5))),
            Err(RasterError::Empty { .. })
        ));
    }

    #[test]
    fn test_color_image_rejected() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(matches!(
            Raster::from_dynamic(rgb),
            Err(RasterError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_histogram_bins_follow_depth() {
        let r8 = Raster::from_u8(Array2::zeros((2, 2))).unwrap();
        let r16 = Raster::from_u16(Array2::zeros((2, 2))).unwrap();
        assert_eq!(r8.histogram_bins(), 256);
        assert_eq!(r16.histogram_bins(), 65536);
    }

    #[test]
    fn test_gray_image_round_trip_preserves_orientation() {
        let arr = arr2(&[[1u8, 2, 3], [4, 5, 6]]);
        let img = array2_to_gray_image(&arr);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 0)[0], 3);
        assert_eq!(gray_image_to_array2(&img), arr);
    }
}
