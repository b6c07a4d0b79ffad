//! Image processing for droplet frames
//!
//! Rasters, elementary filters, thresholding, circle detection and region
//! segmentation. Everything here works on `ndarray` arrays indexed
//! `[[row, col]]`.

pub mod detection;
pub mod draw;
pub mod filter;
pub mod histogram;
pub mod measure;
pub mod raster;
pub mod segment;
pub mod thresholding;

// Re-export key functionality for easier access
pub use histogram::{masked_histogram_median, median_from_histogram};
pub use raster::{normalize_to_8bit, Raster, RasterError};
pub use thresholding::{adaptive_threshold, find_threshold};
