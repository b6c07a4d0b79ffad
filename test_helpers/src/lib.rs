//! Test fixtures shared across the workspace.
//!
//! Two concerns live here:
//!
//! - **Project paths**: locating the workspace root from any test binary and
//!   a persistent `test_output/` directory for artifacts worth inspecting by
//!   hand (annotated frames, CSV exports).
//! - **Synthetic droplet frames**: bright disks on a flat background, in 8 or
//!   16 bits, with optional seeded noise. Disks are rasterized with a half-pixel
//!   margin, `dx² + dy² <= (r + 0.5)²`, so the one-pixel outline of a circle of
//!   radius `r` lies entirely on droplet pixels.
//!
//! # Usage
//! ```rust
//! use test_helpers::{droplet_frame_u8, SyntheticDroplet};
//!
//! let frame = droplet_frame_u8(
//!     (120, 160),
//!     15,
//!     &[SyntheticDroplet::new(60, 60, 18, 200)],
//! );
//! assert_eq!(frame[[60, 60]], 200);
//! assert_eq!(frame[[0, 0]], 15);
//! ```

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array2;
use once_cell::sync::Lazy;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
    #[error("Failed to read current directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

/// Walk up from the current directory to the Cargo workspace root.
///
/// The root is the first directory whose `Cargo.toml` contains a
/// `[workspace]` section.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let mut current_dir = std::env::current_dir()?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml).unwrap_or_default();
            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }

        if !current_dir.pop() {
            break;
        }
    }

    Err(TestHelperError::ProjectRootNotFound(
        "Workspace root not found".to_string(),
    ))
}

static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("Failed to find project root directory"));

/// `<project_root>/test_output/`, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join("test_output");
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }
    output_dir
}

/// Path below the test output directory.
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// One disk painted into a synthetic frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticDroplet {
    /// Center column
    pub x: i32,
    /// Center row
    pub y: i32,
    pub radius: i32,
    /// Gray level of every pixel inside the disk
    pub value: u16,
}

impl SyntheticDroplet {
    pub fn new(x: i32, y: i32, radius: i32, value: u16) -> Self {
        Self { x, y, radius, value }
    }

    /// Whether `(row, col)` falls inside the disk.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        let dx = col as i64 - self.x as i64;
        let dy = row as i64 - self.y as i64;
        let two_r = 2 * self.radius as i64 + 1;
        // (r + 0.5)² scaled by 4 to stay in integers
        4 * (dx * dx + dy * dy) <= two_r * two_r
    }
}

fn paint<T: Copy>(shape: (usize, usize), background: T, droplets: &[SyntheticDroplet], cast: impl Fn(u16) -> T) -> Array2<T> {
    Array2::from_shape_fn(shape, |(row, col)| {
        droplets
            .iter()
            .rev()
            .find(|d| d.contains(row, col))
            .map(|d| cast(d.value))
            .unwrap_or(background)
    })
}

/// 8-bit frame of `(rows, cols)` with the droplets painted over `background`.
///
/// Later droplets are painted over earlier ones. Values above 255 saturate.
pub fn droplet_frame_u8(
    shape: (usize, usize),
    background: u8,
    droplets: &[SyntheticDroplet],
) -> Array2<u8> {
    paint(shape, background, droplets, |v| v.min(u8::MAX as u16) as u8)
}

/// 16-bit variant of [`droplet_frame_u8`].
pub fn droplet_frame_u16(
    shape: (usize, usize),
    background: u16,
    droplets: &[SyntheticDroplet],
) -> Array2<u16> {
    paint(shape, background, droplets, |v| v)
}

/// Add uniform integer noise in `[-amplitude, amplitude]`, reproducible per seed.
pub fn add_noise_u8(frame: &mut Array2<u8>, amplitude: u8, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let amplitude = amplitude as i16;
    frame.mapv_inplace(|v| {
        let noise: i16 = rng.random_range(-amplitude..=amplitude);
        (v as i16 + noise).clamp(0, u8::MAX as i16) as u8
    });
}

/// Save an 8-bit frame as a grayscale PNG.
pub fn save_gray_png(path: &Path, frame: &Array2<u8>) -> Result<(), image::ImageError> {
    let (rows, cols) = frame.dim();
    let img: GrayImage =
        ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| Luma([frame[[y as usize, x as usize]]]));
    img.save(path)
}

/// Save a 16-bit frame as a grayscale PNG.
pub fn save_gray16_png(path: &Path, frame: &Array2<u16>) -> Result<(), image::ImageError> {
    let (rows, cols) = frame.dim();
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| Luma([frame[[y as usize, x as usize]]]));
    img.save(path)
}
