//! Axis-aligned bounding boxes for segmented droplet regions.
//!
//! Overlap clusters are located as connected regions of a mask; the merge pass
//! then searches a padded box around each region for a single larger droplet.
//! [`AABB`] carries those regions and windows in `(row, col)` raster
//! coordinates with inclusive bounds.
//!
//! # Examples
//!
//! ```rust
//! use dropscope::image_proc::detection::aabb::AABB;
//!
//! let mut region = AABB::new();
//! region.expand_to_include(40, 60);
//! region.expand_to_include(59, 99);
//! assert_eq!(region.width(), 40);
//! assert_eq!(region.height(), 20);
//!
//! // 25% padding on every side, clipped to a 100x100 raster
//! let window = region.with_fractional_padding(0.25, (100, 100));
//! assert_eq!(window.to_tuple(), (35, 50, 64, 99));
//! ```

/// Axis-Aligned Bounding Box for 2D image regions.
///
/// - **Rows (y-axis)**: Increase downward from top of image
/// - **Columns (x-axis)**: Increase rightward from left of image
/// - **Bounds**: Both min and max coordinates are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AABB {
    /// Minimum row (y) coordinate (inclusive)
    pub min_row: usize,
    /// Minimum column (x) coordinate (inclusive)
    pub min_col: usize,
    /// Maximum row (y) coordinate (inclusive)
    pub max_row: usize,
    /// Maximum column (x) coordinate (inclusive)
    pub max_col: usize,
}

impl AABB {
    /// Create an empty AABB with invalid bounds, ready for `expand_to_include()`.
    pub fn new() -> Self {
        Self {
            min_row: usize::MAX,
            min_col: usize::MAX,
            max_row: 0,
            max_col: 0,
        }
    }

    /// Create an AABB from explicit inclusive bounds.
    pub fn from_coords(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    /// Bounds as `(min_row, min_col, max_row, max_col)`.
    pub fn to_tuple(&self) -> (usize, usize, usize, usize) {
        (self.min_row, self.min_col, self.max_row, self.max_col)
    }

    /// Grow the box to include pixel `(row, col)`.
    pub fn expand_to_include(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
    }

    pub fn width(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    pub fn height(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    pub fn is_valid(&self) -> bool {
        self.min_row <= self.max_row && self.min_col <= self.max_col
    }

    /// Pad each side by `fraction` of the box's own width/height (truncated
    /// to whole pixels) and clip to a raster of `shape` `(rows, cols)`.
    pub fn with_fractional_padding(&self, fraction: f64, shape: (usize, usize)) -> Self {
        let (rows, cols) = shape;
        let pad_cols = (self.width() as f64 * fraction) as usize;
        let pad_rows = (self.height() as f64 * fraction) as usize;

        Self {
            min_row: self.min_row.saturating_sub(pad_rows),
            min_col: self.min_col.saturating_sub(pad_cols),
            max_row: (self.max_row + pad_rows).min(rows.saturating_sub(1)),
            max_col: (self.max_col + pad_cols).min(cols.saturating_sub(1)),
        }
    }
}

impl Default for AABB {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_expand() {
        let mut aabb = AABB::new();
        assert!(!aabb.is_valid());

        aabb.expand_to_include(10, 20);
        assert_eq!(aabb.to_tuple(), (10, 20, 10, 20));

        aabb.expand_to_include(5, 30);
        assert_eq!(aabb.to_tuple(), (5, 20, 10, 30));
        assert!(aabb.is_valid());
    }

    #[test]
    fn test_aabb_dimensions() {
        let aabb = AABB::from_coords(10, 20, 29, 49);
        assert_eq!(aabb.width(), 30);
        assert_eq!(aabb.height(), 20);
    }

    #[test]
    fn test_fractional_padding_clips_at_origin() {
        let aabb = AABB::from_coords(2, 2, 21, 41); // 40 wide, 20 tall
        let padded = aabb.with_fractional_padding(0.25, (1000, 1000));
        assert_eq!(padded.to_tuple(), (0, 0, 26, 51));
    }

    #[test]
    fn test_fractional_padding_clips_at_far_edge() {
        let aabb = AABB::from_coords(80, 80, 99, 99);
        let padded = aabb.with_fractional_padding(0.25, (100, 100));
        assert_eq!(padded.to_tuple(), (75, 75, 99, 99));
    }
}
