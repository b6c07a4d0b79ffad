//! Rasterization of circles and rectangles into ndarray masks.
//!
//! These are the shapes the detection stages reason about: filled disks for
//! coverage and overlap tests, one-pixel rings for brightness sampling, and
//! axis-aligned rectangles for local search windows. Everything is clipped to
//! the raster and returned in raster order so callers stay deterministic.

use ndarray::Array2;

use super::detection::aabb::AABB;
use super::detection::candidates::Circle;

/// Pixels `(row, col)` inside the filled disk `dx² + dy² <= r²`, clipped to `shape`.
pub fn disk_pixels(shape: (usize, usize), circle: &Circle) -> Vec<(usize, usize)> {
    let (rows, cols) = shape;
    let r = circle.r.max(0) as i64;
    let (cx, cy) = (circle.x as i64, circle.y as i64);
    let r_sq = r * r;

    let row_min = (cy - r).max(0);
    let row_max = (cy + r).min(rows as i64 - 1);
    let col_min = (cx - r).max(0);
    let col_max = (cx + r).min(cols as i64 - 1);

    let mut pixels = Vec::new();
    for y in row_min..=row_max {
        for x in col_min..=col_max {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= r_sq {
                pixels.push((y as usize, x as usize));
            }
        }
    }
    pixels
}

/// Pixels on the one-pixel outline of a circle (midpoint algorithm), clipped
/// to `shape`, sorted and deduplicated.
pub fn ring_pixels(shape: (usize, usize), circle: &Circle) -> Vec<(usize, usize)> {
    let (rows, cols) = shape;
    let (cx, cy) = (circle.x as i64, circle.y as i64);
    let radius = circle.r.max(0) as i64;

    let mut raw = Vec::new();
    let mut x = 0i64;
    let mut y = radius;
    let mut p = 1 - radius;

    while x <= y {
        for (dx, dy) in [
            (x, y),
            (y, x),
            (-y, x),
            (-x, y),
            (-x, -y),
            (-y, -x),
            (y, -x),
            (x, -y),
        ] {
            let px = cx + dx;
            let py = cy + dy;
            if px >= 0 && py >= 0 && (px as usize) < cols && (py as usize) < rows {
                raw.push((py as usize, px as usize));
            }
        }

        x += 1;
        if p < 0 {
            p += 2 * x + 1;
        } else {
            y -= 1;
            p += 2 * (x - y) + 1;
        }
    }

    raw.sort_unstable();
    raw.dedup();
    raw
}

/// A `shape`-sized mask with `value` on the filled disk and 0 elsewhere.
pub fn disk_mask(shape: (usize, usize), circle: &Circle, value: u8) -> Array2<u8> {
    let mut mask = Array2::<u8>::zeros(shape);
    for (row, col) in disk_pixels(shape, circle) {
        mask[[row, col]] = value;
    }
    mask
}

/// Set the one-pixel border of `bbox` (inclusive, clipped) to `value`.
pub fn outline_rect(target: &mut Array2<u8>, bbox: &AABB, value: u8) {
    let (rows, cols) = target.dim();
    if rows == 0 || cols == 0 || !bbox.is_valid() {
        return;
    }
    let max_row = bbox.max_row.min(rows - 1);
    let max_col = bbox.max_col.min(cols - 1);
    if bbox.min_row > max_row || bbox.min_col > max_col {
        return;
    }

    for col in bbox.min_col..=max_col {
        target[[bbox.min_row, col]] = value;
        if bbox.max_row < rows {
            target[[bbox.max_row, col]] = value;
        }
    }
    for row in bbox.min_row..=max_row {
        target[[row, bbox.min_col]] = value;
        if bbox.max_col < cols {
            target[[row, bbox.max_col]] = value;
        }
    }
}

/// Draw a one-pixel circle outline with `value`.
pub fn outline_circle(target: &mut Array2<u8>, circle: &Circle, value: u8) {
    for (row, col) in ring_pixels(target.dim(), circle) {
        target[[row, col]] = value;
    }
}
