//! Region labeling and marker-based watershed flooding.
//!
//! The overlap pass labels clusters of overlapping droplet disks, floods the
//! surrounding blurred foreground from those seeds, and measures the
//! resulting regions. Labels are assigned in raster order of each region's
//! first pixel, so region lists are always deterministic.

use std::collections::VecDeque;

use ndarray::{Array2, ArrayView2};

use super::detection::aabb::AABB;

/// Marker value for pixels separating two differently labelled basins.
pub const WATERSHED_BOUNDARY: i32 = -1;

const IN_QUEUE: i32 = -2;

const NEIGHBORS_8: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Find connected components in a binary mask (nonzero = foreground)
///
/// Uses an 8-connectivity flood fill. Returns the label image (0 for
/// background, `1..=count` for components) and the component count.
pub fn connected_components(mask: ArrayView2<u8>) -> (Array2<u32>, u32) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::zeros((rows, cols));
    let mut label_counter = 0;

    for i in 0..rows {
        for j in 0..cols {
            if mask[[i, j]] != 0 && labels[[i, j]] == 0 {
                label_counter += 1;
                let mut stack = vec![(i, j)];

                while let Some((y, x)) = stack.pop() {
                    if mask[[y, x]] == 0 || labels[[y, x]] != 0 {
                        continue;
                    }
                    labels[[y, x]] = label_counter;

                    for &(dy, dx) in &NEIGHBORS_8 {
                        let ny = y as isize + dy;
                        let nx = x as isize + dx;
                        if ny >= 0 && ny < rows as isize && nx >= 0 && nx < cols as isize {
                            let (ny, nx) = (ny as usize, nx as usize);
                            if mask[[ny, nx]] != 0 && labels[[ny, nx]] == 0 {
                                stack.push((ny, nx));
                            }
                        }
                    }
                }
            }
        }
    }

    (labels, label_counter)
}

/// A labelled region: its bounding box and pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub label: u32,
    pub bbox: AABB,
    pub area: usize,
}

/// Bounding box and area of every label in `1..=num_labels`, in label order.
pub fn label_regions(labels: ArrayView2<u32>, num_labels: u32) -> Vec<Region> {
    let mut regions: Vec<Region> = (1..=num_labels)
        .map(|label| Region {
            label,
            bbox: AABB::new(),
            area: 0,
        })
        .collect();

    for ((row, col), &label) in labels.indexed_iter() {
        if label == 0 || label > num_labels {
            continue;
        }
        let region = &mut regions[(label - 1) as usize];
        region.bbox.expand_to_include(row, col);
        region.area += 1;
    }

    regions.retain(|r| r.area > 0);
    regions
}

/// Connected regions of a binary mask with their boxes and areas.
pub fn find_regions(mask: ArrayView2<u8>) -> Vec<Region> {
    let (labels, count) = connected_components(mask);
    label_regions(labels.view(), count)
}

/// Seeded watershed flood over an 8-bit intensity image.
///
/// `markers` holds positive seed labels, 0 for pixels still to be assigned.
/// Unassigned pixels are flooded from their labelled 4-neighbours in order
/// of intensity difference (ties first-in, first-out). A pixel reached from
/// two different labels becomes [`WATERSHED_BOUNDARY`], as does the
/// one-pixel frame around the image.
pub fn watershed(intensity: ArrayView2<u8>, markers: &mut Array2<i32>) {
    let (rows, cols) = markers.dim();
    assert_eq!(intensity.dim(), (rows, cols), "marker shape must match image");
    if rows == 0 || cols == 0 {
        return;
    }

    for col in 0..cols {
        markers[[0, col]] = WATERSHED_BOUNDARY;
        markers[[rows - 1, col]] = WATERSHED_BOUNDARY;
    }
    for row in 0..rows {
        markers[[row, 0]] = WATERSHED_BOUNDARY;
        markers[[row, cols - 1]] = WATERSHED_BOUNDARY;
    }
    if rows < 3 || cols < 3 {
        return;
    }

    let diff = |a: (usize, usize), b: (usize, usize)| -> usize {
        (intensity[a] as i32 - intensity[b] as i32).unsigned_abs() as usize
    };
    let neighbors = |(r, c): (usize, usize)| [(r - 1, c), (r, c - 1), (r, c + 1), (r + 1, c)];

    let mut queues: Vec<VecDeque<(usize, usize)>> = vec![VecDeque::new(); 256];

    // Seed the queues with unlabelled pixels touching a label
    for row in 1..rows - 1 {
        for col in 1..cols - 1 {
            if markers[[row, col]] != 0 {
                continue;
            }
            let p = (row, col);
            let priority = neighbors(p)
                .into_iter()
                .filter(|&n| markers[n] > 0)
                .map(|n| diff(p, n))
                .min();
            if let Some(priority) = priority {
                queues[priority].push_back(p);
                markers[p] = IN_QUEUE;
            }
        }
    }

    let mut active = 0usize;
    loop {
        let Some(level) = (active..queues.len()).find(|&i| !queues[i].is_empty()) else {
            break;
        };
        active = level;
        let Some(p) = queues[level].pop_front() else {
            break;
        };

        let mut label = 0;
        for n in neighbors(p) {
            let m = markers[n];
            if m > 0 {
                if label == 0 {
                    label = m;
                } else if label != m {
                    label = WATERSHED_BOUNDARY;
                }
            }
        }
        if label == 0 {
            label = WATERSHED_BOUNDARY;
        }
        markers[p] = label;
        if label == WATERSHED_BOUNDARY {
            continue;
        }

        for n in neighbors(p) {
            if markers[n] == 0 {
                let priority = diff(n, p);
                queues[priority].push_back(n);
                markers[n] = IN_QUEUE;
                active = active.min(priority);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_connected_components_8_connectivity() {
        let mask = arr2(&[
            [255u8, 0, 0, 0, 0],
            [0, 255, 0, 0, 255],
            [0, 0, 0, 0, 255],
            [0, 0, 0, 0, 0],
            [255, 255, 0, 0, 0],
        ]);
        let (labels, count) = connected_components(mask.view());

        assert_eq!(count, 3);
        // Diagonal neighbours join the first component
        assert_eq!(labels[[0, 0]], 1);
        assert_eq!(labels[[1, 1]], 1);
        assert_eq!(labels[[1, 4]], 2);
        assert_eq!(labels[[2, 4]], 2);
        assert_eq!(labels[[4, 0]], 3);
        assert_eq!(labels[[4, 1]], 3);
        assert_eq!(labels[[0, 1]], 0);
    }

    #[test]
    fn test_regions_have_boxes_and_areas() {
        let mask = arr2(&[
            [0u8, 0, 0, 0, 0, 0],
            [0, 1, 1, 0, 0, 0],
            [0, 1, 1, 0, 0, 1],
            [0, 0, 0, 0, 0, 1],
        ]);
        let regions = find_regions(mask.view());

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox.to_tuple(), (1, 1, 2, 2));
        assert_eq!(regions[0].area, 4);
        assert_eq!(regions[1].bbox.to_tuple(), (2, 5, 3, 5));
        assert_eq!(regions[1].area, 2);
    }

    #[test]
    fn test_empty_mask_has_no_regions() {
        let mask = Array2::<u8>::zeros((5, 5));
        assert!(find_regions(mask.view()).is_empty());
    }

    #[test]
    fn test_watershed_fills_from_single_seed() {
        let intensity = Array2::from_elem((7, 7), 100u8);
        let mut markers = Array2::<i32>::zeros((7, 7));
        markers[[3, 3]] = 2;

        watershed(intensity.view(), &mut markers);

        for row in 1..6 {
            for col in 1..6 {
                assert_eq!(markers[[row, col]], 2, "pixel ({row}, {col})");
            }
        }
        assert_eq!(markers[[0, 3]], WATERSHED_BOUNDARY);
        assert_eq!(markers[[6, 6]], WATERSHED_BOUNDARY);
    }

    #[test]
    fn test_watershed_splits_between_seeds() {
        // Two flat basins separated by a bright ridge in column 4
        let mut intensity = Array2::from_elem((5, 9), 10u8);
        for row in 0..5 {
            intensity[[row, 4]] = 200;
        }
        let mut markers = Array2::<i32>::zeros((5, 9));
        markers[[2, 1]] = 2;
        markers[[2, 7]] = 3;

        watershed(intensity.view(), &mut markers);

        for row in 1..4 {
            for col in 1..4 {
                assert_eq!(markers[[row, col]], 2);
            }
            for col in 5..8 {
                assert_eq!(markers[[row, col]], 3);
            }
        }
        // The ridge is claimed by one side or marked as boundary, never unassigned
        for row in 1..4 {
            assert_ne!(markers[[row, 4]], 0);
            assert_ne!(markers[[row, 4]], IN_QUEUE);
        }
    }

    #[test]
    fn test_watershed_keeps_background_seed() {
        let intensity = Array2::from_elem((6, 6), 0u8);
        let mut markers = Array2::from_elem((6, 6), 1i32);
        markers[[2, 2]] = 0;
        markers[[2, 3]] = 5;

        watershed(intensity.view(), &mut markers);

        // Reached from both labels at equal cost
        assert_eq!(markers[[2, 2]], WATERSHED_BOUNDARY);
        assert_eq!(markers[[2, 3]], 5);
        assert_eq!(markers[[1, 1]], 1);
    }
}
