//! Ordered collection of analysed images and its CSV export.

use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::droplet::ImageRecord;

/// Column headers of the droplet export.
pub const CSV_HEADER: [&str; 8] = [
    "Droplet ID",
    "Radius",
    "Mean (adjusted)",
    "Image Name",
    "Image ID",
    "X pos.",
    "Y pos.",
    "Mean (unadjusted)",
];

/// One exported droplet row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropletRow {
    pub droplet_id: String,
    pub radius: i32,
    pub adjusted_mean: f64,
    pub image_name: String,
    pub image_id: usize,
    pub x: i32,
    pub y: i32,
    pub raw_mean: f64,
}

/// An image that could not be analysed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedImage {
    pub path: PathBuf,
    pub reason: String,
}

/// Analysed images in insertion order, with a wrapping cursor.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: Vec<ImageRecord>,
    failures: Vec<FailedImage>,
    cursor: usize,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: ImageRecord) {
        self.records.push(record);
    }

    pub fn add_failure(&mut self, path: PathBuf, reason: String) {
        self.failures.push(FailedImage { path, reason });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageRecord> {
        self.records.get(index)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&ImageRecord> {
        self.records.get(self.cursor)
    }

    /// Advance the cursor, wrapping to the first image after the last.
    pub fn next(&mut self) -> Option<&ImageRecord> {
        if self.records.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.records.len();
        self.records.get(self.cursor)
    }

    /// Step the cursor back, wrapping to the last image before the first.
    pub fn previous(&mut self) -> Option<&ImageRecord> {
        if self.records.is_empty() {
            return None;
        }
        self.cursor = if self.cursor == 0 {
            self.records.len() - 1
        } else {
            self.cursor - 1
        };
        self.records.get(self.cursor)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageRecord> {
        self.records.iter()
    }

    pub fn failures(&self) -> &[FailedImage] {
        &self.failures
    }

    pub fn droplet_count(&self) -> usize {
        self.records.iter().map(|r| r.droplets.len()).sum()
    }

    /// Export rows: images in insertion order, droplets in detection order.
    pub fn rows(&self) -> Vec<DropletRow> {
        self.records
            .iter()
            .enumerate()
            .flat_map(|(image_id, record)| {
                record
                    .droplets
                    .iter()
                    .enumerate()
                    .map(move |(j, droplet)| DropletRow {
                        droplet_id: format!("I{image_id}-D{j}"),
                        radius: droplet.r,
                        adjusted_mean: droplet.reported_adjusted_mean(),
                        image_name: record.name.clone(),
                        image_id,
                        x: droplet.x,
                        y: droplet.y,
                        raw_mean: droplet.rounded_raw_mean(),
                    })
            })
            .collect()
    }

    /// Write the CSV export to any writer.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(CSV_HEADER)?;
        for row in self.rows() {
            wtr.serialize(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write the CSV export to `path`.
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let file = std::fs::File::create(path)?;
        self.write_csv_to(file)?;
        info!(
            "Wrote {} droplet rows from {} images to {}",
            self.droplet_count(),
            self.len(),
            path.display()
        );
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a ImageRecord;
    type IntoIter = std::slice::Iter<'a, ImageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::droplet::Droplet;
    use crate::image_proc::detection::candidates::Circle;
    use std::collections::BTreeMap;

    fn record(name: &str, droplets: usize) -> ImageRecord {
        ImageRecord {
            name: name.to_string(),
            droplets: (0..droplets)
                .map(|i| Droplet::new(Circle::new(10 * i as i32, 5, 7), 101.234, 11.0))
                .collect(),
            rejected: Vec::new(),
            background_median: 11.0,
            rethreshold_passes: 0,
            poor_quality: false,
            notes: Vec::new(),
            debug_rasters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_navigation_wraps() {
        let mut collection = Collection::new();
        assert!(collection.current().is_none());
        assert!(collection.next().is_none());

        collection.add(record("a.png", 0));
        collection.add(record("b.png", 0));
        collection.add(record("c.png", 0));

        assert_eq!(collection.current().unwrap().name, "a.png");
        assert_eq!(collection.previous().unwrap().name, "c.png");
        assert_eq!(collection.next().unwrap().name, "a.png");
        assert_eq!(collection.next().unwrap().name, "b.png");
        assert_eq!(collection.next().unwrap().name, "c.png");
        assert_eq!(collection.next().unwrap().name, "a.png");
        assert_eq!(collection.cursor(), 0);
        assert_eq!(collection.get(1).unwrap().name, "b.png");
        assert!(collection.get(3).is_none());
    }

    #[test]
    fn test_csv_rows_and_ids() {
        let mut collection = Collection::new();
        collection.add(record("first.png", 3));
        collection.add(record("second.png", 0));

        let mut buffer = Vec::new();
        collection.write_csv_to(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Droplet ID,Radius,Mean (adjusted),Image Name,Image ID,X pos.,Y pos.,Mean (unadjusted)"
        );
        assert!(lines[1].starts_with("I0-D0,7,"));
        assert!(lines[2].starts_with("I0-D1,"));
        assert!(lines[3].starts_with("I0-D2,"));
        assert!(lines[3].contains("first.png,0,20,5,101.23"));
    }

    #[test]
    fn test_rows_use_rounded_means() {
        let mut collection = Collection::new();
        collection.add(record("x.png", 1));
        let rows = collection.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].raw_mean, 101.23);
        assert!((rows[0].adjusted_mean - 90.23).abs() < 1e-9);
    }
}
