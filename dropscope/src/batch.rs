//! Folder-level analysis.
//!
//! Every image is analysed independently, so folders are processed with a
//! rayon parallel iterator; results are collected back in path order so the
//! collection (and its CSV export) does not depend on scheduling. A failing
//! image is recorded and skipped, never aborting the rest of the batch.

use std::path::{Path, PathBuf};

use glob::{glob, Pattern};
use indicatif::ProgressBar;
use log::{info, warn};
use rayon::prelude::*;

use crate::collection::Collection;
use crate::config::AnalysisConfig;
use crate::droplet::ImageRecord;
use crate::output::write_record;
use crate::pipeline::{analyze_image, AnalysisError};

/// Sorted list of `<folder>/*.<extension>` files.
pub fn find_images(folder: &Path, extension: &str) -> Result<Vec<PathBuf>, AnalysisError> {
    let folder_str = folder
        .to_str()
        .ok_or_else(|| AnalysisError::InvalidPath(folder.display().to_string()))?;
    // Folder names may contain glob metacharacters such as `[1]`
    let pattern = Path::new(&Pattern::escape(folder_str)).join(format!("*.{extension}"));
    let pattern = pattern
        .to_str()
        .ok_or_else(|| AnalysisError::InvalidPath(folder.display().to_string()))?;

    let entries =
        glob(pattern).map_err(|e| AnalysisError::InvalidPath(format!("{pattern}: {e}")))?;

    let mut images = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => images.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry: {e}"),
        }
    }
    images.sort();
    Ok(images)
}

/// Analyse one image and write its outputs.
pub fn process_image(
    path: &Path,
    output_dir: &Path,
    config: &AnalysisConfig,
) -> Result<ImageRecord, AnalysisError> {
    let record = analyze_image(path, config)?;
    write_record(&record, output_dir, config.debug)?;
    Ok(record)
}

/// How a batch is executed.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Process images one after another instead of in parallel
    pub serial: bool,
    pub progress: Option<ProgressBar>,
}

/// Analyse every listed image, writing outputs below `output_dir`.
pub fn analyze_paths(
    paths: &[PathBuf],
    output_dir: &Path,
    config: &AnalysisConfig,
    options: &BatchOptions,
) -> Collection {
    let run = |path: &PathBuf| {
        let result = process_image(path, output_dir, config);
        if let Some(pb) = &options.progress {
            pb.inc(1);
        }
        result
    };

    let results: Vec<Result<ImageRecord, AnalysisError>> = if options.serial {
        paths.iter().map(run).collect()
    } else {
        paths.par_iter().map(run).collect()
    };

    let mut collection = Collection::new();
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(record) => collection.add(record),
            Err(e) => {
                warn!("Failed to analyse {}: {e}", path.display());
                collection.add_failure(path.clone(), e.to_string());
            }
        }
    }
    collection
}

/// Analyse every `*.<extension>` image in `input_dir`.
pub fn analyze_folder(
    input_dir: &Path,
    output_dir: &Path,
    extension: &str,
    config: &AnalysisConfig,
    options: &BatchOptions,
) -> Result<Collection, AnalysisError> {
    config.validate()?;
    let images = find_images(input_dir, extension)?;
    info!(
        "Analyzing {} .{} images in {}",
        images.len(),
        extension,
        input_dir.display()
    );
    if let Some(pb) = &options.progress {
        pb.set_length(images.len() as u64);
    }

    let collection = analyze_paths(&images, output_dir, config, options);
    info!(
        "Analysed {} images ({} failed), {} droplets",
        collection.len(),
        collection.failures().len(),
        collection.droplet_count()
    );
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use tempfile::tempdir;

    #[test]
    fn test_find_images_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["b.png", "a.png", "c.tif", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = find_images(dir.path(), "png").unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.png"), dir.path().join("b.png")]
        );
    }

    #[test]
    fn test_find_images_in_folder_with_brackets() {
        let root = tempdir().unwrap();
        let folder = root.path().join("run[1]");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("a.png"), b"x").unwrap();
        std::fs::write(root.path().join("r.png"), b"x").unwrap();

        let found = find_images(&folder, "png").unwrap();
        assert_eq!(found, vec![folder.join("a.png")]);
    }

    #[test]
    fn test_bad_image_does_not_abort_batch() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();

        GrayImage::from_pixel(32, 32, image::Luma([10u8]))
            .save(input.path().join("a_good.png"))
            .unwrap();
        std::fs::write(input.path().join("b_broken.png"), b"not a png").unwrap();
        GrayImage::from_pixel(32, 32, image::Luma([30u8]))
            .save(input.path().join("c_good.png"))
            .unwrap();

        let options = BatchOptions {
            serial: true,
            progress: None,
        };
        let collection = analyze_folder(
            input.path(),
            output.path(),
            "png",
            &AnalysisConfig::default(),
            &options,
        )
        .unwrap();

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get(0).unwrap().name, "a_good.png");
        assert_eq!(collection.get(1).unwrap().name, "c_good.png");
        assert_eq!(collection.failures().len(), 1);
        assert!(collection.failures()[0].path.ends_with("b_broken.png"));
        assert!(output.path().join("a_good.png").exists());
    }
}
