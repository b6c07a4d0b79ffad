//! Annotated images and on-disk output for analysed frames.

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontRef, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_text_mut};
use log::{debug, warn};
use ndarray::Array2;
use once_cell::sync::Lazy;

use crate::droplet::{DebugStage, ImageRecord};
use crate::image_proc::detection::candidates::Circle;
use crate::image_proc::raster::array2_to_gray_image;
use crate::pipeline::AnalysisError;

/// Outline color of accepted droplets.
pub const ACCEPTED_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
/// Outline color of rejected circles.
pub const REJECTED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Color of the status lines in the top-left corner.
pub const BANNER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const LABEL_SCALE: f32 = 14.0;
const BANNER_SCALE: f32 = 16.0;
const BANNER_MARGIN: i32 = 5;

static LABEL_FONT: Lazy<Option<FontRef<'static>>> = Lazy::new(|| {
    match FontRef::try_from_slice(include_bytes!("../assets/DejaVuSansMono.ttf")) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Label font unavailable, annotations are drawn without text: {e}");
            None
        }
    }
});

/// Circle outlines with the radius written inside, left of the center.
fn draw_circles(canvas: &mut RgbImage, circles: &[Circle], color: Rgb<u8>) {
    for c in circles {
        draw_hollow_circle_mut(canvas, (c.x, c.y), c.r, color);
        if let Some(font) = LABEL_FONT.as_ref() {
            draw_text_mut(
                canvas,
                color,
                c.x - c.r / 2,
                c.y,
                PxScale::from(LABEL_SCALE),
                font,
                &c.r.to_string(),
            );
        }
    }
}

fn draw_banners(canvas: &mut RgbImage, banners: &[String]) {
    let Some(font) = LABEL_FONT.as_ref() else {
        return;
    };
    let line_height = BANNER_SCALE as i32 + 2;
    for (i, line) in banners.iter().enumerate() {
        draw_text_mut(
            canvas,
            BANNER_COLOR,
            BANNER_MARGIN,
            BANNER_MARGIN + i as i32 * line_height,
            PxScale::from(BANNER_SCALE),
            font,
            line,
        );
    }
}

/// Outline and label droplets on an RGB copy of the 8-bit frame.
///
/// `banners` are written one per line in the top-left corner. Returns the
/// final image (accepted droplets only) and the overview with rejected
/// circles added on top.
pub fn annotate(
    gray: &Array2<u8>,
    accepted: &[Circle],
    rejected: &[Circle],
    banners: &[String],
) -> (RgbImage, RgbImage) {
    let mut final_image = DynamicImage::ImageLuma8(array2_to_gray_image(gray)).to_rgb8();
    draw_circles(&mut final_image, accepted, ACCEPTED_COLOR);
    draw_banners(&mut final_image, banners);

    let mut all_droplets = final_image.clone();
    draw_circles(&mut all_droplets, rejected, REJECTED_COLOR);

    (final_image, all_droplets)
}

/// File stem of a record name (`"a_b-c.png"` -> `"a_b-c"`).
pub fn record_stem(record: &ImageRecord) -> String {
    Path::new(&record.name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&record.name)
        .to_string()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AnalysisError + '_ {
    move |source| AnalysisError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write a record's images below `output_dir`.
///
/// With `debug`, every kept stage goes to `<output_dir>/<stem>/<index>-<stage>.png`
/// together with a `notes.txt`; otherwise only the final image is written as
/// `<output_dir>/<stem>.png`. Returns the written paths.
pub fn write_record(
    record: &ImageRecord,
    output_dir: &Path,
    debug: bool,
) -> Result<Vec<PathBuf>, AnalysisError> {
    fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
    let stem = record_stem(record);
    let mut written = Vec::new();

    if debug {
        let folder = output_dir.join(&stem);
        fs::create_dir_all(&folder).map_err(io_error(&folder))?;

        for (stage, raster) in &record.debug_rasters {
            let path = folder.join(stage.file_name());
            raster.save(&path)?;
            written.push(path);
        }

        let notes_path = folder.join("notes.txt");
        let mut notes = record.notes.join("\n");
        notes.push('\n');
        fs::write(&notes_path, notes).map_err(io_error(&notes_path))?;
        written.push(notes_path);
    } else if let Some(final_image) = record.debug_raster(DebugStage::Final) {
        let path = output_dir.join(format!("{stem}.png"));
        final_image.save(&path)?;
        written.push(path);
    }

    debug!("{}: wrote {} file(s)", record.name, written.len());
    Ok(written)
}
