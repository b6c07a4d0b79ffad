//! Droplet detection, segmentation and brightness measurement for
//! microfluidic microscopy frames.
//!
//! The entry points are [`pipeline::analyze_image`] for a single file,
//! [`pipeline::analyze_raster`] for in-memory rasters (with a pluggable
//! circle detector), and [`batch::analyze_folder`] for whole folders. Results
//! are gathered into a [`collection::Collection`] and exported as CSV.

pub mod batch;
pub mod collection;
pub mod config;
pub mod droplet;
pub mod image_proc;
pub mod output;
pub mod pipeline;
pub mod shared_args;

pub use collection::Collection;
pub use config::AnalysisConfig;
pub use droplet::{DebugStage, Droplet, ImageRecord};
pub use pipeline::{analyze_image, analyze_raster, AnalysisError};
