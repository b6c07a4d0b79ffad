//! Background/droplet separation by histogram valley search.
//!
//! Droplet frames are mostly dark background with a minority of bright
//! droplets, so the intensity histogram has a dominant background peak
//! followed, further up, by a droplet peak. The threshold is placed where
//! the histogram starts rising again after the background peak.
//!
//! If the resulting mask still covers too much of the frame (its mean gray
//! level exceeds the noise ceiling) the threshold is recomputed from the
//! masked image and applied again, a bounded number of times.

use std::time::Instant;

use log::{debug, warn};
use ndarray::{Array2, ArrayView2};

use super::filter::{apply_mask, gaussian_blur, mean_u8, median_blur, threshold_binary};
use super::histogram::{histogram_peak, histogram_u8};

/// Distance above the background peak where the valley search starts.
pub const PEAK_OFFSET: usize = 4;

/// Threshold separating the background peak from the next rise.
///
/// The image is optionally Gaussian blurred (5x5, sigma 1) first. Starting
/// at `peak + 4`, the histogram is walked upwards; the value just before
/// the first bin whose count increases is returned, or the start value
/// itself when the histogram never rises again.
pub fn find_threshold(image: ArrayView2<u8>, blur: bool) -> u8 {
    let hist = if blur {
        histogram_u8(gaussian_blur(image, 5, 1.0).view())
    } else {
        histogram_u8(image)
    };

    let peak = histogram_peak(&hist);
    let start = (peak + PEAK_OFFSET).min(255);

    let mut previous = hist[start];
    for (i, &count) in hist.iter().enumerate().skip(start + 1) {
        if count > previous {
            return (i - 1) as u8;
        }
        previous = count;
    }
    start as u8
}

/// Limits for the re-threshold loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSettings {
    /// Mask mean (0-255) above which the mask is considered too noisy
    pub noise_ceiling: f64,
    pub max_passes: usize,
}

/// Why the re-threshold loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdStop {
    /// Mask mean at or below the noise ceiling
    Converged,
    /// Gave up after `max_passes` re-thresholds
    PassLimit,
    /// Gave up because the per-image deadline passed
    Deadline,
}

/// Result of the adaptive threshold.
#[derive(Debug, Clone)]
pub struct ThresholdOutcome {
    pub threshold: u8,
    /// Binary mask of `gray > threshold`
    pub mask: Array2<u8>,
    /// Gray image with the background zeroed
    pub masked: Array2<u8>,
    /// Number of re-threshold passes after the initial threshold.
    ///
    /// The older lab scripts reported one more than this (their counter
    /// started at 1 before the first re-threshold).
    pub passes: usize,
    pub stop: ThresholdStop,
}

impl ThresholdOutcome {
    pub fn mask_mean(&self) -> f64 {
        mean_u8(self.mask.view())
    }
}

/// Threshold `gray`, re-thresholding while the mask is too bright.
///
/// Each re-threshold takes its value from the previous masked image
/// (unblurred), applies it to the original gray image, and median-filters
/// the new masked image.
pub fn adaptive_threshold(
    gray: ArrayView2<u8>,
    settings: &ThresholdSettings,
    deadline: Option<Instant>,
) -> ThresholdOutcome {
    let mut threshold = find_threshold(gray, true);
    let mut mask = threshold_binary(gray, threshold);
    let mut masked = apply_mask(gray, mask.view());
    let mut passes = 0;

    let stop = loop {
        let mean = mean_u8(mask.view());
        if mean <= settings.noise_ceiling {
            break ThresholdStop::Converged;
        }
        if passes >= settings.max_passes {
            warn!(
                "mask mean {mean:.1} still above {} after {passes} re-threshold passes",
                settings.noise_ceiling
            );
            break ThresholdStop::PassLimit;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!("deadline reached after {passes} re-threshold passes (mask mean {mean:.1})");
            break ThresholdStop::Deadline;
        }

        threshold = find_threshold(masked.view(), false);
        mask = threshold_binary(gray, threshold);
        masked = median_blur(apply_mask(gray, mask.view()).view(), 3);
        passes += 1;
        debug!("re-threshold pass {passes}: threshold {threshold}, previous mask mean {mean:.1}");
    };

    ThresholdOutcome {
        threshold,
        mask,
        masked,
        passes,
        stop,
    }
}
