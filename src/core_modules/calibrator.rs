// THEORY:
// Calibration turns one small square of the live image into the colour filter
// used by every following frame. The operator holds the target in front of the
// camera so that it covers the sample square at the centre of the view, then
// triggers a calibration.
//
// 1.  **Sampling**: The square of side `2 * half_width` centred on the requested
//     point is averaged channel by channel. Averaging cancels sensor noise the
//     same way pooling a block of pixels does.
// 2.  **Conversion**: The mean colour is converted once to 8-bit HSV.
// 3.  **Range building**: Hue gets a symmetric ±20 window. Saturation and value
//     only get a lower bound (40 and 60 below the sample); anything more vivid
//     or brighter than the sample still counts as the target.
//
// The result replaces the active `ColorRange` wholesale. Nothing here keeps state.

use crate::core_modules::hsv::{CHANNEL_MAX, ColorRange, Hsv};
use image::{GenericImageView, Rgb, RgbImage};
use thiserror::Error;
use tracing::info;

const HUE_TOLERANCE: i32 = 20;
const SATURATION_DROP: i32 = 40;
const VALUE_DROP: i32 = 60;

/// Reasons a calibration request is rejected. The active range is left untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("sample half-width must be greater than zero")]
    EmptySample,
    #[error(
        "sample square of half-width {half_width} at ({x}, {y}) does not fit inside a {width}x{height} frame"
    )]
    OutOfBounds {
        x: u32,
        y: u32,
        half_width: u32,
        width: u32,
        height: u32,
    },
}

/// The averaged colour of one calibration patch. Only lives for the duration of a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSample {
    pub mean: Rgb<u8>,
    pub hsv: Hsv,
}

/// Derives a new colour range from the patch centred at `center`.
pub fn calibrate(
    frame: &RgbImage,
    center: (u32, u32),
    half_width: u32,
) -> Result<ColorRange, CalibrationError> {
    let sample = sample_patch(frame, center, half_width)?;
    let range = range_around(sample.hsv);

    info!(
        mean_rgb = ?sample.mean.0,
        sampled = %sample.hsv,
        range = %range,
        "captured colour"
    );
    Ok(range)
}

/// Averages the square patch of side `2 * half_width` centred at `center`.
pub fn sample_patch(
    frame: &RgbImage,
    center: (u32, u32),
    half_width: u32,
) -> Result<ColorSample, CalibrationError> {
    if half_width == 0 {
        return Err(CalibrationError::EmptySample);
    }

    let (x, y) = center;
    let (width, height) = frame.dimensions();
    let fits = x >= half_width
        && y >= half_width
        && x.saturating_add(half_width) <= width
        && y.saturating_add(half_width) <= height;
    if !fits {
        return Err(CalibrationError::OutOfBounds {
            x,
            y,
            half_width,
            width,
            height,
        });
    }

    let side = half_width * 2;
    let patch = frame.view(x - half_width, y - half_width, side, side);

    let mut sum = [0u64; 3];
    for (_, _, pixel) in patch.pixels() {
        for (total, channel) in sum.iter_mut().zip(pixel.0) {
            *total += channel as u64;
        }
    }

    let count = side as u64 * side as u64;
    let mean = Rgb(sum.map(|total| (total / count) as u8));

    Ok(ColorSample {
        mean,
        hsv: Hsv::from_rgb(mean),
    })
}

/// Builds the segmentation range around a sampled colour.
pub fn range_around(sampled: Hsv) -> ColorRange {
    let (h, s, v) = (sampled.h as i32, sampled.s as i32, sampled.v as i32);
    ColorRange::from_bounds(
        (h - HUE_TOLERANCE, s - SATURATION_DROP, v - VALUE_DROP),
        (h + HUE_TOLERANCE, CHANNEL_MAX, CHANNEL_MAX),
    )
}
