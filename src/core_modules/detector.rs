// THEORY:
// The `ObjectDetector` is the per-frame spatial analysis. It answers one question:
// "where is the calibrated colour blob in this frame, if anywhere?"
//
// Steps:
// 1.  Threshold the frame into a mask with the active `ColorRange`.
// 2.  Open the mask (erode, then dilate) with as many passes as the calibration
//     sample's half-width. A target large enough to calibrate on survives; noise
//     does not.
// 3.  Extract the external regions of the mask.
// 4.  Keep the largest region whose area is strictly above the noise floor of
//     `4 * half_width²` (the area of the calibration square). The first region
//     wins a tie.
// 5.  Fit a minimum-area rotated rectangle to the winner; its centre is the
//     object's position.
//
// The detector is stateless between frames. It owns the active range, which is
// only ever replaced as a whole by a new calibration. "Nothing found" is a
// normal answer, not an error.

use crate::core_modules::contour::{Contour, external_contours};
use crate::core_modules::hsv::ColorRange;
use crate::core_modules::mask::Mask;
use crate::core_modules::min_area_rect::{RotatedRect, min_area_rect};
use image::RgbImage;

/// The best-matching region of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    /// Centre of the minimum-area rectangle, in pixels.
    pub centroid: (f32, f32),
    /// Minimum-area rotated rectangle around the region's outline.
    pub rect: RotatedRect,
    /// Area enclosed by the region's outline, in square pixels.
    pub area: f64,
}

impl DetectedObject {
    /// Horizontal position in whole pixels, as used for steering.
    pub fn centroid_x(&self) -> i32 {
        self.centroid.0 as i32
    }

    pub fn centroid_y(&self) -> i32 {
        self.centroid.1 as i32
    }
}

/// Intermediate products of one detection pass, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub mask: Mask,
    pub contours: Vec<Contour>,
}

/// Everything one detection pass produced: the segmentation it ran on and the
/// object it picked from it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    pub segmentation: Segmentation,
    pub object: Option<DetectedObject>,
}

/// Segments frames with the active colour range and picks the tracked object.
#[derive(Debug, Clone)]
pub struct ObjectDetector {
    /// Half-width of the calibration square; drives morphology and the noise floor.
    half_width: u32,
    /// The active filter. `None` until the first successful calibration.
    range: Option<ColorRange>,
}

impl ObjectDetector {
    pub fn new(half_width: u32) -> Self {
        Self {
            half_width,
            range: None,
        }
    }

    pub fn half_width(&self) -> u32 {
        self.half_width
    }

    pub fn range(&self) -> Option<ColorRange> {
        self.range
    }

    /// Replaces the active range.
    pub fn set_range(&mut self, range: ColorRange) {
        self.range = Some(range);
    }

    /// Finds the tracked object in `frame`, or `None` if there is no range yet or no
    /// region qualifies.
    pub fn detect(&self, frame: &RgbImage) -> Option<DetectedObject> {
        let range = self.range.as_ref()?;
        detect(frame, range, self.half_width)
    }

    /// Runs the mask and contour stages only.
    pub fn segment(&self, frame: &RgbImage) -> Option<Segmentation> {
        let range = self.range.as_ref()?;
        Some(segment(frame, range, self.half_width))
    }

    /// Like `detect`, but also hands back the mask and contours the object was
    /// picked from. `None` only when there is no range yet.
    pub fn analyze(&self, frame: &RgbImage) -> Option<FrameAnalysis> {
        let range = self.range.as_ref()?;
        Some(analyze(frame, range, self.half_width))
    }
}

/// Regions at or below this area are never selected.
pub fn noise_floor(half_width: u32) -> f64 {
    4.0 * half_width as f64 * half_width as f64
}

/// Thresholds, opens and extracts external regions of `frame`.
pub fn segment(frame: &RgbImage, range: &ColorRange, half_width: u32) -> Segmentation {
    let mask = Mask::from_range(frame, range).opened(half_width);
    let contours = external_contours(&mask);
    Segmentation { mask, contours }
}

/// Picks the largest region strictly above the noise floor. Earlier regions win ties.
pub fn select_best(contours: &[Contour], half_width: u32) -> Option<(&Contour, f64)> {
    let floor = noise_floor(half_width);
    let mut best: Option<(&Contour, f64)> = None;
    for contour in contours {
        let area = contour.area();
        if area > floor && best.is_none_or(|(_, best_area)| area > best_area) {
            best = Some((contour, area));
        }
    }
    best
}

/// One full detection pass: segment, select, and fit the rectangle.
pub fn detect(frame: &RgbImage, range: &ColorRange, half_width: u32) -> Option<DetectedObject> {
    analyze(frame, range, half_width).object
}

/// One full detection pass that keeps its intermediate products.
pub fn analyze(frame: &RgbImage, range: &ColorRange, half_width: u32) -> FrameAnalysis {
    let segmentation = segment(frame, range, half_width);
    let object = pick_object(&segmentation.contours, half_width);
    FrameAnalysis {
        segmentation,
        object,
    }
}

fn pick_object(contours: &[Contour], half_width: u32) -> Option<DetectedObject> {
    let (contour, area) = select_best(contours, half_width)?;
    let rect = min_area_rect(&contour.points)?;
    Some(DetectedObject {
        centroid: rect.center,
        rect,
        area,
    })
}
