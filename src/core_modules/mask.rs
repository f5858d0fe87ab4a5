// THEORY:
// The mask is the binary picture "this pixel has the target colour". It is the
// bridge between per-pixel colour tests and region analysis.
//
// Raw colour masks are speckled: single pixels of the right hue show up all over
// a real scene, and the target itself has holes where highlights or shadows push
// it out of range. A morphological opening cleans that up:
// 1.  **Erosion** first. A pixel survives only if its whole neighbourhood is set,
//     so every blob shrinks and anything thinner than the element disappears.
// 2.  **Dilation** second. Survivors grow back to roughly their old outline.
// The order matters: dilating first would fatten the speckles into blobs that
// erosion can no longer remove.
//
// `n` passes of a 3x3 square element equal one pass of a (2n+1)x(2n+1) square,
// and a square filter splits into a row pass and a column pass. Each pass uses a
// running count so the cost does not depend on the number of iterations.
// Pixels outside the frame never influence the result.

use crate::core_modules::hsv::{ColorRange, Hsv};
use image::{GrayImage, Luma, RgbImage};

/// A binary image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Morph {
    Erode,
    Dilate,
}

impl Mask {
    /// An all-clear mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Selects every pixel of `frame` whose HSV colour lies inside `range`.
    pub fn from_range(frame: &RgbImage, range: &ColorRange) -> Self {
        let (width, height) = frame.dimensions();
        let bits = frame
            .pixels()
            .map(|pixel| range.contains(Hsv::from_rgb(*pixel)))
            .collect();
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reads a pixel. Coordinates outside the mask read as clear.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.bits[y as usize * self.width as usize + x as usize] = value;
        }
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    /// Erosion with a 3x3 square applied `iterations` times.
    pub fn eroded(&self, iterations: u32) -> Self {
        self.square_filter(iterations as usize, Morph::Erode)
    }

    /// Dilation with a 3x3 square applied `iterations` times.
    pub fn dilated(&self, iterations: u32) -> Self {
        self.square_filter(iterations as usize, Morph::Dilate)
    }

    /// Erosion followed by dilation with the same iteration count.
    pub fn opened(&self, iterations: u32) -> Self {
        self.eroded(iterations).dilated(iterations)
    }

    /// Renders the mask as an 8-bit image (0 or 255), e.g. for a debug window.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.get(x as i64, y as i64) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn square_filter(&self, radius: usize, op: Morph) -> Self {
        if radius == 0 || self.bits.is_empty() {
            return self.clone();
        }

        let width = self.width as usize;
        let height = self.height as usize;

        // --- Row pass ---
        let mut rows = vec![false; self.bits.len()];
        for (line, out) in self.bits.chunks(width).zip(rows.chunks_mut(width)) {
            filter_line(line, radius, op, out);
        }

        // --- Column pass ---
        let mut bits = vec![false; self.bits.len()];
        let mut column = vec![false; height];
        let mut filtered = vec![false; height];
        for x in 0..width {
            for (y, slot) in column.iter_mut().enumerate() {
                *slot = rows[y * width + x];
            }
            filter_line(&column, radius, op, &mut filtered);
            for (y, value) in filtered.iter().enumerate() {
                bits[y * width + x] = *value;
            }
        }

        Self {
            width: self.width,
            height: self.height,
            bits,
        }
    }
}

/// Applies a 1-D min (erode) or max (dilate) filter of half-width `radius`.
/// The window is clipped at the ends of the line rather than padded.
fn filter_line(line: &[bool], radius: usize, op: Morph, out: &mut [bool]) {
    let len = line.len();
    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0usize);
    for &bit in line {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + bit as usize);
    }

    for (i, slot) in out.iter_mut().enumerate().take(len) {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(len - 1);
        let set = prefix[hi + 1] - prefix[lo];
        *slot = match op {
            Morph::Erode => set == hi + 1 - lo,
            Morph::Dilate => set > 0,
        };
    }
}
