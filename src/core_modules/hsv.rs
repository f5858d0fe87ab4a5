// THEORY:
// Segmentation works in a hue/saturation/value space rather than raw RGB, so a
// colour can be selected by "what colour it is" with some tolerance for shading.
// The encoding is the compact 8-bit one used by most vision toolkits:
//   • hue:        0..180 (degrees halved so a full turn fits in a byte)
//   • saturation: 0..255
//   • value:      0..255
//
// A `ColorRange` is an axis-aligned box in that space. It is built once per
// calibration and then only read. Hue is treated as a flat axis: a range never
// wraps from 179 back to 0, so reds sitting on the seam get a truncated box.

use image::Rgb;
use std::fmt;

/// Largest legal hue in the 8-bit encoding.
pub const HUE_MAX: i32 = 179;
/// Largest legal saturation or value.
pub const CHANNEL_MAX: i32 = 255;
/// Every clamped bound stays at or above this.
pub const CHANNEL_FLOOR: i32 = 1;

/// A single colour in 8-bit HSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hsv {
    /// Hue, 0..=179.
    pub h: u8,
    /// Saturation, 0..=255.
    pub s: u8,
    /// Value (brightness), 0..=255.
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }

    /// Builds a colour from signed channel values, clamping each one into its
    /// legal domain independently.
    pub fn clamped(h: i32, s: i32, v: i32) -> Self {
        Self {
            h: h.clamp(CHANNEL_FLOOR, HUE_MAX) as u8,
            s: s.clamp(CHANNEL_FLOOR, CHANNEL_MAX) as u8,
            v: v.clamp(CHANNEL_FLOOR, CHANNEL_MAX) as u8,
        }
    }

    /// Converts an RGB pixel to 8-bit HSV.
    pub fn from_rgb(pixel: Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0;
        let (r, g, b) = (r as i32, g as i32, b as i32);

        let value = r.max(g).max(b);
        let min = r.min(g).min(b);
        let chroma = value - min;

        let saturation = if value == 0 {
            0
        } else {
            (chroma * 255 + value / 2) / value
        };

        let hue = if chroma == 0 {
            0
        } else {
            // Sector offset in sixths of a turn, scaled so that a full turn is 180.
            let sixths = if value == r {
                g - b
            } else if value == g {
                b - r + 2 * chroma
            } else {
                r - g + 4 * chroma
            };
            let mut h = (sixths as f32 * 30.0 / chroma as f32 + 0.5).floor() as i32;
            if h < 0 {
                h += 180;
            }
            h.min(HUE_MAX)
        };

        Self {
            h: hue as u8,
            s: saturation as u8,
            v: value as u8,
        }
    }

    /// The same colour in human units: hue in degrees, saturation and value in percent.
    pub fn to_degrees_percent(self) -> (f32, f32, f32) {
        (
            self.h as f32 * 2.0,
            self.s as f32 / 2.55,
            self.v as f32 / 2.55,
        )
    }
}

impl fmt::Display for Hsv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, s, v) = self.to_degrees_percent();
        write!(f, "hsv({:.0}°, {:.0}%, {:.0}%)", h, s, v)
    }
}

/// An inclusive per-channel box in HSV space used to select pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl ColorRange {
    /// Builds a range from raw bounds, clamping each channel into its domain.
    /// If clamping makes a lower bound overtake its upper bound, the two are swapped
    /// so that `lower <= upper` holds on every channel.
    pub fn from_bounds(lower: (i32, i32, i32), upper: (i32, i32, i32)) -> Self {
        let lo = Hsv::clamped(lower.0, lower.1, lower.2);
        let hi = Hsv::clamped(upper.0, upper.1, upper.2);
        Self {
            lower: Hsv::new(lo.h.min(hi.h), lo.s.min(hi.s), lo.v.min(hi.v)),
            upper: Hsv::new(lo.h.max(hi.h), lo.s.max(hi.s), lo.v.max(hi.v)),
        }
    }

    /// True when every channel of `color` lies within `[lower, upper]`.
    #[inline]
    pub fn contains(&self, color: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&color.h)
            && (self.lower.s..=self.upper.s).contains(&color.s)
            && (self.lower.v..=self.upper.v).contains(&color.v)
    }
}

impl fmt::Display for ColorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.lower, self.upper)
    }
}
