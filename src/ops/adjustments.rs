// ============================================================================
// ADJUSTMENT OPERATIONS — CSS-style filter stack rendered in one pass
// ============================================================================
//
// Colour functions follow the W3C Filter Effects matrices and are applied in
// declaration order, clamping after each step. Blur runs last.
// Per-pixel work is parallelized over rows via rayon.
// ============================================================================

use image::{RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::tools::ToolParams;

/// Named adjustments, in percent (hue in degrees, blur in pixels).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterStack {
    pub brightness: f32,
    pub contrast: f32,
    pub saturate: f32,
    pub grayscale: f32,
    pub sepia: f32,
    pub hue_rotate: f32,
    pub invert: f32,
    pub blur: f32,
}

impl Default for FilterStack {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturate: 100.0,
            grayscale: 0.0,
            sepia: 0.0,
            hue_rotate: 0.0,
            invert: 0.0,
            blur: 0.0,
        }
    }
}

impl FilterStack {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// CSS `filter` expression, as recorded in history.
    pub fn to_filter_string(&self) -> String {
        format!(
            "brightness({}%) contrast({}%) saturate({}%) grayscale({}%) sepia({}%) hue-rotate({}deg) invert({}%) blur({}px)",
            self.brightness,
            self.contrast,
            self.saturate,
            self.grayscale,
            self.sepia,
            self.hue_rotate,
            self.invert,
            self.blur
        )
    }

    /// Read values from loose params; keys match the CSS names
    /// (`hue-rotate` and `hue_rotate` both work). Missing keys keep defaults.
    pub fn from_params(params: &ToolParams) -> Result<Self, String> {
        let mut stack = Self::default();
        for (key, value) in params {
            let v = value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| format!("filter '{key}' needs a number"))? as f32;
            if !v.is_finite() {
                return Err(format!("filter '{key}' must be finite"));
            }
            match key.replace('_', "-").as_str() {
                "brightness" => stack.brightness = v.max(0.0),
                "contrast" => stack.contrast = v.max(0.0),
                "saturate" => stack.saturate = v.max(0.0),
                "grayscale" => stack.grayscale = v.clamp(0.0, 100.0),
                "sepia" => stack.sepia = v.clamp(0.0, 100.0),
                "hue-rotate" => stack.hue_rotate = v,
                "invert" => stack.invert = v.clamp(0.0, 100.0),
                "blur" => stack.blur = v.max(0.0),
                other => return Err(format!("unknown filter '{other}'")),
            }
        }
        Ok(stack)
    }

    /// Render the whole stack onto a new surface.
    pub fn render(&self, img: &RgbaImage) -> RgbaImage {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return img.clone();
        }

        let mut out = if self.colour_is_identity() {
            img.clone()
        } else {
            let stride = w as usize * 4;
            let src = img.as_raw();
            let mut dst = vec![0u8; src.len()];
            dst.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
                let row_in = &src[y * stride..(y + 1) * stride];
                for (px_in, px_out) in row_in.chunks_exact(4).zip(row_out.chunks_exact_mut(4)) {
                    let rgb = self.apply_colour([
                        px_in[0] as f32 / 255.0,
                        px_in[1] as f32 / 255.0,
                        px_in[2] as f32 / 255.0,
                    ]);
                    for c in 0..3 {
                        px_out[c] = (rgb[c] * 255.0).round().clamp(0.0, 255.0) as u8;
                    }
                    px_out[3] = px_in[3];
                }
            });
            RgbaImage::from_raw(w, h, dst).unwrap_or_else(|| img.clone())
        };

        if self.blur > 0.0 {
            out = imageops::blur(&out, self.blur);
        }
        out
    }

    fn colour_is_identity(&self) -> bool {
        Self {
            blur: 0.0,
            ..*self
        }
        .is_identity()
    }

    fn apply_colour(&self, mut c: [f32; 3]) -> [f32; 3] {
        let clamp = |c: [f32; 3]| c.map(|v| v.clamp(0.0, 1.0));

        if self.brightness != 100.0 {
            let b = self.brightness / 100.0;
            c = clamp(c.map(|v| v * b));
        }
        if self.contrast != 100.0 {
            let k = self.contrast / 100.0;
            c = clamp(c.map(|v| (v - 0.5) * k + 0.5));
        }
        if self.saturate != 100.0 {
            c = clamp(mul(&saturate_matrix(self.saturate / 100.0), c));
        }
        if self.grayscale > 0.0 {
            c = clamp(mul(&grayscale_matrix(self.grayscale / 100.0), c));
        }
        if self.sepia > 0.0 {
            c = clamp(mul(&sepia_matrix(self.sepia / 100.0), c));
        }
        if self.hue_rotate % 360.0 != 0.0 {
            c = clamp(mul(&hue_rotate_matrix(self.hue_rotate), c));
        }
        if self.invert > 0.0 {
            let a = (self.invert / 100.0).clamp(0.0, 1.0);
            c = c.map(|v| a * (1.0 - v) + (1.0 - a) * v);
        }
        c
    }
}

type Matrix = [[f32; 3]; 3];

fn mul(m: &Matrix, c: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * c[0] + m[0][1] * c[1] + m[0][2] * c[2],
        m[1][0] * c[0] + m[1][1] * c[1] + m[1][2] * c[2],
        m[2][0] * c[0] + m[2][1] * c[1] + m[2][2] * c[2],
    ]
}

fn saturate_matrix(s: f32) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn grayscale_matrix(amount: f32) -> Matrix {
    let s = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.2126 + 0.7874 * s, 0.7152 - 0.7152 * s, 0.0722 - 0.0722 * s],
        [0.2126 - 0.2126 * s, 0.7152 + 0.2848 * s, 0.0722 - 0.0722 * s],
        [0.2126 - 0.2126 * s, 0.7152 - 0.7152 * s, 0.0722 + 0.9278 * s],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix {
    let s = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * s, 0.769 - 0.769 * s, 0.189 - 0.189 * s],
        [0.349 - 0.349 * s, 0.686 + 0.314 * s, 0.168 - 0.168 * s],
        [0.272 - 0.272 * s, 0.534 - 0.534 * s, 0.131 + 0.869 * s],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> Matrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}
