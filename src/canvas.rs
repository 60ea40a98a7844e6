// ============================================================================
// BLEND MODES — per-pixel compositing math shared by every local composite
// ============================================================================

use std::fmt;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};

/// Blend modes available to overlay composites (textures, AI result blending).
///
/// Names follow the CSS `mix-blend-mode` / canvas `globalCompositeOperation`
/// vocabulary so that recorded parameters stay portable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    #[serde(rename = "source-over", alias = "normal")]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    /// Returns all blend modes in menu order.
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
        ]
    }

    /// Canonical identifier, as stored in operation params.
    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "source-over",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
        }
    }

    /// Returns the localized display name for UI rendering
    pub fn display_name(&self) -> String {
        match self {
            BlendMode::Normal => t!("blend.normal"),
            BlendMode::Multiply => t!("blend.multiply"),
            BlendMode::Screen => t!("blend.screen"),
            BlendMode::Overlay => t!("blend.overlay"),
            BlendMode::Darken => t!("blend.darken"),
            BlendMode::Lighten => t!("blend.lighten"),
            BlendMode::ColorDodge => t!("blend.color_dodge"),
            BlendMode::ColorBurn => t!("blend.color_burn"),
            BlendMode::HardLight => t!("blend.hard_light"),
            BlendMode::SoftLight => t!("blend.soft_light"),
            BlendMode::Difference => t!("blend.difference"),
            BlendMode::Exclusion => t!("blend.exclusion"),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('_', "-");
        if s == "normal" {
            return Ok(BlendMode::Normal);
        }
        BlendMode::all()
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown blend mode '{s}'"))
    }
}

/// Composite `top` over `base` with `mode` at `opacity` (0.0..=1.0).
///
/// Straight (unpremultiplied) alpha in, straight alpha out. Where the base is
/// transparent the top colour is used unmodified, as in W3C compositing.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let base_a = unit(base[3]);
    let top_a = unit(top[3]) * opacity.clamp(0.0, 1.0);
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let (b, t) = (unit(base[c]), unit(top[c]));
        // Where the base is transparent the raw top colour shows through
        let mixed = (1.0 - base_a) * t + base_a * blend_channel(mode, b, t);
        out[c] = to_u8((mixed * top_a + b * base_a * (1.0 - top_a)) / out_a);
    }
    out[3] = to_u8(out_a);
    Rgba(out)
}

/// Separable blend function B(base, top) on one colour channel in 0..=1.
fn blend_channel(mode: BlendMode, b: f32, t: f32) -> f32 {
    match mode {
        BlendMode::Normal => t,
        BlendMode::Multiply => b * t,
        BlendMode::Screen => b + t - b * t,
        BlendMode::Overlay => hard_light(t, b),
        BlendMode::Darken => b.min(t),
        BlendMode::Lighten => b.max(t),
        BlendMode::ColorDodge => match (b, t) {
            (b, _) if b <= 0.0 => 0.0,
            (_, t) if t >= 1.0 => 1.0,
            _ => (b / (1.0 - t)).min(1.0),
        },
        BlendMode::ColorBurn => match (b, t) {
            (b, _) if b >= 1.0 => 1.0,
            (_, t) if t <= 0.0 => 0.0,
            _ => 1.0 - ((1.0 - b) / t).min(1.0),
        },
        BlendMode::HardLight => hard_light(b, t),
        BlendMode::SoftLight => soft_light(b, t),
        BlendMode::Difference => (b - t).abs(),
        BlendMode::Exclusion => b + t - 2.0 * b * t,
    }
}

#[inline]
fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Multiply below mid-grey on `t`, screen above. Overlay is this with the
/// layers swapped.
fn hard_light(b: f32, t: f32) -> f32 {
    if t <= 0.5 {
        b * 2.0 * t
    } else {
        let s = 2.0 * t - 1.0;
        b + s - b * s
    }
}

fn soft_light(b: f32, t: f32) -> f32 {
    if t <= 0.5 {
        return b - (1.0 - 2.0 * t) * b * (1.0 - b);
    }
    let d = if b <= 0.25 {
        ((16.0 * b - 12.0) * b + 4.0) * b
    } else {
        b.sqrt()
    };
    b + (2.0 * t - 1.0) * (d - b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREY: Rgba<u8> = Rgba([128, 128, 128, 255]);

    #[test]
    fn names_parse_back() {
        for mode in BlendMode::all() {
            assert_eq!(mode.name().parse::<BlendMode>().unwrap(), *mode);
        }
        assert_eq!("normal".parse::<BlendMode>().unwrap(), BlendMode::Normal);
        assert_eq!("COLOR_DODGE".parse::<BlendMode>().unwrap(), BlendMode::ColorDodge);
        assert!("hue".parse::<BlendMode>().is_err());
    }

    #[test]
    fn serde_uses_css_names() {
        let json = serde_json::to_string(&BlendMode::SoftLight).unwrap();
        assert_eq!(json, "\"soft-light\"");
        let normal: BlendMode = serde_json::from_str("\"source-over\"").unwrap();
        assert_eq!(normal, BlendMode::Normal);
    }

    #[test]
    fn opaque_normal_replaces_base() {
        assert_eq!(blend_pixel(GREY, RED, BlendMode::Normal, 1.0), RED);
    }

    #[test]
    fn zero_opacity_keeps_base() {
        assert_eq!(blend_pixel(GREY, RED, BlendMode::Multiply, 0.0), GREY);
    }

    #[test]
    fn half_opacity_normal_mixes_evenly() {
        let out = blend_pixel(Rgba([0, 0, 0, 255]), Rgba([200, 100, 50, 255]), BlendMode::Normal, 0.5);
        assert_eq!(out, Rgba([100, 50, 25, 255]));
    }

    #[test]
    fn multiply_with_white_is_identity() {
        let white = Rgba([255, 255, 255, 255]);
        assert_eq!(blend_pixel(GREY, white, BlendMode::Multiply, 1.0), GREY);
    }

    #[test]
    fn screen_with_black_is_identity() {
        let black = Rgba([0, 0, 0, 255]);
        assert_eq!(blend_pixel(GREY, black, BlendMode::Screen, 1.0), GREY);
    }

    #[test]
    fn difference_of_equal_colours_is_black() {
        assert_eq!(blend_pixel(GREY, GREY, BlendMode::Difference, 1.0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn transparent_base_takes_top_colour() {
        let out = blend_pixel(Rgba([0, 0, 0, 0]), RED, BlendMode::Multiply, 1.0);
        assert_eq!(out, RED);
    }
}
