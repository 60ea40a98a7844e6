// ============================================================================
// TEXT OVERLAY — stroked, filled multi-line text at a normalized position
// ============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::CompositeError;
use crate::canvas::{BlendMode, blend_pixel};
use crate::components::tools::ToolParams;
use crate::params;

/// Text alignment options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    Left,
    #[default]
    Center,
    Right,
}

impl TextAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextAlignment::Left => "left",
            TextAlignment::Center => "center",
            TextAlignment::Right => "right",
        }
    }

    pub fn label(&self) -> String {
        match self {
            TextAlignment::Left => t!("text_alignment.left"),
            TextAlignment::Center => t!("text_alignment.center"),
            TextAlignment::Right => t!("text_alignment.right"),
        }
    }

    /// Offset of the line start from the anchor.
    fn offset(&self, line_width: f32) -> f32 {
        match self {
            TextAlignment::Left => 0.0,
            TextAlignment::Center => -line_width * 0.5,
            TextAlignment::Right => -line_width,
        }
    }
}

impl FromStr for TextAlignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Ok(TextAlignment::Left),
            "center" | "centre" | "middle" => Ok(TextAlignment::Center),
            "right" | "end" => Ok(TextAlignment::Right),
            other => Err(format!("unknown alignment '{other}'")),
        }
    }
}

/// Largest text size, as a percentage of the image width.
pub const MAX_TEXT_SIZE: f32 = 100.0;
/// Stroke half-width ceiling in pixels. Huge text keeps a readable outline
/// without the dilation cost growing with the font size.
const MAX_STROKE_RADIUS: f32 = 4.0;

/// Text to draw. `size` is a percentage of the image width; `x`/`y` are
/// percentages of the image size and mark the anchor of the text block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOverlay {
    pub content: String,
    pub font: String,
    pub size: f32,
    pub color: String,
    pub align: TextAlignment,
    pub x: f32,
    pub y: f32,
    pub bold: bool,
    pub italic: bool,
}

impl Default for TextOverlay {
    fn default() -> Self {
        Self {
            content: String::new(),
            font: "Impact".to_string(),
            size: 10.0,
            color: "#FFFFFF".to_string(),
            align: TextAlignment::Center,
            x: 50.0,
            y: 50.0,
            bold: false,
            italic: false,
        }
    }
}

impl TextOverlay {
    pub fn params(&self) -> ToolParams {
        params! {
            "content" => self.content,
            "font" => self.font,
            "size" => self.size,
            "color" => self.color,
            "align" => self.align.as_str(),
            "x" => self.x,
            "y" => self.y,
            "bold" => self.bold,
            "italic" => self.italic,
        }
    }

    /// Read from loose params. Missing keys keep the defaults.
    pub fn from_params(params: &ToolParams) -> Result<Self, String> {
        let value = serde_json::Value::Object(params.clone().into_iter().collect());
        let mut overlay: TextOverlay =
            serde_json::from_value(value).map_err(|e| format!("invalid text parameters: {e}"))?;
        overlay.content = overlay.content.replace("\\n", "\n");
        overlay.validate().map_err(|e| e.to_string())?;
        Ok(overlay)
    }

    /// Size must lie in `(0, MAX_TEXT_SIZE]` and the anchor must be finite.
    pub fn validate(&self) -> Result<(), CompositeError> {
        if !(self.size.is_finite() && self.size > 0.0 && self.size <= MAX_TEXT_SIZE) {
            return Err(CompositeError::TextSize(self.size));
        }
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err(CompositeError::TextPosition(self.x, self.y));
        }
        Ok(())
    }
}

/// Half the stroke width for text `px` pixels tall, capped.
fn stroke_radius(px: f32) -> f32 {
    ((px * 0.05).max(1.0) / 2.0).min(MAX_STROKE_RADIUS)
}

/// `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
pub fn parse_hex_color(s: &str) -> Option<[u8; 4]> {
    let hex = s.trim().strip_prefix('#')?;
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok();
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        3 => Some([nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17, 255]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

// ============================================================================
// LAYOUT + RASTER
// ============================================================================

/// Lay out a single line of text at the origin. Returns glyphs with their
/// x offsets and the line's advance width.
fn layout_line(font: &FontArc, scale: PxScale, text: &str) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    (glyphs, cursor_x)
}

/// Draw `overlay` onto a copy of `img`: a black stroke of width
/// `max(1, px * 0.05)` (at most `2 * MAX_STROKE_RADIUS`) first, then the fill. Lines are 1.2 em apart and the
/// block is vertically centred on the anchor.
pub fn render_text(img: &RgbaImage, overlay: &TextOverlay, font: &FontArc) -> Result<RgbaImage, CompositeError> {
    overlay.validate()?;
    let color = parse_hex_color(&overlay.color).ok_or_else(|| CompositeError::InvalidColor(overlay.color.clone()))?;
    let (w, h) = img.dimensions();
    let mut out = img.clone();
    if overlay.content.trim().is_empty() || w == 0 || h == 0 {
        return Ok(out);
    }

    let px = (overlay.size / 100.0 * w as f32).max(1.0);
    // ab_glyph scales by ascent-descent height; convert from an em size
    let scale = match font.units_per_em() {
        Some(upem) if upem > 0.0 => PxScale::from(px * font.height_unscaled() / upem),
        _ => PxScale::from(px),
    };
    let scaled = font.as_scaled(scale);
    let line_height = px * 1.2;

    let lines: Vec<&str> = overlay.content.split('\n').collect();
    let anchor_x = overlay.x / 100.0 * w as f32;
    let anchor_y = overlay.y / 100.0 * h as f32;
    let first_middle = anchor_y - (lines.len() as f32 - 1.0) * line_height / 2.0;
    // Baseline sits below the middle of the glyph box by half of (ascent + descent)
    let middle_to_baseline = (scaled.ascent() + scaled.descent()) / 2.0;

    let mut coverage = vec![0.0f32; w as usize * h as usize];
    for (i, line) in lines.iter().enumerate() {
        let baseline = first_middle + i as f32 * line_height + middle_to_baseline;
        let (glyphs, width) = layout_line(font, scale, line);
        let start_x = anchor_x + overlay.align.offset(width);

        for (glyph_id, gx) in glyphs {
            let glyph = glyph_id.with_scale_and_position(scale, point(start_x + gx, baseline));
            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, cov| {
                let mut cx = bounds.min.x + gx as f32;
                let cy = bounds.min.y + gy as f32;
                if overlay.italic {
                    cx += (baseline - cy) * 0.2;
                }
                let ix = cx.round() as i64;
                let iy = cy.round() as i64;
                let mut plot = |x: i64| {
                    if x >= 0 && iy >= 0 && x < w as i64 && iy < h as i64 {
                        let idx = iy as usize * w as usize + x as usize;
                        coverage[idx] = coverage[idx].max(cov);
                    }
                };
                plot(ix);
                if overlay.bold {
                    plot(ix + 1);
                }
            });
        }
    }

    let stroke = dilate(&coverage, w, h, stroke_radius(px));
    for (i, (fill, edge)) in coverage.iter().zip(&stroke).enumerate() {
        let x = (i % w as usize) as u32;
        let y = (i / w as usize) as u32;
        let mut px = *out.get_pixel(x, y);
        if *edge > 0.001 {
            px = blend_pixel(px, Rgba([0, 0, 0, 255]), BlendMode::Normal, *edge);
        }
        if *fill > 0.001 {
            px = blend_pixel(px, Rgba(color), BlendMode::Normal, *fill);
        }
        out.put_pixel(x, y, px);
    }
    Ok(out)
}

/// Max-filter over a disc of `radius`: the outline a centred stroke covers.
/// Output rows are filled in parallel, each from the source rows within reach.
fn dilate(coverage: &[f32], w: u32, h: u32, radius: f32) -> Vec<f32> {
    let r = radius.ceil() as i64;
    let reach = (radius + 0.5) * (radius + 0.5);
    // (row offset, half width of the disc on that row)
    let spans: Vec<(i64, i64)> = (-r..=r)
        .filter_map(|dy| {
            let room = reach - (dy * dy) as f32;
            (room >= 0.0).then(|| (dy, room.sqrt().floor() as i64))
        })
        .collect();

    let (wu, h) = (w as usize, h as i64);
    let mut out = vec![0.0f32; coverage.len()];
    if wu == 0 {
        return out;
    }
    out.par_chunks_mut(wu).enumerate().for_each(|(y, row)| {
        for &(dy, half) in &spans {
            let sy = y as i64 + dy;
            if sy < 0 || sy >= h {
                continue;
            }
            let src = &coverage[sy as usize * wu..(sy as usize + 1) * wu];
            for (sx, &c) in src.iter().enumerate() {
                if c <= 0.001 {
                    continue;
                }
                let lo = (sx as i64 - half).max(0) as usize;
                let hi = (sx as i64 + half).min(wu as i64 - 1) as usize;
                for v in &mut row[lo..=hi] {
                    *v = v.max(c);
                }
            }
        }
    });
    out
}

// ============================================================================
// FONT LOOKUP
// ============================================================================

const FALLBACK_FAMILIES: &[&str] = &["dejavusans", "liberationsans", "arial", "helvetica", "notosans", "freesans"];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Finds font files by family name under a set of directories.
pub struct FontResolver {
    dirs: Vec<PathBuf>,
    files: Mutex<Option<Vec<PathBuf>>>,
    loaded: Mutex<HashMap<(String, bool, bool), Option<FontArc>>>,
}

impl FontResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            files: Mutex::new(None),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn font_files(&self) -> Vec<PathBuf> {
        let mut guard = self.files.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .get_or_insert_with(|| {
                let mut files = Vec::new();
                for dir in &self.dirs {
                    for ext in ["ttf", "otf", "TTF", "OTF"] {
                        let pattern = dir.join("**").join(format!("*.{ext}"));
                        let Some(pattern) = pattern.to_str() else { continue };
                        if let Ok(paths) = glob::glob(pattern) {
                            files.extend(paths.flatten());
                        }
                    }
                }
                files
            })
            .clone()
    }

    /// Best match for `family`, falling back to a common sans face.
    pub fn resolve(&self, family: &str, bold: bool, italic: bool) -> Option<FontArc> {
        let key = (normalize(family), bold, italic);
        if let Some(hit) = self.loaded.lock().unwrap_or_else(|p| p.into_inner()).get(&key) {
            return hit.clone();
        }

        let files = self.font_files();
        let wanted = std::iter::once(key.0.as_str()).chain(FALLBACK_FAMILIES.iter().copied());
        let font = wanted
            .filter(|f| !f.is_empty())
            .find_map(|f| best_file(&files, f, bold, italic))
            .and_then(|path| match std::fs::read(&path) {
                Ok(bytes) => FontArc::try_from_vec(bytes).ok(),
                Err(e) => {
                    log_warn!("Failed to read font {}: {}", path.display(), e);
                    None
                }
            });
        if font.is_none() {
            log_warn!("No font found for '{}'", family);
        }

        self.loaded
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, font.clone());
        font
    }
}

fn best_file(files: &[PathBuf], family: &str, bold: bool, italic: bool) -> Option<PathBuf> {
    files
        .iter()
        .filter_map(|path| {
            let stem = normalize(path.file_stem()?.to_str()?);
            let rest = stem.strip_prefix(family)?;
            let is_bold = rest.contains("bold") || rest.contains("bd");
            let is_italic = rest.contains("italic") || rest.contains("oblique") || rest.ends_with('i');
            let mut score = if rest.is_empty() || rest == "regular" { 4 } else { 0 };
            score += if is_bold == bold { 3 } else { 0 };
            score += if is_italic == italic { 3 } else { 0 };
            Some((score, path))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, path)| path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#FFFFFF"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_color("#f00"), Some([255, 0, 0, 255]));
        assert_eq!(parse_hex_color("#11223380"), Some([0x11, 0x22, 0x33, 0x80]));
        assert_eq!(parse_hex_color("white"), None);
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#ééé"), None);
    }

    #[test]
    fn defaults_and_params() {
        let t = TextOverlay::default();
        assert_eq!((t.size, t.x, t.y), (10.0, 50.0, 50.0));
        assert_eq!(t.color, "#FFFFFF");
        assert_eq!(t.align, TextAlignment::Center);
        let p = TextOverlay {
            content: "hi".into(),
            ..t
        }
        .params();
        assert_eq!(p["align"], "center");
        assert_eq!(p["content"], "hi");

        let parsed = TextOverlay::from_params(&crate::params! {
            "content" => "top\\nbottom", "size" => 5, "align" => "left"
        })
        .unwrap();
        assert_eq!(parsed.content, "top\nbottom");
        assert_eq!(parsed.size, 5.0);
        assert_eq!(parsed.align, TextAlignment::Left);
        assert_eq!(parsed.font, "Impact");
    }

    #[test]
    fn dilate_grows_by_radius() {
        let mut cov = vec![0.0; 25];
        cov[12] = 1.0;
        let out = dilate(&cov, 5, 5, 1.0);
        assert_eq!(out[12], 1.0);
        assert_eq!(out[7], 1.0);
        assert_eq!(out[11], 1.0);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn dilate_disc_skips_the_corners() {
        let mut cov = vec![0.0; 49];
        cov[24] = 0.5;
        let out = dilate(&cov, 7, 7, 2.0);
        assert_eq!(out[24 - 14], 0.5, "two rows up");
        assert_eq!(out[24 + 2], 0.5, "two columns right");
        assert_eq!(out[24 - 14 - 2], 0.0, "corner of the square");
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn out_of_range_sizes_are_rejected() {
        for size in [0.0, -5.0, 100.5, 4000.0, f32::NAN, f32::INFINITY] {
            let overlay = TextOverlay {
                content: "x".into(),
                size,
                ..TextOverlay::default()
            };
            assert!(matches!(overlay.validate(), Err(CompositeError::TextSize(_))), "size {size}");
        }
        assert!(TextOverlay::from_params(&crate::params! { "size" => 250 }).is_err());
        assert!(TextOverlay::from_params(&crate::params! { "size" => 100 }).is_ok());
    }

    #[test]
    fn stroke_stays_thin_on_huge_text() {
        assert_eq!(stroke_radius(10.0), 0.5);
        assert_eq!(stroke_radius(100.0), 2.5);
        assert_eq!(stroke_radius(4000.0), MAX_STROKE_RADIUS);
    }

    #[test]
    fn picks_regular_and_bold_variants() {
        let files: Vec<PathBuf> = ["DejaVuSans.ttf", "DejaVuSans-Bold.ttf", "DejaVuSans-Oblique.ttf", "Arial.ttf"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(best_file(&files, "dejavusans", false, false), Some(PathBuf::from("DejaVuSans.ttf")));
        assert_eq!(best_file(&files, "dejavusans", true, false), Some(PathBuf::from("DejaVuSans-Bold.ttf")));
        assert_eq!(best_file(&files, "dejavusans", false, true), Some(PathBuf::from("DejaVuSans-Oblique.ttf")));
        assert_eq!(best_file(&files, "impact", false, false), None);
    }

    #[test]
    fn renders_with_a_system_font_when_one_exists() {
        let resolver = FontResolver::new(crate::settings::default_font_dirs());
        let Some(font) = resolver.resolve("DejaVu Sans", false, false) else {
            return;
        };
        let img = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 255, 255]));
        let overlay = TextOverlay {
            content: "Hi".into(),
            size: 20.0,
            ..TextOverlay::default()
        };
        let out = render_text(&img, &overlay, &font).unwrap();
        assert_eq!(out.dimensions(), img.dimensions());
        assert!(out.pixels().any(|p| p[0] > 200 && p[1] > 200), "white fill drawn");
        assert!(out.pixels().any(|p| p[0] < 30 && p[2] < 30), "black stroke drawn");
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }
}
