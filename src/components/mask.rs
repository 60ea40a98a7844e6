// ============================================================================
// MASK CANVAS — brush / bounding-box selection mask at image resolution
// ============================================================================

use image::{GrayImage, Luma, imageops};
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactError};

/// Normalized box, all coordinates in `[0, 1]` of the image size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Clamp into the unit square and order the corners.
    pub fn normalized(&self) -> Self {
        let (x0, x1) = order(self.x_min.clamp(0.0, 1.0), self.x_max.clamp(0.0, 1.0));
        let (y0, y1) = order(self.y_min.clamp(0.0, 1.0), self.y_max.clamp(0.0, 1.0));
        Self {
            x_min: x0,
            y_min: y0,
            x_max: x1,
            y_max: y1,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Pixel rectangle `(x, y, w, h)` for an image of `width`×`height`.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let b = self.normalized();
        let x0 = (b.x_min * width as f32).floor() as u32;
        let y0 = (b.y_min * height as f32).floor() as u32;
        let x1 = ((b.x_max * width as f32).ceil() as u32).min(width);
        let y1 = ((b.y_max * height as f32).ceil() as u32).min(height);
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

fn order(a: f32, b: f32) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Paint surface producing a single-channel mask (255 = included).
///
/// Pointer positions arrive in display coordinates and are mapped to image
/// pixels through `view_scale`, so the mask always matches the image
/// resolution regardless of zoom.
#[derive(Clone, Debug)]
pub struct MaskCanvas {
    surface: GrayImage,
    /// Brush radius in display pixels.
    brush_size: f32,
    /// Image pixels per display pixel.
    view_scale: f32,
    drawing: bool,
    last_point: Option<(f32, f32)>,
    painted: bool,
}

impl MaskCanvas {
    pub const DEFAULT_BRUSH_SIZE: f32 = 20.0;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: GrayImage::new(width, height),
            brush_size: Self::DEFAULT_BRUSH_SIZE,
            view_scale: 1.0,
            drawing: false,
            last_point: None,
            painted: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Re-target to a new image size. Any existing mask is discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface = GrayImage::new(width, height);
        self.reset_stroke();
        self.painted = false;
    }

    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    pub fn set_brush_size(&mut self, radius: f32) {
        self.brush_size = radius.clamp(1.0, 500.0);
    }

    /// Set the display→image mapping from the on-screen width of the image.
    pub fn set_display_width(&mut self, display_width: f32) {
        if display_width > 0.0 {
            self.view_scale = self.surface.width() as f32 / display_width;
        }
    }

    pub fn set_view_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.view_scale = scale;
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn start_drawing(&mut self, point: (f32, f32)) {
        self.drawing = true;
        let p = self.to_image(point);
        self.stamp(p);
        self.last_point = Some(p);
    }

    /// Extend the current stroke. Ignored when no stroke is in progress.
    pub fn draw(&mut self, point: (f32, f32)) {
        if !self.drawing {
            return;
        }
        let p = self.to_image(point);
        match self.last_point {
            Some(start) => self.stamp_line(start, p),
            None => self.stamp(p),
        }
        self.last_point = Some(p);
    }

    pub fn stop_drawing(&mut self) {
        self.reset_stroke();
    }

    /// Replace the mask with the rectangle covered by `bbox`, sized to the image.
    pub fn set_from_bounding_box(&mut self, bbox: &BoundingBox, image_width: u32, image_height: u32) {
        self.resize(image_width, image_height);
        if !bbox.is_finite() {
            return;
        }
        let (x, y, w, h) = bbox.to_pixels(image_width, image_height);
        for py in y..y + h {
            for px in x..x + w {
                self.surface.put_pixel(px, py, Luma([255]));
            }
        }
        self.painted = w > 0 && h > 0;
    }

    pub fn clear(&mut self) {
        for p in self.surface.pixels_mut() {
            p.0[0] = 0;
        }
        self.reset_stroke();
        self.painted = false;
    }

    pub fn is_empty(&self) -> bool {
        !self.painted
    }

    /// The mask raster, or `None` when nothing has been painted.
    pub fn to_mask(&self) -> Option<GrayImage> {
        (!self.is_empty()).then(|| self.surface.clone())
    }

    /// Encode as an opaque black/white PNG for remote requests.
    pub fn to_artifact(&self) -> Result<Option<Artifact>, ArtifactError> {
        match self.to_mask() {
            Some(mask) => Artifact::from_gray("mask.png", &mask).map(Some),
            None => Ok(None),
        }
    }

    /// Load a mask image: coverage = luminance × alpha, scaled to the canvas size.
    pub fn load_artifact(&mut self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let rgba = artifact.decode_rgba()?;
        let mut gray = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let p = rgba.get_pixel(x, y).0;
            let luma = (p[0] as u32 * 299 + p[1] as u32 * 587 + p[2] as u32 * 114) / 1000;
            Luma([((luma * p[3] as u32) / 255) as u8])
        });
        if gray.dimensions() != self.surface.dimensions() && self.width() > 0 && self.height() > 0 {
            gray = imageops::resize(&gray, self.width(), self.height(), imageops::FilterType::Triangle);
        }
        self.painted = gray.pixels().any(|p| p.0[0] > 0);
        self.surface = gray;
        self.reset_stroke();
        Ok(())
    }

    fn reset_stroke(&mut self) {
        self.drawing = false;
        self.last_point = None;
    }

    fn to_image(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (x * self.view_scale, y * self.view_scale)
    }

    fn radius_px(&self) -> f32 {
        (self.brush_size * self.view_scale).max(0.5)
    }

    /// Lerp stamps from `from` to `to` at a quarter-radius spacing.
    fn stamp_line(&mut self, from: (f32, f32), to: (f32, f32)) {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        let dist = (dx * dx + dy * dy).sqrt();
        let spacing = (self.radius_px() * 0.25).max(0.5);
        let steps = (dist / spacing).ceil().max(1.0) as u32;
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            self.stamp((from.0 + dx * t, from.1 + dy * t));
        }
    }

    fn stamp(&mut self, (cx, cy): (f32, f32)) {
        let radius = self.radius_px();
        let (w, h) = self.surface.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let min_x = (cx - radius).floor().max(0.0) as u32;
        let min_y = (cy - radius).floor().max(0.0) as u32;
        let max_x = ((cx + radius).ceil().max(0.0) as u32).min(w - 1);
        let max_y = ((cy + radius).ceil().max(0.0) as u32).min(h - 1);
        if cx + radius < 0.0 || cy + radius < 0.0 || min_x > max_x || min_y > max_y {
            return;
        }
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let ddx = x as f32 + 0.5 - cx;
                let ddy = y as f32 + 0.5 - cy;
                let dist = (ddx * ddx + ddy * ddy).sqrt();
                // One-pixel anti-aliased rim
                let coverage = (radius - dist + 0.5).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                let value = (coverage * 255.0).round() as u8;
                let px = self.surface.get_pixel_mut(x, y);
                if value > px.0[0] {
                    px.0[0] = value;
                    self.painted = true;
                }
            }
        }
    }
}
