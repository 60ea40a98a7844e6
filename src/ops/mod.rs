// ============================================================================
// LOCAL COMPOSITOR — deterministic edits that never leave the machine
// ============================================================================
//
//   transform.rs   — crop, quarter-turn rotation, flips
//   adjustments.rs — CSS-style filter stack (brightness … blur)
//   canvas_ops.rs  — blend-mode overlay, masked composite, preview mix
//   text.rs        — text overlay rasterization and font lookup
//
// Every operation decodes the input artifact into an owned surface, works on
// that, and encodes a new artifact. Inputs are never touched.
// ============================================================================

pub mod adjustments;
pub mod canvas_ops;
pub mod text;
pub mod transform;

use image::GrayImage;
use thiserror::Error;

use crate::artifact::{Artifact, ArtifactError};
use crate::canvas::BlendMode;
use crate::components::tools::{ToolId, ToolParams};
use crate::params;

pub use adjustments::FilterStack;
pub use text::{FontResolver, TextAlignment, TextOverlay};
pub use transform::{CropRect, TransformKind};

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("crop {rect} is outside the {image_width}x{image_height} image")]
    OutOfBounds {
        rect: CropRect,
        image_width: u32,
        image_height: u32,
    },
    #[error("crop rectangle is empty")]
    EmptyRect,
    #[error("no usable font for '{0}'")]
    FontUnavailable(String),
    #[error("invalid color '{0}'")]
    InvalidColor(String),
    #[error("text size {0} is outside 0-100% of the image width")]
    TextSize(f32),
    #[error("text position ({0}, {1}) is not a number")]
    TextPosition(f32, f32),
}

/// One local edit with its parameters.
#[derive(Clone, Debug)]
pub enum LocalOp {
    Crop(CropRect),
    Transform(TransformKind),
    /// Recorded as `adjust`, or `localAdjust` when a mask scopes it.
    Filters(FilterStack),
    Texture {
        texture: Artifact,
        blend_mode: BlendMode,
        opacity: f32,
    },
    Text(TextOverlay),
}

impl LocalOp {
    pub fn tool(&self, masked: bool) -> ToolId {
        match self {
            LocalOp::Crop(_) => ToolId::Crop,
            LocalOp::Transform(_) => ToolId::Transform,
            LocalOp::Filters(_) if masked => ToolId::LocalAdjust,
            LocalOp::Filters(_) => ToolId::Adjust,
            LocalOp::Texture { .. } => ToolId::Texture,
            LocalOp::Text(_) => ToolId::Text,
        }
    }

    /// Only the filter stack is scoped by the mask.
    pub fn uses_mask(&self) -> bool {
        matches!(self, LocalOp::Filters(_))
    }

    pub fn params(&self) -> ToolParams {
        match self {
            LocalOp::Crop(r) => params! { "x" => r.x, "y" => r.y, "width" => r.width, "height" => r.height },
            LocalOp::Transform(kind) => params! { "kind" => kind.as_str() },
            LocalOp::Filters(stack) => params! { "filters" => stack.to_filter_string() },
            LocalOp::Texture {
                texture,
                blend_mode,
                opacity,
            } => params! {
                "texture" => texture.name(),
                "blend_mode" => blend_mode.name(),
                "opacity" => opacity,
            },
            LocalOp::Text(overlay) => overlay.params(),
        }
    }
}

/// Run a local edit on `base`. `mask` is only read by operations that use it.
pub fn apply_local(
    op: &LocalOp,
    base: &Artifact,
    mask: Option<&GrayImage>,
    fonts: &FontResolver,
) -> Result<Artifact, CompositeError> {
    let source = base.decode_rgba()?;
    let out = match op {
        LocalOp::Crop(rect) => transform::crop(&source, *rect)?,
        LocalOp::Transform(kind) => transform::apply_transform(&source, *kind),
        LocalOp::Filters(stack) => {
            let filtered = stack.render(&source);
            match mask {
                Some(mask) => canvas_ops::composite_masked(&source, &filtered, mask),
                None => filtered,
            }
        }
        LocalOp::Texture {
            texture,
            blend_mode,
            opacity,
        } => {
            let texture = texture.decode_rgba()?;
            canvas_ops::blend_images(&source, &texture, *blend_mode, *opacity)
        }
        LocalOp::Text(overlay) => {
            overlay.validate()?;
            let font = fonts
                .resolve(&overlay.font, overlay.bold, overlay.italic)
                .ok_or_else(|| CompositeError::FontUnavailable(overlay.font.clone()))?;
            text::render_text(&source, overlay, &font)?
        }
    };
    let name = format!("{}.png", op.tool(mask.is_some() && op.uses_mask()).id());
    Ok(Artifact::from_rgba(name, &out)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba, RgbaImage};

    fn base(w: u32, h: u32) -> Artifact {
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 128, 255]));
        Artifact::from_rgba("base.png", &img).unwrap()
    }

    fn no_fonts() -> FontResolver {
        FontResolver::new(Vec::new())
    }

    #[test]
    fn crop_yields_exact_size() {
        let rect = CropRect {
            x: 2,
            y: 3,
            width: 5,
            height: 4,
        };
        let out = apply_local(&LocalOp::Crop(rect), &base(10, 10), None, &no_fonts()).unwrap();
        assert_eq!(out.dimensions().unwrap(), (5, 4));
        let px = out.decode_rgba().unwrap();
        assert_eq!(px.get_pixel(0, 0), &Rgba([20, 30, 128, 255]));
    }

    #[test]
    fn input_artifact_is_untouched() {
        let input = base(6, 4);
        let before = input.bytes().to_vec();
        apply_local(&LocalOp::Transform(TransformKind::RotateLeft), &input, None, &no_fonts()).unwrap();
        assert_eq!(input.bytes(), before.as_slice());
    }

    #[test]
    fn masked_filters_only_touch_the_mask() {
        let input = base(4, 1);
        let mut mask = GrayImage::new(4, 1);
        mask.put_pixel(0, 0, Luma([255]));
        let stack = FilterStack {
            invert: 100.0,
            ..FilterStack::default()
        };
        let op = LocalOp::Filters(stack);
        let out = apply_local(&op, &input, Some(&mask), &no_fonts()).unwrap();
        let px = out.decode_rgba().unwrap();
        let orig = input.decode_rgba().unwrap();
        assert_eq!(px.get_pixel(0, 0)[2], 255 - 128);
        assert_eq!(px.get_pixel(1, 0), orig.get_pixel(1, 0));
        assert_eq!(op.tool(true), ToolId::LocalAdjust);
        assert_eq!(op.tool(false), ToolId::Adjust);
        assert_eq!(out.name(), "localAdjust.png");
    }

    #[test]
    fn missing_font_is_an_error() {
        let op = LocalOp::Text(TextOverlay {
            content: "hi".into(),
            ..TextOverlay::default()
        });
        assert!(matches!(
            apply_local(&op, &base(4, 4), None, &no_fonts()),
            Err(CompositeError::FontUnavailable(_))
        ));
    }

    #[test]
    fn oversized_text_fails_before_rendering() {
        let op = LocalOp::Text(TextOverlay {
            content: "huge".into(),
            size: 400.0,
            ..TextOverlay::default()
        });
        assert!(matches!(
            apply_local(&op, &base(4, 4), None, &no_fonts()),
            Err(CompositeError::TextSize(s)) if s == 400.0
        ));
    }

    #[test]
    fn params_record_what_was_done() {
        let p = LocalOp::Transform(TransformKind::FlipVertical).params();
        assert_eq!(p["kind"], "flip-vertical");
        let p = LocalOp::Filters(FilterStack::default()).params();
        assert_eq!(
            p["filters"],
            "brightness(100%) contrast(100%) saturate(100%) grayscale(0%) sepia(0%) hue-rotate(0deg) invert(0%) blur(0px)"
        );
    }
}
