// ============================================================================
// TRANSFORM OPERATIONS — crop, rotate, flip
// ============================================================================

use std::fmt;
use std::str::FromStr;

use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};

use super::CompositeError;

/// Pixel rectangle inside an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// `WxH+X+Y`, or `X,Y,W,H`.
impl FromStr for CropRect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("invalid crop rectangle '{s}' (expected WxH+X+Y or X,Y,W,H)");
        let nums: Vec<u32> = if s.contains('x') {
            let (size, offset) = s.split_once('+').ok_or_else(bad)?;
            let (w, h) = size.split_once('x').ok_or_else(bad)?;
            let (x, y) = offset.split_once('+').ok_or_else(bad)?;
            [x, y, w, h]
                .iter()
                .map(|v| v.trim().parse().map_err(|_| bad()))
                .collect::<Result<_, _>>()?
        } else {
            s.split(',')
                .map(|v| v.trim().parse().map_err(|_| bad()))
                .collect::<Result<_, _>>()?
        };
        match nums.as_slice() {
            [x, y, width, height] => Ok(CropRect {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => Err(bad()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformKind {
    /// 90° counter-clockwise.
    RotateLeft,
    /// 90° clockwise.
    RotateRight,
    FlipHorizontal,
    FlipVertical,
}

impl TransformKind {
    pub fn all() -> &'static [TransformKind] {
        &[
            TransformKind::RotateLeft,
            TransformKind::RotateRight,
            TransformKind::FlipHorizontal,
            TransformKind::FlipVertical,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::RotateLeft => "rotate-left",
            TransformKind::RotateRight => "rotate-right",
            TransformKind::FlipHorizontal => "flip-horizontal",
            TransformKind::FlipVertical => "flip-vertical",
        }
    }

    pub fn label(&self) -> String {
        t!(&format!("transform.{}", self.as_str()))
    }

    /// Quarter turns swap width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, TransformKind::RotateLeft | TransformKind::RotateRight)
    }
}

impl FromStr for TransformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('_', "-");
        TransformKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown transform '{s}'"))
    }
}

/// Copy out `rect`. Rectangles reaching past the image are rejected.
pub fn crop(img: &RgbaImage, rect: CropRect) -> Result<RgbaImage, CompositeError> {
    if rect.width == 0 || rect.height == 0 {
        return Err(CompositeError::EmptyRect);
    }
    if !rect.fits(img.width(), img.height()) {
        return Err(CompositeError::OutOfBounds {
            rect,
            image_width: img.width(),
            image_height: img.height(),
        });
    }
    Ok(imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image())
}

pub fn apply_transform(img: &RgbaImage, kind: TransformKind) -> RgbaImage {
    match kind {
        TransformKind::RotateLeft => imageops::rotate270(img),
        TransformKind::RotateRight => imageops::rotate90(img),
        TransformKind::FlipHorizontal => imageops::flip_horizontal(img),
        TransformKind::FlipVertical => imageops::flip_vertical(img),
    }
}
