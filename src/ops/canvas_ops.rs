// ============================================================================
// CANVAS OPERATIONS — overlay blending and mask-scoped compositing
// ============================================================================

use image::{GrayImage, RgbaImage, imageops};
use rayon::prelude::*;

use crate::canvas::{BlendMode, blend_pixel};

/// Scale `img` to `w`×`h` unless it already has that size.
fn fit(img: &RgbaImage, w: u32, h: u32) -> std::borrow::Cow<'_, RgbaImage> {
    if img.dimensions() == (w, h) {
        std::borrow::Cow::Borrowed(img)
    } else {
        std::borrow::Cow::Owned(imageops::resize(img, w, h, imageops::FilterType::Triangle))
    }
}

/// Draw `base`, then `overlay` stretched to the base size with `mode` at
/// `opacity` (0.0..=1.0). Used for textures and result blending.
pub fn blend_images(base: &RgbaImage, overlay: &RgbaImage, mode: BlendMode, opacity: f32) -> RgbaImage {
    let (w, h) = base.dimensions();
    if w == 0 || h == 0 || overlay.width() == 0 || overlay.height() == 0 {
        return base.clone();
    }
    let overlay = fit(overlay, w, h);
    let opacity = opacity.clamp(0.0, 1.0);

    let mut out = base.clone();
    let stride = w as usize * 4;
    let top_raw = overlay.as_raw();
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let top_row = &top_raw[y * stride..(y + 1) * stride];
        for (px, top) in row.chunks_exact_mut(4).zip(top_row.chunks_exact(4)) {
            let blended = blend_pixel(
                image::Rgba([px[0], px[1], px[2], px[3]]),
                image::Rgba([top[0], top[1], top[2], top[3]]),
                mode,
                opacity,
            );
            px.copy_from_slice(&blended.0);
        }
    });
    out
}

/// Keep `edited` where the mask is set and `original` elsewhere, mixing
/// proportionally on soft mask edges. The mask is scaled to the image.
pub fn composite_masked(original: &RgbaImage, edited: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    let (w, h) = original.dimensions();
    let edited = fit(edited, w, h);
    let mask = if mask.dimensions() == (w, h) {
        std::borrow::Cow::Borrowed(mask)
    } else {
        std::borrow::Cow::Owned(imageops::resize(mask, w, h, imageops::FilterType::Triangle))
    };

    let mut out = original.clone();
    let stride = w as usize * 4;
    let edited_raw = edited.as_raw();
    let mask_raw = mask.as_raw();
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let edited_row = &edited_raw[y * stride..(y + 1) * stride];
        let mask_row = &mask_raw[y * w as usize..(y + 1) * w as usize];
        for ((px, ed), &m) in row
            .chunks_exact_mut(4)
            .zip(edited_row.chunks_exact(4))
            .zip(mask_row)
        {
            match m {
                0 => {}
                255 => px.copy_from_slice(ed),
                m => {
                    let t = m as u32;
                    for c in 0..4 {
                        px[c] = ((px[c] as u32 * (255 - t) + ed[c] as u32 * t + 127) / 255) as u8;
                    }
                }
            }
        }
    });
    out
}

/// Preview blend: the result drawn over the original at `amount` (0..=1),
/// on a canvas the size of the result.
pub fn mix(original: &RgbaImage, result: &RgbaImage, amount: f32) -> RgbaImage {
    let (w, h) = result.dimensions();
    let original = fit(original, w, h);
    blend_images(&original, result, BlendMode::Normal, amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    #[test]
    fn overlay_is_scaled_to_base() {
        let base = RgbaImage::from_pixel(8, 6, Rgba([10, 10, 10, 255]));
        let tex = RgbaImage::from_pixel(2, 2, Rgba([200, 200, 200, 255]));
        let out = blend_images(&base, &tex, BlendMode::Normal, 1.0);
        assert_eq!(out.dimensions(), (8, 6));
        assert!(out.pixels().all(|p| *p == Rgba([200, 200, 200, 255])));
    }

    #[test]
    fn zero_opacity_keeps_base() {
        let base = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255]));
        let tex = RgbaImage::from_pixel(3, 3, Rgba([250, 250, 250, 255]));
        assert_eq!(blend_images(&base, &tex, BlendMode::Multiply, 0.0), base);
    }

    #[test]
    fn multiply_darkens() {
        let base = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 255]));
        let tex = RgbaImage::from_pixel(1, 1, Rgba([128, 128, 128, 255]));
        let out = blend_images(&base, &tex, BlendMode::Multiply, 1.0);
        let px = out.get_pixel(0, 0);
        assert!(px[0] < 200 && px[1] < 100 && px[2] < 50);
    }

    #[test]
    fn masked_composite_respects_mask_and_edges() {
        let original = RgbaImage::from_pixel(3, 1, Rgba([0, 0, 0, 255]));
        let edited = RgbaImage::from_pixel(3, 1, Rgba([255, 255, 255, 255]));
        let mut mask = GrayImage::new(3, 1);
        mask.put_pixel(0, 0, Luma([255]));
        mask.put_pixel(1, 0, Luma([128]));
        let out = composite_masked(&original, &edited, &mask);
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(1, 0)[0], 128);
        assert_eq!(out.get_pixel(2, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn mix_half_way() {
        let original = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let result = RgbaImage::from_pixel(2, 2, Rgba([200, 200, 200, 255]));
        let out = mix(&original, &result, 0.5);
        assert_eq!(out.dimensions(), (2, 2));
        assert_eq!(out.get_pixel(0, 0)[0], 100);
        assert_eq!(mix(&original, &result, 1.0), result);
    }
}
