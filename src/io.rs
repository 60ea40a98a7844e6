// ============================================================================
// FILE I/O — load artifacts from disk, encode and write results
// ============================================================================

use std::fs::{self, File};
use std::io::{BufWriter, Cursor};
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, ImageFormat, RgbaImage};

use crate::artifact::{Artifact, ArtifactError};

/// Output formats for saved results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl SaveFormat {
    pub fn all() -> &'static [SaveFormat] {
        &[SaveFormat::Png, SaveFormat::Jpeg, SaveFormat::Webp, SaveFormat::Bmp]
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            SaveFormat::Png => "image/png",
            SaveFormat::Jpeg => "image/jpeg",
            SaveFormat::Webp => "image/webp",
            SaveFormat::Bmp => "image/bmp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            _ => None,
        }
    }
}

/// Guess a mime type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ImageFormat::from_extension(&ext) {
        Some(ImageFormat::Png) => "image/png",
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::WebP) => "image/webp",
        Some(ImageFormat::Bmp) => "image/bmp",
        Some(ImageFormat::Gif) => "image/gif",
        Some(ImageFormat::Tiff) => "image/tiff",
        Some(ImageFormat::Tga) => "image/x-tga",
        Some(ImageFormat::Ico) => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// File extension for an artifact's mime type. Unknown types fall back to png.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "video/mp4" => "mp4",
        _ => "png",
    }
}

/// Read an image file into an artifact without re-encoding it.
/// The bytes are decoded once to make sure they really are an image.
pub fn load_artifact(path: &Path) -> Result<Artifact, ArtifactError> {
    let bytes = fs::read(path).map_err(|e| ArtifactError::Decode {
        name: path.display().to_string(),
        source: ImageError::IoError(e),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mut mime = mime_for_path(path);
    if let Ok(format) = image::guess_format(&bytes) {
        mime = format_mime(format).unwrap_or(mime);
    }
    let artifact = Artifact::new(name, mime, bytes);
    artifact.dimensions()?;
    Ok(artifact)
}

fn format_mime(format: ImageFormat) -> Option<&'static str> {
    Some(match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Tiff => "image/tiff",
        _ => return None,
    })
}

/// Encode a raster in the requested format. `quality` only affects JPEG.
pub fn encode_image(image: &RgbaImage, format: SaveFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut buf).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Webp => {
            DynamicImage::ImageRgba8(image.clone())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut buf);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
    }
    Ok(buf)
}

/// Write an artifact to `path`.
///
/// When the artifact is already in the target format its bytes are written
/// verbatim; otherwise it is decoded and re-encoded.
pub fn write_artifact(artifact: &Artifact, path: &Path, format: SaveFormat, quality: u8) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::Encode(ImageError::IoError(e)))?;
    }
    let bytes = if artifact.mime_type() == format.mime_type() && format != SaveFormat::Jpeg {
        artifact.bytes().to_vec()
    } else {
        let rgba = artifact.decode_rgba()?;
        encode_image(&rgba, format, quality)?
    };
    let file = File::create(path).map_err(|e| ArtifactError::Encode(ImageError::IoError(e)))?;
    let mut writer = BufWriter::new(file);
    std::io::Write::write_all(&mut writer, &bytes)
        .and_then(|_| std::io::Write::flush(&mut writer))
        .map_err(|e| ArtifactError::Encode(ImageError::IoError(e)))?;
    Ok(())
}

/// Write raw bytes (e.g. a downloaded video) to `path`.
pub fn write_bytes(bytes: &[u8], path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(4, 3, |x, y| Rgba([(x * 60) as u8, (y * 80) as u8, 10, 255]))
    }

    #[test]
    fn load_detects_format_from_content() {
        let dir = tempfile::tempdir().unwrap();
        // PNG bytes behind a misleading extension
        let path = dir.path().join("photo.jpg");
        fs::write(&path, encode_image(&sample(), SaveFormat::Png, 90).unwrap()).unwrap();
        let art = load_artifact(&path).unwrap();
        assert_eq!(art.mime_type(), "image/png");
        assert_eq!(art.name(), "photo.jpg");
        assert_eq!(art.dimensions().unwrap(), (4, 3));
    }

    #[test]
    fn load_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        fs::write(&path, b"definitely not a png").unwrap();
        assert!(load_artifact(&path).is_err());
    }

    #[test]
    fn write_reencodes_to_requested_format() {
        let dir = tempfile::tempdir().unwrap();
        let art = Artifact::from_rgba("a.png", &sample()).unwrap();
        let out = dir.path().join("sub").join("a.jpg");
        write_artifact(&art, &out, SaveFormat::Jpeg, 85).unwrap();
        let back = load_artifact(&out).unwrap();
        assert_eq!(back.mime_type(), "image/jpeg");
        assert_eq!(back.dimensions().unwrap(), (4, 3));
    }

    #[test]
    fn png_to_png_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let art = Artifact::from_rgba("a.png", &sample()).unwrap();
        let out = dir.path().join("a.png");
        write_artifact(&art, &out, SaveFormat::Png, 100).unwrap();
        assert_eq!(fs::read(&out).unwrap(), art.bytes());
    }
}
