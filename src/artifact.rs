// ============================================================================
// ARTIFACT — immutable encoded image blob
// ============================================================================

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, GrayImage, ImageEncoder, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("malformed data URL")]
    MalformedDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// An encoded image plus its name and content type.
///
/// The byte buffer is shared behind an `Arc` and never mutated, so cloning an
/// artifact (for previews, cache writes, history listings) is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Artifact {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Encode an RGBA raster as PNG.
    pub fn from_rgba(name: impl Into<String>, img: &RgbaImage) -> Result<Self, ArtifactError> {
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf).write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            ColorType::Rgba8,
        )?;
        Ok(Self::new(name, "image/png", buf))
    }

    /// Encode a single-channel raster as PNG (used for masks).
    pub fn from_gray(name: impl Into<String>, img: &GrayImage) -> Result<Self, ArtifactError> {
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf).write_image(img.as_raw(), img.width(), img.height(), ColorType::L8)?;
        Ok(Self::new(name, "image/png", buf))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Same bytes under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: self.mime_type.clone(),
            bytes: Arc::clone(&self.bytes),
        }
    }

    /// Decode into an owned raster. The artifact itself stays untouched.
    pub fn decode(&self) -> Result<DynamicImage, ArtifactError> {
        image::io::Reader::new(Cursor::new(self.bytes()))
            .with_guessed_format()
            .map_err(|e| ArtifactError::Decode {
                name: self.name.clone(),
                source: image::ImageError::IoError(e),
            })?
            .decode()
            .map_err(|source| ArtifactError::Decode {
                name: self.name.clone(),
                source,
            })
    }

    pub fn decode_rgba(&self) -> Result<RgbaImage, ArtifactError> {
        Ok(self.decode()?.to_rgba8())
    }

    pub fn dimensions(&self) -> Result<(u32, u32), ArtifactError> {
        let img = self.decode()?;
        Ok((img.width(), img.height()))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes())
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn from_base64(name: impl Into<String>, mime_type: impl Into<String>, data: &str) -> Result<Self, ArtifactError> {
        let bytes = BASE64.decode(data.trim())?;
        Ok(Self::new(name, mime_type, bytes))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(name: impl Into<String>, url: &str) -> Result<Self, ArtifactError> {
        let rest = url.strip_prefix("data:").ok_or(ArtifactError::MalformedDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(ArtifactError::MalformedDataUrl)?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or(ArtifactError::MalformedDataUrl)?;
        let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
        Self::from_base64(name, mime, payload)
    }
}
