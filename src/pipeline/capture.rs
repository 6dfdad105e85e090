//! Image capture: painted surface → base64 PNG data URI.
//!
//! A [`RasterSnapshot`] is the portable form of a code: one self-describing
//! string (`data:image/png;base64,…`) that can be embedded in a document,
//! logged, or shipped across a channel without the surface it came from.
//! PNG is lossless, so module edges stay sharp when the label is printed.

use crate::error::LabelError;
use crate::identifier::Identifier;
use crate::pipeline::render::RenderedCode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Self-describing encoded image: `data:<mime>;base64,<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap already-encoded bytes of the given MIME type.
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self(format!("data:{mime_type};base64,{}", STANDARD.encode(bytes)))
    }

    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes, "image/png")
    }

    /// Parse an existing data URI, checking its shape.
    pub fn from_data_uri(uri: impl Into<String>) -> Result<Self, LabelError> {
        let uri = uri.into();
        let image = Self(uri);
        image.split()?;
        Ok(image)
    }

    /// Load a PNG or JPEG file, keeping its original encoding.
    pub fn from_file(path: &Path) -> Result<Self, LabelError> {
        let bytes = std::fs::read(path).map_err(|e| LabelError::LogoLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let format = image::guess_format(&bytes).map_err(|e| LabelError::LogoLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let image = Self::from_bytes(&bytes, format.to_mime_type());
        // Fail at load time rather than on the first print.
        image.decode().map_err(|e| LabelError::LogoLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(image)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The MIME type named in the URI header.
    pub fn mime_type(&self) -> &str {
        self.split().map(|(mime, _)| mime).unwrap_or("")
    }

    /// The raw encoded bytes (PNG, JPEG, …).
    pub fn to_bytes(&self) -> Result<Vec<u8>, LabelError> {
        let (_, payload) = self.split()?;
        STANDARD
            .decode(payload)
            .map_err(|e| LabelError::AssemblyFailed(format!("invalid base64 image: {e}")))
    }

    /// Decode into pixels.
    pub fn decode(&self) -> Result<DynamicImage, LabelError> {
        let bytes = self.to_bytes()?;
        image::load_from_memory(&bytes)
            .map_err(|e| LabelError::AssemblyFailed(format!("undecodable image: {e}")))
    }

    fn split(&self) -> Result<(&str, &str), LabelError> {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .ok_or_else(|| LabelError::AssemblyFailed("image is not a base64 data URI".into()))
    }
}

/// Portable capture of one rendered code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSnapshot {
    /// 0-based position of the source identifier in the batch.
    pub index: usize,
    pub identifier: Identifier,
    pub image: EncodedImage,
}

/// Turns a painted surface into a snapshot.
///
/// Inject a custom implementation via
/// [`crate::config::LabelConfigBuilder::rasterizer`] (e.g. to change the
/// encoding or to simulate failures in tests).
pub trait Rasterizer: Send + Sync {
    fn capture(&self, code: &RenderedCode) -> Result<RasterSnapshot, LabelError>;
}

/// Default rasterizer: lossless PNG in a base64 data URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngRasterizer;

impl Rasterizer for PngRasterizer {
    fn capture(&self, code: &RenderedCode) -> Result<RasterSnapshot, LabelError> {
        let surface = match code.surface() {
            Some(s) if code.is_painted() => s,
            _ => {
                return Err(LabelError::CaptureFailed {
                    index: code.index,
                    identifier: code.identifier.to_string(),
                    detail: "surface has not been painted".into(),
                })
            }
        };

        let mut buf = Vec::new();
        surface
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| LabelError::CaptureFailed {
                index: code.index,
                identifier: code.identifier.to_string(),
                detail: e.to_string(),
            })?;

        let image = EncodedImage::from_png_bytes(&buf);
        debug!(
            "Captured code #{} → {} bytes data URI",
            code.index,
            image.as_str().len()
        );

        Ok(RasterSnapshot {
            index: code.index,
            identifier: code.identifier.clone(),
            image,
        })
    }
}

/// Capture every code in surface order.
///
/// Stops at the first failure: a batch with a missing label is never
/// handed to assembly.
pub fn capture_all(
    rasterizer: &dyn Rasterizer,
    codes: &[RenderedCode],
) -> Result<Vec<RasterSnapshot>, LabelError> {
    codes.iter().map(|code| rasterizer.capture(code)).collect()
}
