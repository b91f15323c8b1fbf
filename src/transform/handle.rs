//! Decoded image handle passed through templates.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::error::TransformError;

/// Default JPEG quality for encoded output (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Output format used when the source format cannot be encoded.
pub const FALLBACK_FORMAT: ImageFormat = ImageFormat::Png;

/// Encoded image bytes and their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A decoded image on its way through a template.
///
/// The handle carries the output format (initially the source format) and,
/// once encoded, the encoded payload. Templates may encode the handle
/// themselves to pick a non-default encoder; the pipeline only encodes
/// handles that are not encoded yet.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    image: DynamicImage,
    format: ImageFormat,
    quality: u8,
    encoded: Option<EncodedImage>,
}

impl ImageHandle {
    /// Wrap a decoded image that should be re-encoded as `format`.
    pub fn new(image: DynamicImage, format: ImageFormat) -> Self {
        Self {
            image,
            format,
            quality: DEFAULT_JPEG_QUALITY,
            encoded: None,
        }
    }

    /// Decode raw bytes, detecting the format from content.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransformError> {
        let format = image::guess_format(bytes).map_err(|e| TransformError::Decode {
            message: e.to_string(),
        })?;
        let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            TransformError::Decode {
                message: e.to_string(),
            }
        })?;
        Ok(Self::new(image, format))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Replace the pixels, e.g. with a resized copy.
    ///
    /// Drops any previous encoding since it no longer matches.
    pub fn set_image(&mut self, image: DynamicImage) {
        self.image = image;
        self.encoded = None;
    }

    /// Apply a pixel operation and return the updated handle.
    pub fn map(mut self, f: impl FnOnce(DynamicImage) -> DynamicImage) -> Self {
        let image = std::mem::replace(&mut self.image, DynamicImage::new_rgb8(0, 0));
        self.set_image(f(image));
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Choose the output format for the default encoder.
    pub fn set_format(&mut self, format: ImageFormat) {
        self.format = format;
        self.encoded = None;
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// JPEG quality for the default encoder, clamped to 1-100.
    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality.clamp(1, 100);
        self.encoded = None;
    }

    pub fn is_encoded(&self) -> bool {
        self.encoded.is_some()
    }

    pub fn encoded(&self) -> Option<&EncodedImage> {
        self.encoded.as_ref()
    }

    /// Encode with the default encoder for the current output format.
    pub fn encode(&mut self) -> Result<&EncodedImage, TransformError> {
        let format = if self.format.writing_enabled() {
            self.format
        } else {
            FALLBACK_FORMAT
        };
        self.encode_as(format)
    }

    /// Encode to a specific format.
    pub fn encode_as(&mut self, format: ImageFormat) -> Result<&EncodedImage, TransformError> {
        let bytes = encode_image(&self.image, format, self.quality)?;
        self.format = format;
        Ok(&*self.encoded.insert(EncodedImage {
            bytes,
            mime_type: format.to_mime_type().to_string(),
        }))
    }

    /// Attach bytes produced by a custom encoder.
    pub fn set_encoded(&mut self, bytes: impl Into<Bytes>, mime_type: impl Into<String>) {
        self.encoded = Some(EncodedImage {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        });
    }

    /// Take the encoded payload, encoding first if needed.
    pub fn into_encoded(mut self) -> Result<EncodedImage, TransformError> {
        if !self.is_encoded() {
            self.encode()?;
        }
        self.encoded.ok_or_else(|| TransformError::Encode {
            message: "image was not encoded".to_string(),
        })
    }
}

fn encode_image(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Bytes, TransformError> {
    let encode_err = |e: image::ImageError| TransformError::Encode {
        message: e.to_string(),
    };

    let mut output = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel and no 16-bit support
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
            if image.color().has_color() {
                encoder.encode_image(&image.to_rgb8()).map_err(encode_err)?
            } else {
                encoder.encode_image(&image.to_luma8()).map_err(encode_err)?
            }
        }
        ImageFormat::WebP => {
            // The built-in WebP encoder only takes 8-bit RGB(A)
            let image = if image.color().has_alpha() {
                DynamicImage::ImageRgba8(image.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            };
            image
                .write_to(&mut Cursor::new(&mut output), format)
                .map_err(encode_err)?
        }
        ImageFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut Cursor::new(&mut output), format)
            .map_err(encode_err)?,
        _ => image
            .write_to(&mut Cursor::new(&mut output), format)
            .map_err(encode_err)?,
    }

    Ok(Bytes::from(output))
}
