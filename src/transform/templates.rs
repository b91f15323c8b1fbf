//! Built-in templates.
//!
//! Hosts are free to register their own [`Template`] implementations; these
//! cover the common thumbnail shapes and are what the binary registers.

use image::imageops::FilterType;

use crate::error::TransformError;

use super::handle::ImageHandle;
use super::registry::Template;

/// Scale down to fit inside a `width` x `height` box, keeping aspect ratio.
///
/// Images already inside the box are left at their size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fit {
    pub width: u32,
    pub height: u32,
}

impl Fit {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square bounding box.
    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }
}

impl Template for Fit {
    fn process(&self, image: ImageHandle) -> Result<ImageHandle, TransformError> {
        if self.width == 0 || self.height == 0 {
            return Err(TransformError::template(format!(
                "fit box must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }

        let (width, height) = image.dimensions();
        if width <= self.width && height <= self.height {
            return Ok(image);
        }

        Ok(image.map(|img| img.resize(self.width, self.height, FilterType::Lanczos3)))
    }
}

/// Resize and centre-crop to an exact aspect ratio.
///
/// `aspect` is `(width, height)`; `short_edge` is the length of the shorter
/// output side in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropToAspect {
    pub aspect: (u32, u32),
    pub short_edge: u32,
}

impl CropToAspect {
    pub fn new(aspect: (u32, u32), short_edge: u32) -> Self {
        Self { aspect, short_edge }
    }

    /// Output size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        crop_dimensions(self.aspect, self.short_edge)
    }
}

impl Template for CropToAspect {
    fn process(&self, image: ImageHandle) -> Result<ImageHandle, TransformError> {
        let (aspect_w, aspect_h) = self.aspect;
        if aspect_w == 0 || aspect_h == 0 || self.short_edge == 0 {
            return Err(TransformError::template(format!(
                "invalid crop {}:{} at {}px",
                aspect_w, aspect_h, self.short_edge
            )));
        }

        let (width, height) = self.dimensions();
        Ok(image.map(|img| img.resize_to_fill(width, height, FilterType::Lanczos3)))
    }
}

/// Convert to grayscale, keeping size and output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Grayscale;

impl Template for Grayscale {
    fn process(&self, image: ImageHandle) -> Result<ImageHandle, TransformError> {
        Ok(image.map(|img| img.grayscale()))
    }
}

/// Output size for an aspect ratio given as `(width, height)` and the length
/// of the shorter side.
///
/// ```
/// # use image_rack::transform::crop_dimensions;
/// assert_eq!(crop_dimensions((4, 5), 400), (400, 500));
/// assert_eq!(crop_dimensions((16, 9), 180), (320, 180));
/// ```
pub fn crop_dimensions(aspect: (u32, u32), short_edge: u32) -> (u32, u32) {
    let (aspect_w, aspect_h) = aspect;

    if aspect_w <= aspect_h {
        let h = (short_edge as f64 * aspect_h as f64 / aspect_w as f64).round() as u32;
        (short_edge, h)
    } else {
        let w = (short_edge as f64 * aspect_w as f64 / aspect_h as f64).round() as u32;
        (w, short_edge)
    }
}
