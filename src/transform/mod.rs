//! Image transforms: named templates and the decode/encode pipeline.
//!
//! A [`Template`] receives a decoded [`ImageHandle`] and returns it modified.
//! The [`TemplateRegistry`] maps the first URL path segment to a factory that
//! builds a fresh template per request, and the [`TransformPipeline`] runs one
//! template over one source image.

mod handle;
mod pipeline;
mod registry;
mod templates;

pub use handle::{EncodedImage, ImageHandle, DEFAULT_JPEG_QUALITY, FALLBACK_FORMAT};
pub use pipeline::TransformPipeline;
pub(crate) use pipeline::panic_message;
pub use registry::{is_valid_name, Template, TemplateFactory, TemplateRegistry};
pub use templates::{crop_dimensions, CropToAspect, Fit, Grayscale};
