//! Decode → template → encode.
//!
//! ```text
//! source bytes ──► ImageHandle::decode ──► Template::process ──► encode (if needed)
//!                                                                   │
//!                                                                   ▼
//!                                                             EncodedImage
//! ```

use std::any::Any;

use bytes::Bytes;
use tracing::debug;

use crate::error::TransformError;

use super::handle::{EncodedImage, ImageHandle};
use super::registry::Template;

/// Runs one template over one source image.
pub struct TransformPipeline;

impl TransformPipeline {
    /// Decode `source`, apply `template` and return the encoded result.
    ///
    /// Templates that encode the handle themselves are respected; otherwise
    /// the default encoder for the handle's output format is used.
    pub fn run(template: &dyn Template, source: &[u8]) -> Result<EncodedImage, TransformError> {
        let handle = ImageHandle::decode(source)?;
        let (width, height) = handle.dimensions();

        let handle = template.process(handle)?;
        let (out_width, out_height) = handle.dimensions();
        debug!(
            width,
            height,
            out_width,
            out_height,
            pre_encoded = handle.is_encoded(),
            "Applied template"
        );

        handle.into_encoded()
    }

    /// Run the pipeline on the blocking thread pool.
    ///
    /// Pixel work is CPU-bound and must not stall the async workers. A panic
    /// inside the template is returned as [`TransformError::Panicked`].
    pub async fn run_blocking(
        template: Box<dyn Template>,
        source: Bytes,
    ) -> Result<EncodedImage, TransformError> {
        tokio::task::spawn_blocking(move || Self::run(&*template, &source))
            .await
            .map_err(|e| {
                let message = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                TransformError::Panicked { message }
            })?
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
