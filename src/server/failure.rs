//! Not-found and error responses.
//!
//! Each has a fixed default. A host may install a hook that receives the
//! default response (and, for errors, the cause) and returns the response to
//! send instead.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use super::response::ImageResponse;
use crate::error::ServeError;

pub const NOT_FOUND_BODY: &str = "File not found";
pub const ERROR_BODY: &str = "There has been a problem serving this request.";

/// Hook called with the default not-found response.
pub type NotFoundHook = Arc<dyn Fn(ImageResponse) -> ImageResponse + Send + Sync>;

/// Hook called with the default error response and its cause.
pub type ErrorHook = Arc<dyn Fn(ImageResponse, &ServeError) -> ImageResponse + Send + Sync>;

#[derive(Clone, Default)]
pub struct FailureRouter {
    not_found: Option<NotFoundHook>,
    error: Option<ErrorHook>,
}

impl FailureRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_not_found<F>(&mut self, hook: F)
    where
        F: Fn(ImageResponse) -> ImageResponse + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(hook));
    }

    pub fn set_error<F>(&mut self, hook: F)
    where
        F: Fn(ImageResponse, &ServeError) -> ImageResponse + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(hook));
    }

    /// 404 response, passed through the not-found hook if one is set.
    pub fn not_found(&self) -> ImageResponse {
        let response = default_not_found();
        match &self.not_found {
            Some(hook) => hook(response),
            None => response,
        }
    }

    /// 500 response for `err`, passed through the error hook if one is set.
    pub fn error(&self, err: &ServeError) -> ImageResponse {
        let response = default_error();
        match &self.error {
            Some(hook) => hook(response, err),
            None => response,
        }
    }
}

impl fmt::Debug for FailureRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureRouter")
            .field("not_found_hook", &self.not_found.is_some())
            .field("error_hook", &self.error.is_some())
            .finish()
    }
}

pub fn default_not_found() -> ImageResponse {
    ImageResponse::html(StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

pub fn default_error() -> ImageResponse {
    ImageResponse::html(StatusCode::INTERNAL_SERVER_ERROR, ERROR_BODY)
}
