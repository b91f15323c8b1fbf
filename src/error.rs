use thiserror::Error;

/// Errors raised by a blob store (source or cache).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Key does not exist in the store
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Key cannot be mapped onto the store (e.g. escapes the root directory)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Local filesystem failure
    #[error("I/O error on {key}: {message}")]
    Io { key: String, message: String },

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors raised while decoding, transforming or encoding an image.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// Source bytes are not a decodable image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Encoding the processed image failed
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// A template rejected its input
    #[error("Template failed: {message}")]
    Template { message: String },

    /// The transform panicked on the blocking pool
    #[error("Transform panicked: {message}")]
    Panicked { message: String },
}

impl TransformError {
    /// Shorthand for template authors.
    pub fn template(message: impl Into<String>) -> Self {
        TransformError::Template {
            message: message.into(),
        }
    }
}

/// An unexpected fault while serving a request.
///
/// Anything of this type ends in the error hook and a 500-class response.
/// Misses and invalid routes are not errors; they resolve to not-found.
#[derive(Debug, Clone, Error)]
pub enum ServeError {
    /// Source or cache store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Decode/transform/encode failure
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// A validated route named a template that has no factory
    #[error("Template is not registered: {0}")]
    UnknownTemplate(String),

    /// A handler panicked while producing the response
    #[error("Request handler panicked: {message}")]
    Panicked { message: String },
}

/// Configuration rejected at the point it is set, before serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// HTTP cache max-age must be a non-negative integer
    #[error("HTTP cache max-age only accepts non-negative integers. Input was: {0}")]
    InvalidMaxAge(String),

    /// Template names must be non-empty and must not contain '/'
    #[error("Invalid template name {0:?}: must be non-empty and must not contain '/'")]
    InvalidTemplateName(String),

    /// A store location could not be parsed
    #[error("Invalid store location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },
}
