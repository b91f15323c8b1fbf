//! Template registry.
//!
//! Maps template names (the first URL path segment) to factories that build
//! a fresh [`Template`] for each request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, TransformError};

use super::handle::ImageHandle;

/// A named image transform.
///
/// Implementations take a decoded image, apply any number of pixel
/// operations (resize, crop, colour changes) and return the result. They may
/// encode the handle themselves; otherwise the pipeline encodes it with the
/// default encoder.
pub trait Template: Send {
    fn process(&self, image: ImageHandle) -> Result<ImageHandle, TransformError>;
}

impl<F> Template for F
where
    F: Fn(ImageHandle) -> Result<ImageHandle, TransformError> + Send,
{
    fn process(&self, image: ImageHandle) -> Result<ImageHandle, TransformError> {
        self(image)
    }
}

/// Builds a template instance for one request.
pub type TemplateFactory = Arc<dyn Fn() -> Box<dyn Template> + Send + Sync>;

/// Mapping from template name to factory.
///
/// Last registration for a name wins. The registry is read-only once the
/// server starts handling requests.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, TemplateFactory>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one.
    ///
    /// Names must be non-empty and must not contain `/`, so that
    /// `name + "/" + path` always splits back into the same pair.
    pub fn register<F, T>(&mut self, name: impl Into<String>, factory: F) -> Result<(), ConfigError>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Template + 'static,
    {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(ConfigError::InvalidTemplateName(name));
        }

        let factory: TemplateFactory = Arc::new(move || Box::new(factory()) as Box<dyn Template>);
        self.templates.insert(name, factory);
        Ok(())
    }

    /// Get the factory for `name`.
    pub fn get(&self, name: &str) -> Option<&TemplateFactory> {
        self.templates.get(name)
    }

    /// Case-sensitive exact membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// All registrations.
    pub fn list(&self) -> &HashMap<String, TemplateFactory> {
        &self.templates
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("templates", &self.names())
            .finish()
    }
}

/// Whether `name` can be used as a template name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}
