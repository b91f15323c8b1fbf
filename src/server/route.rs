//! Request path → `(template, path)`.
//!
//! ```text
//! /thumb/photos/2024/a.png?v=3
//!  └─┬─┘ └───────┬────────┘
//!  template     path          (query dropped)
//! ```

use std::fmt;

use crate::transform::TemplateRegistry;

/// A parsed request path.
///
/// Both halves are `None` when the path has no `/` after the optional
/// leading one. Empty halves are kept as empty strings; [`Route::is_valid`]
/// treats them as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub template: Option<String>,
    pub path: Option<String>,
}

impl Route {
    /// Parse a raw request path (optionally with query string).
    ///
    /// Both halves are percent-decoded, so `/thumb/my%20photo.png` looks up
    /// `my photo.png`. A file whose name literally contains `%20` must be
    /// requested as `%2520`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.split(['?', '#']).next().unwrap_or_default();
        let raw = raw.strip_prefix('/').unwrap_or(raw);

        match raw.split_once('/') {
            Some((template, path)) => Self {
                template: decode(template),
                path: decode(path),
            },
            None => Self::default(),
        }
    }

    /// Template name, if present and non-empty.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref().filter(|t| !t.is_empty())
    }

    /// Source path, if present and non-empty.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }

    /// Whether the route names a registered template and a non-empty path.
    pub fn is_valid(&self, registry: &TemplateRegistry) -> bool {
        self.resolve(registry).is_some()
    }

    /// The cache key for a valid route.
    pub fn resolve(&self, registry: &TemplateRegistry) -> Option<CacheKey> {
        let template = self.template()?;
        let path = self.path()?;
        registry
            .contains(template)
            .then(|| CacheKey::new(template, path))
    }
}

fn decode(segment: &str) -> Option<String> {
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

/// Key of a derivative in the cache store: `template + "/" + path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    template: String,
    path: String,
    key: String,
}

impl CacheKey {
    pub fn new(template: impl Into<String>, path: impl Into<String>) -> Self {
        let template = template.into();
        let path = path.into();
        let key = format!("{}/{}", template, path);
        Self {
            template,
            path,
            key,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Source store key.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cache store key.
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}
