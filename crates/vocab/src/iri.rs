//! Internationalized resource identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Why an [`Iri`] cannot be used as a request target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IriError {
    #[error("empty IRI")]
    Empty,
    #[error("{0}")]
    Parse(#[from] url::ParseError),
    #[error("IRI has no host")]
    MissingHost,
}

/// Identifier of a document, as found in `id` and reference properties.
///
/// An `Iri` is an opaque string until it is used as a request target, at
/// which point [`Iri::url`] validates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse as an absolute URL.
    pub fn url(&self) -> Result<Url, IriError> {
        if self.0.is_empty() {
            return Err(IriError::Empty);
        }
        Ok(Url::parse(&self.0)?)
    }

    /// Parse as an absolute URL that names a host.
    pub fn request_url(&self) -> Result<Url, IriError> {
        let url = self.url()?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(IriError::MissingHost);
        }
        Ok(url)
    }

    /// Host (and explicit port) of the IRI, if it parses.
    #[must_use]
    pub fn authority(&self) -> Option<String> {
        let url = self.url().ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Append a path segment, keeping a single `/` between the parts.
    #[must_use]
    pub fn join_path(&self, segment: &str) -> Self {
        Self(format!(
            "{}/{}",
            self.0.trim_end_matches('/'),
            segment.trim_start_matches('/')
        ))
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Url> for Iri {
    fn from(value: Url) -> Self {
        Self(value.into())
    }
}

impl From<&Url> for Iri {
    fn from(value: &Url) -> Self {
        Self(value.as_str().to_string())
    }
}

impl AsRef<str> for Iri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
