//! Error types for the render crate.

use std::fmt;

/// Result type for render operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Errors that can occur while managing GPU resources or loading tiles.
#[derive(Debug)]
pub enum RenderError {
    /// The GPU backend refused to create a resource.
    Gpu {
        /// Label of the resource being created.
        label: String,
        /// The error message.
        message: String,
    },
    /// Fetching or configuring the tile source failed.
    Fetch(tessera::Error),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Gpu { label, message } => {
                write!(f, "failed to create gpu resource {label}: {message}")
            }
            RenderError::Fetch(e) => write!(f, "fetch error: {e}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Fetch(e) => Some(e),
            RenderError::Gpu { .. } => None,
        }
    }
}

impl From<tessera::Error> for RenderError {
    fn from(e: tessera::Error) -> Self {
        RenderError::Fetch(e)
    }
}
