//! Error types for geometry construction.

use std::fmt;

/// Errors that can occur while building geometry for a single feature.
///
/// These never escape a tile build: the builder degrades or skips the
/// feature and carries on with its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// Ear clipping rejected the rings.
    Triangulation {
        /// Number of rings handed to the triangulator.
        rings: usize,
        /// The triangulator's message.
        message: String,
    },
    /// The input had too few distinct vertices to produce any triangles.
    Degenerate { context: &'static str },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triangulation { rings, message } => {
                write!(f, "failed to triangulate polygon with {rings} rings: {message}")
            }
            Self::Degenerate { context } => write!(f, "degenerate {context}"),
        }
    }
}

impl std::error::Error for GeometryError {}

/// Result type for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;
