//! Error types for decoding operations.

use std::fmt;

/// Errors that can occur while decoding a vector tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Invalid data format or structure.
    InvalidFormat {
        context: &'static str,
        detail: String,
    },
    /// A command stream ended in the middle of a command.
    UnexpectedEof { context: &'static str },
    /// Index out of bounds.
    IndexOutOfBounds { index: usize, len: usize },
    /// Tile coordinates outside the `0 <= x, y < 2^z` range.
    InvalidTileKey { z: u8, x: u32, y: u32 },
    /// The payload is not a valid protobuf message.
    Protobuf { message: String },
    /// Gzip inflation failed.
    Decompress { message: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat { context, detail } => {
                write!(f, "invalid format in {context}: {detail}")
            }
            Self::UnexpectedEof { context } => {
                write!(f, "unexpected end of buffer in {context}")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::InvalidTileKey { z, x, y } => {
                write!(f, "tile {z}/{x}/{y} is outside the tile grid")
            }
            Self::Protobuf { message } => write!(f, "failed to decode tile: {message}"),
            Self::Decompress { message } => write!(f, "failed to inflate tile: {message}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<prost::DecodeError> for DecodeError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Protobuf {
            message: e.to_string(),
        }
    }
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
