//! Error types for the tessera crate.

use std::fmt;

use tessera_decode::{DecodeError, TileKey};

/// Result type for tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How a failure is handled by the fetch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport error, timeout or unexpected status. Retried up to the limit.
    NetworkFailure,
    /// The source does not have the tile. Never retried.
    NotFound,
    /// The payload could not be decoded. Retried like a network failure.
    DecodeFailure,
    /// Retries are exhausted, or the tile was never available.
    PermanentUnavailable,
    /// The load was superseded. Not an error; discarded silently.
    Cancellation,
}

/// Errors that can occur in tessera operations.
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// The request did not complete within the source's timeout.
    Timeout {
        /// The URL that timed out.
        url: String,
    },
    /// The source has no tile at this key.
    NotFound { key: TileKey },
    /// Tile decoding failed.
    Decode(DecodeError),
    /// The tile is permanently unavailable for this store.
    Unavailable { key: TileKey },
    /// The operation was cancelled.
    Cancelled,
    /// A tile source or renderer configuration was rejected.
    InvalidConfig {
        /// Which configuration was invalid.
        context: &'static str,
        /// Description of what was invalid.
        detail: String,
    },
}

impl Error {
    /// Classify this error for retry bookkeeping.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Http { .. } | Error::HttpStatus { .. } | Error::Timeout { .. } => {
                FailureKind::NetworkFailure
            }
            Error::NotFound { .. } => FailureKind::NotFound,
            Error::Decode(_) => FailureKind::DecodeFailure,
            Error::Unavailable { .. } | Error::InvalidConfig { .. } => {
                FailureKind::PermanentUnavailable
            }
            Error::Cancelled => FailureKind::Cancellation,
        }
    }

    /// Whether a later attempt at the same tile might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::NetworkFailure | FailureKind::DecodeFailure
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            Error::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            Error::Timeout { url } => write!(f, "http request to {url} timed out"),
            Error::NotFound { key } => write!(f, "tile {key} not found"),
            Error::Decode(e) => write!(f, "decode error: {e}"),
            Error::Unavailable { key } => write!(f, "tile {key} is unavailable"),
            Error::Cancelled => f.write_str("operation cancelled"),
            Error::InvalidConfig { context, detail } => {
                write!(f, "invalid {context}: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Decode(e.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidConfig {
            context: "tilejson",
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let key = TileKey::new(1, 0, 1).unwrap();
        let timeout = Error::Timeout {
            url: "https://tiles.example/1/0/1.pbf".to_string(),
        };
        assert_eq!(timeout.kind(), FailureKind::NetworkFailure);
        assert!(timeout.is_retryable());

        let missing = Error::NotFound { key };
        assert_eq!(missing.kind(), FailureKind::NotFound);
        assert!(!missing.is_retryable());

        let decode = Error::from(DecodeError::UnexpectedEof {
            context: "geometry",
        });
        assert_eq!(decode.kind(), FailureKind::DecodeFailure);
        assert!(decode.is_retryable());
        assert!(std::error::Error::source(&decode).is_some());

        assert_eq!(Error::Cancelled.kind(), FailureKind::Cancellation);
        assert_eq!(missing.to_string(), "tile 1/0/1 not found");
    }
}
