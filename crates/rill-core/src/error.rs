//! Error types for the streaming engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("No playable representation in adaptation")]
    NoPlayableRepresentation,

    // Segment errors
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Network error fetching {url}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse segment payload: {0}")]
    SegmentParse(String),

    // Media element errors
    #[error("Source buffer rejected data: {0}")]
    SourceBuffer(String),

    #[error("Media decode failure: {0}")]
    MediaDecode(String),

    // DRM errors
    #[error("Key system not supported: {system}")]
    KeySystemUnsupported { system: String },

    #[error("Key error: {reason}")]
    Key { reason: String, recoverable: bool },

    // Playback errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Player has been disposed")]
    Disposed,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true if the segment pipeline may retry after this error.
    ///
    /// Timeouts, connection-level failures, 5xx and 429 responses are
    /// transient. Parse failures get a single cache-bypassing refetch,
    /// enforced by the pipeline on top of this classification.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Network { .. } => true,
            Error::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            Error::SegmentParse(_) => true,
            Error::Key { recoverable, .. } => *recoverable,
            _ => false,
        }
    }

    /// Returns true if this error ends the current content.
    ///
    /// A non-retryable HTTP failure is fatal for the segment but the
    /// player may still recover by switching representation.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::ManifestFetch(_)
            | Error::ManifestParse(_)
            | Error::InvalidManifest(_)
            | Error::NoPlayableRepresentation
            | Error::SourceBuffer(_)
            | Error::MediaDecode(_)
            | Error::KeySystemUnsupported { .. }
            | Error::Disposed => true,
            Error::Key { recoverable, .. } => !recoverable,
            _ => false,
        }
    }

    /// Stable code for events and diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidManifest(_) => "INVALID_MANIFEST",
            Error::NoPlayableRepresentation => "NO_REPRESENTATION",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Network { .. } => "NETWORK",
            Error::HttpStatus { .. } => "HTTP_STATUS",
            Error::SegmentParse(_) => "SEGMENT_PARSE",
            Error::SourceBuffer(_) => "SOURCE_BUFFER",
            Error::MediaDecode(_) => "MEDIA_DECODE",
            Error::KeySystemUnsupported { .. } => "KEY_SYSTEM_UNSUPPORTED",
            Error::Key { .. } => "KEY",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::Disposed => "DISPOSED",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

/// Cloneable snapshot of a fatal error, kept until the next load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for StoredError {
    fn from(error: &Error) -> Self {
        Self { code: error.error_code().to_string(), message: error.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout { url: "u".into() }.is_retryable());
        assert!(Error::HttpStatus { url: "u".into(), status: 503 }.is_retryable());
        assert!(Error::HttpStatus { url: "u".into(), status: 429 }.is_retryable());
        assert!(!Error::HttpStatus { url: "u".into(), status: 404 }.is_retryable());
        assert!(!Error::MediaDecode("bad".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::ManifestParse("oops".into()).is_fatal());
        assert!(Error::Key { reason: "revoked".into(), recoverable: false }.is_fatal());
        assert!(!Error::Key { reason: "pending".into(), recoverable: true }.is_fatal());
        assert!(!Error::HttpStatus { url: "u".into(), status: 404 }.is_fatal());
    }
}
