use std::io;

use thiserror::Error;

/// Failures reported by a [`crate::provider::MediaProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to launch provider: {0}")]
    Spawn(#[source] io::Error),

    #[error("provider timed out after {0} seconds")]
    Timeout(u64),

    #[error("provider exited with {status}: {message}")]
    Failed { status: String, message: String },

    #[error("provider returned unusable metadata: {0}")]
    InvalidMetadata(String),

    #[error("reading from provider failed: {0}")]
    Io(#[from] io::Error),
}

/// Every way the format negotiation and relay pipeline can fail.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid media URL: {0}")]
    InvalidUrl(String),

    #[error("fetching metadata failed: {0}")]
    MetadataFetch(#[source] ProviderError),

    #[error("format index {index} is outside the {len} available renditions")]
    FormatIndexOutOfRange { index: i64, len: usize },

    #[error("rendition {0} is no longer offered by the provider")]
    UnknownRendition(String),

    #[error("remote stream failed: {0}")]
    Stream(#[source] ProviderError),

    #[error("staging file operation failed: {0}")]
    FileSystem(#[from] io::Error),
}
