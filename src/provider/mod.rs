//! Boundary to the remote metadata and byte-stream provider.
//!
//! The relay only ever talks to a [`MediaProvider`]: one call to learn which
//! renditions exist for a URL, one call to open the byte stream of a single
//! rendition. The production implementation shells out to `yt-dlp`.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ProviderError;
use crate::media::MediaInfo;

mod ytdlp;

#[cfg(test)]
pub(crate) mod fake;

pub use ytdlp::{DEFAULT_METADATA_TIMEOUT_SECS, YtDlp};

/// Turns a media URL into rendition metadata and raw byte streams.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Fetches the title and the full, unfiltered rendition set for `url`.
    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, ProviderError>;

    /// Opens the byte stream of the rendition identified by `rendition_id`.
    async fn open_stream(
        &self,
        url: &str,
        rendition_id: &str,
    ) -> Result<Box<dyn RemoteStream>, ProviderError>;
}

/// Pull-based byte stream. Nothing is read from the remote side until the
/// consumer asks for the next chunk, which keeps memory bounded by one chunk.
#[async_trait]
pub trait RemoteStream: Send {
    /// Returns the next chunk, `Ok(None)` once the transfer completed
    /// successfully.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProviderError>;
}
