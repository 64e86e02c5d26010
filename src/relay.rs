//! The download pipeline: validate, resolve, select, pull the remote stream
//! into a staging file, then hand the staged bytes to the caller.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use mime_guess::MimeGuess;
use tempfile::TempPath;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::formats::{resolve_formats, select};
use crate::media::{DownloadRequest, FormatDescriptor};
use crate::provider::{MediaProvider, RemoteStream};
use crate::staging::{StagingArea, StagingFile, derive_file_name};
use crate::validate::is_valid_media_url;

/// A finished transfer, ready to be sent to the caller.
#[derive(Debug)]
pub struct RelayOutcome {
    /// Attachment name derived from the title and rendition.
    pub file_name: String,
    pub content_type: String,
    pub content_length: u64,
    pub rendition: FormatDescriptor,
    pub body: RelayBody,
}

/// Response body reading the staged file. It owns the staging path, so the
/// file disappears as soon as the body is fully sent or abandoned.
#[derive(Debug)]
pub struct RelayBody {
    inner: ReaderStream<File>,
    _staging: TempPath,
}

impl RelayBody {
    fn new(reader: File, staging: TempPath) -> Self {
        Self {
            inner: ReaderStream::new(reader),
            _staging: staging,
        }
    }
}

impl Stream for RelayBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Runs the whole pipeline for one download request.
///
/// No staging file exists before a rendition has been selected and the remote
/// stream opened. From then on the staging file is owned by a guard, so every
/// error return below deletes it.
pub async fn perform_download(
    provider: &dyn MediaProvider,
    staging: &StagingArea,
    request: &DownloadRequest,
) -> Result<RelayOutcome, RelayError> {
    if !is_valid_media_url(&request.url) {
        return Err(RelayError::InvalidUrl(request.url.clone()));
    }

    let resolved = resolve_formats(provider, &request.url, request.kind).await?;
    let rendition = select(&resolved.formats, &request.selection)?.clone();
    debug!(
        url = %request.url,
        kind = %request.kind,
        rendition = %rendition.rendition_id,
        "rendition selected"
    );

    let mut remote = provider
        .open_stream(&request.url, &rendition.rendition_id)
        .await
        .map_err(RelayError::Stream)?;

    let file_name = derive_file_name(
        &resolved.title,
        request.kind,
        rendition.quality_label.as_deref(),
    );
    let mut staging_file = staging.create(request.kind)?;

    if let Err(err) = pipe(remote.as_mut(), &mut staging_file).await {
        drop(remote);
        if let Err(cleanup) = staging_file.release() {
            warn!("could not delete partial staging file: {}", cleanup);
        }
        return Err(err);
    }
    drop(remote);

    let staged = staging_file.finish().await?;
    let content_length = staged.len();
    info!(
        url = %request.url,
        file_name = %file_name,
        bytes = content_length,
        "transfer staged"
    );

    let content_type = MimeGuess::from_path(&file_name)
        .first_or_octet_stream()
        .to_string();
    let (reader, path) = staged.into_parts();

    Ok(RelayOutcome {
        file_name,
        content_type,
        content_length,
        rendition,
        body: RelayBody::new(reader, path),
    })
}

/// Copies the remote stream into the staging file one chunk at a time.
async fn pipe(remote: &mut dyn RemoteStream, staging: &mut StagingFile) -> Result<u64, RelayError> {
    while let Some(chunk) = remote.next_chunk().await.map_err(RelayError::Stream)? {
        staging.write_chunk(&chunk).await?;
    }
    Ok(staging.written())
}
