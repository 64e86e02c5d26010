//! Resolution of a media URL into the renditions of one [`MediaKind`], and
//! selection of a single rendition from such a list.

use tracing::debug;

use crate::error::RelayError;
use crate::media::{FormatDescriptor, FormatList, MediaKind, Selection};
use crate::provider::MediaProvider;

/// Result of one resolution: the source title plus its renditions of the
/// requested kind, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFormats {
    pub title: String,
    pub kind: MediaKind,
    pub formats: FormatList,
}

/// Asks the provider for every rendition of `url` and keeps those of `kind`.
///
/// The URL is expected to be validated already. Two calls for the same URL
/// may disagree on order and content; only `rendition_id` is stable.
pub async fn resolve_formats(
    provider: &dyn MediaProvider,
    url: &str,
    kind: MediaKind,
) -> Result<ResolvedFormats, RelayError> {
    let info = provider
        .fetch_info(url)
        .await
        .map_err(RelayError::MetadataFetch)?;

    let total = info.formats.len();
    let formats = filter_formats(info.formats, kind);
    debug!(url, %kind, total, kept = formats.len(), "resolved renditions");

    Ok(ResolvedFormats {
        title: info.title,
        kind,
        formats,
    })
}

/// Keeps the renditions accepted by `kind`, preserving order.
pub fn filter_formats(all: Vec<FormatDescriptor>, kind: MediaKind) -> FormatList {
    all.into_iter().filter(|format| kind.accepts(format)).collect()
}

/// Picks the rendition designated by `selection`.
pub fn select<'a>(
    formats: &'a [FormatDescriptor],
    selection: &Selection,
) -> Result<&'a FormatDescriptor, RelayError> {
    match selection {
        Selection::Index(index) => usize::try_from(*index)
            .ok()
            .and_then(|position| formats.get(position))
            .ok_or(RelayError::FormatIndexOutOfRange {
                index: *index,
                len: formats.len(),
            }),
        Selection::Rendition(id) => formats
            .iter()
            .find(|format| format.rendition_id == *id)
            .ok_or_else(|| RelayError::UnknownRendition(id.clone())),
    }
}
