//! Data model shared by the resolver, the relay and the HTTP layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which family of renditions a caller is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio-only renditions (no video track).
    Audio,
    /// Muxed renditions carrying both audio and video.
    Video,
}

impl MediaKind {
    /// Returns true when `format` belongs to this kind.
    pub fn accepts(self, format: &FormatDescriptor) -> bool {
        match self {
            MediaKind::Video => format.has_video && format.has_audio,
            MediaKind::Audio => format.has_audio && !format.has_video,
        }
    }

    /// Extension used for the attachment handed back to the caller.
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown media type `{0}`")]
pub struct UnknownMediaKind(pub String);

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            _ => Err(UnknownMediaKind(value.to_owned())),
        }
    }
}

/// One rendition of a media source as reported by the provider.
///
/// Only `rendition_id` identifies a rendition. The position of a descriptor
/// inside a [`FormatList`] says nothing about which rendition it is on a later
/// resolution of the same URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub rendition_id: String,
    pub has_video: bool,
    pub has_audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl FormatDescriptor {
    /// Human readable label shown next to the rendition in choice lists.
    pub fn label(&self) -> String {
        self.quality_label
            .clone()
            .or_else(|| self.audio_quality.clone())
            .unwrap_or_else(|| self.rendition_id.clone())
    }
}

/// Renditions of a single source filtered by [`MediaKind`], in provider order.
pub type FormatList = Vec<FormatDescriptor>;

/// Everything the provider knows about a media source.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    pub formats: Vec<FormatDescriptor>,
}

/// How the caller designates the rendition to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Position inside a list resolved at download time.
    Index(i64),
    /// Opaque provider id handed out by an earlier resolution.
    Rendition(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub kind: MediaKind,
    pub selection: Selection,
}
