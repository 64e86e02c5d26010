//! In-memory provider used by the pipeline and router tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use super::{MediaProvider, RemoteStream};
use crate::error::ProviderError;
use crate::media::{FormatDescriptor, MediaInfo};

pub(crate) fn rendition(id: &str, has_video: bool, has_audio: bool) -> FormatDescriptor {
    FormatDescriptor {
        rendition_id: id.to_owned(),
        has_video,
        has_audio,
        quality_label: has_video.then(|| format!("{id}p")),
        audio_quality: (has_audio && !has_video).then(|| "medium".to_owned()),
        ext: None,
        file_size: None,
    }
}

/// A typical mix: two muxed, two audio-only, one video-only and one
/// storyboard rendition.
pub(crate) fn sample_info() -> MediaInfo {
    MediaInfo {
        title: "Sample: Clip #1!".to_owned(),
        formats: vec![
            rendition("360", true, true),
            rendition("140", false, true),
            rendition("1080", true, false),
            rendition("720", true, true),
            rendition("251", false, true),
            rendition("sb0", false, false),
        ],
    }
}

pub(crate) struct FakeProvider {
    /// Answers for successive `fetch_info` calls; the last one repeats.
    infos: Mutex<VecDeque<MediaInfo>>,
    fail_metadata: bool,
    chunks: Vec<Bytes>,
    /// Fails the transfer after this many chunks were handed out.
    fail_after: Option<usize>,
    /// Never yields another chunk after this many were handed out.
    stall_after: Option<usize>,
    stalled: Arc<AtomicBool>,
    fetches: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub(crate) fn new(info: MediaInfo) -> Self {
        Self {
            infos: Mutex::new(VecDeque::from([info])),
            fail_metadata: false,
            chunks: vec![
                Bytes::from_static(b"first-"),
                Bytes::from_static(b"second-"),
                Bytes::from_static(b"third"),
            ],
            fail_after: None,
            stall_after: None,
            stalled: Arc::new(AtomicBool::new(false)),
            fetches: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Successive resolutions return the given infos in order.
    pub(crate) fn sequence(infos: Vec<MediaInfo>) -> Self {
        let provider = Self::new(sample_info());
        *provider.infos.lock().unwrap() = infos.into();
        provider
    }

    pub(crate) fn failing_metadata() -> Self {
        Self {
            fail_metadata: true,
            ..Self::new(sample_info())
        }
    }

    pub(crate) fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    pub(crate) fn stalling_after(mut self, chunks: usize) -> Self {
        self.stall_after = Some(chunks);
        self
    }

    /// True once a stream reached its stall point.
    pub(crate) fn stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaProvider for FakeProvider {
    async fn fetch_info(&self, _url: &str) -> Result<MediaInfo, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_metadata {
            return Err(ProviderError::Failed {
                status: "exit status: 1".to_owned(),
                message: "ERROR: Video unavailable".to_owned(),
            });
        }
        let mut infos = self.infos.lock().unwrap();
        let info = if infos.len() > 1 {
            infos.pop_front()
        } else {
            infos.front().cloned()
        };
        info.ok_or_else(|| ProviderError::InvalidMetadata("no fixture".to_owned()))
    }

    async fn open_stream(
        &self,
        _url: &str,
        rendition_id: &str,
    ) -> Result<Box<dyn RemoteStream>, ProviderError> {
        self.opened.lock().unwrap().push(rendition_id.to_owned());
        Ok(Box::new(FakeStream {
            chunks: self.chunks.clone().into(),
            remaining_before_failure: self.fail_after,
            remaining_before_stall: self.stall_after,
            stalled: Arc::clone(&self.stalled),
        }))
    }
}

struct FakeStream {
    chunks: VecDeque<Bytes>,
    remaining_before_failure: Option<usize>,
    remaining_before_stall: Option<usize>,
    stalled: Arc<AtomicBool>,
}

#[async_trait]
impl RemoteStream for FakeStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProviderError> {
        if let Some(remaining) = self.remaining_before_stall.as_mut() {
            if *remaining == 0 {
                self.stalled.store(true, Ordering::SeqCst);
                std::future::pending::<()>().await;
            }
            *remaining -= 1;
        }
        if let Some(remaining) = self.remaining_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(ProviderError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            *remaining -= 1;
        }
        Ok(self.chunks.pop_front())
    }
}
