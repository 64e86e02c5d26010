use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{MediaProvider, RemoteStream};
use crate::error::ProviderError;
use crate::media::{FormatDescriptor, MediaInfo};

pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 120;
const CHUNK_SIZE: usize = 64 * 1024;

/// Minimal view of `yt-dlp -J`. Everything is optional because extractors
/// omit fields freely.
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    fulltitle: Option<String>,
    formats: Option<Vec<FormatInfo>>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    format_id: Option<String>,
    format_note: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<i64>,
    fps: Option<f64>,
    abr: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

/// [`MediaProvider`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    cookies: Option<PathBuf>,
    metadata_timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies: None,
            metadata_timeout: Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS),
        }
    }

    /// Passes `--cookies <path>` on every invocation, as long as the file
    /// exists when the command is built.
    pub fn with_cookies(mut self, path: Option<PathBuf>) -> Self {
        self.cookies = path;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Runs `yt-dlp --version` so a missing executable is reported at startup
    /// instead of on the first request.
    pub async fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => bail!(
                "{} is installed but returned {}",
                self.program.display(),
                status
            ),
            Err(err) => bail!(
                "{} is not installed or not in PATH: {}",
                self.program.display(),
                err
            ),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--no-progress")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(cookies) = self.cookies.as_deref().filter(|path| path.exists()) {
            command.arg("--cookies").arg(cookies);
        }
        command
    }
}

#[async_trait]
impl MediaProvider for YtDlp {
    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, ProviderError> {
        let mut command = self.command();
        command.arg("--dump-single-json").arg("--").arg(url);

        debug!(url, "fetching rendition metadata");
        let output = timeout(self.metadata_timeout, command.output())
            .await
            .map_err(|_| ProviderError::Timeout(self.metadata_timeout.as_secs()))?
            .map_err(ProviderError::Spawn)?;

        if !output.status.success() {
            return Err(ProviderError::Failed {
                status: output.status.to_string(),
                message: last_line(&output.stderr),
            });
        }

        parse_info(&output.stdout)
    }

    async fn open_stream(
        &self,
        url: &str,
        rendition_id: &str,
    ) -> Result<Box<dyn RemoteStream>, ProviderError> {
        let mut command = self.command();
        command
            .arg("--format")
            .arg(rendition_id)
            .arg("--output")
            .arg("-")
            .arg("--")
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(url, rendition_id, "opening remote stream");
        let mut child = command.spawn().map_err(ProviderError::Spawn)?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ProviderError::Io(std::io::Error::other("yt-dlp stdout was not captured"))
        })?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Box::new(YtDlpStream {
            child,
            stdout,
            stderr,
            finished: false,
        }))
    }
}

/// Bytes written by `yt-dlp --output -`. The child is killed when the stream
/// is dropped before completion.
struct YtDlpStream {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

#[async_trait]
impl RemoteStream for YtDlpStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProviderError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        let read = self.stdout.read_buf(&mut buf).await?;
        if read > 0 {
            return Ok(Some(buf.freeze()));
        }

        // EOF on stdout only means the transfer is over; the exit status says
        // whether it completed.
        self.finished = true;
        let status = self.child.wait().await?;
        if status.success() {
            return Ok(None);
        }

        let message = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        Err(ProviderError::Failed {
            status: status.to_string(),
            message,
        })
    }
}

/// Keeps the stderr pipe from filling up while the transfer runs and returns
/// the last non-empty line for diagnostics.
fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut last = String::new();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if !line.trim().is_empty() => last = line.trim().to_owned(),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(err) => {
                    warn!("could not read yt-dlp stderr: {}", err);
                    break;
                }
            }
        }
        last
    })
}

fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("yt-dlp did not report an error")
        .to_owned()
}

fn parse_info(raw: &[u8]) -> Result<MediaInfo, ProviderError> {
    let info: InfoJson = serde_json::from_slice(raw)
        .map_err(|err| ProviderError::InvalidMetadata(format!("decoding JSON: {err}")))?;

    let formats: Vec<FormatDescriptor> = info
        .formats
        .unwrap_or_default()
        .into_iter()
        .filter_map(to_descriptor)
        .collect();

    if formats.is_empty() {
        return Err(ProviderError::InvalidMetadata(
            "no renditions were listed".to_owned(),
        ));
    }

    let title = info
        .title
        .or(info.fulltitle)
        .map(|value| value.trim().to_owned())
        .unwrap_or_default();

    Ok(MediaInfo { title, formats })
}

fn to_descriptor(format: FormatInfo) -> Option<FormatDescriptor> {
    let rendition_id = format
        .format_id
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty())?;

    let has_video = has_codec(format.vcodec.as_deref());
    let has_audio = has_codec(format.acodec.as_deref());
    let note = format
        .format_note
        .map(|note| note.trim().to_owned())
        .filter(|note| !note.is_empty());

    let quality_label = if has_video {
        note.clone()
            .or_else(|| format_quality_label(format.height, format.fps))
    } else {
        None
    };
    let audio_quality = if has_audio && !has_video {
        note.or_else(|| format.abr.map(|abr| format!("{}k", abr.round() as i64)))
    } else if has_audio {
        format.abr.map(|abr| format!("{}k", abr.round() as i64))
    } else {
        None
    };

    let file_size = format
        .filesize
        .or(format.filesize_approx)
        .filter(|size| *size >= 0.0)
        .map(|size| size as u64);

    Some(FormatDescriptor {
        rendition_id,
        has_video,
        has_audio,
        quality_label,
        audio_quality,
        ext: format.ext,
        file_size,
    })
}

/// yt-dlp reports a missing track as `"none"`; an absent field means the
/// extractor did not know, which we treat the same way.
fn has_codec(codec: Option<&str>) -> bool {
    codec.is_some_and(|value| !value.eq_ignore_ascii_case("none"))
}

fn format_quality_label(height: Option<i64>, fps: Option<f64>) -> Option<String> {
    let height = height.filter(|value| *value > 0)?;
    match fps {
        Some(fps) if fps > 30.0 => Some(format!("{height}p{}", fps.round() as i64)),
        _ => Some(format!("{height}p")),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::tempdir;

    fn install_ytdlp_stub(dir: &Path) -> PathBuf {
        let script_path = dir.join("yt-dlp");
        let script = r#"#!/usr/bin/env bash
set -euo pipefail
format=""
prev=""
for arg in "$@"; do
    if [[ "$prev" == "--format" ]]; then
        format="$arg"
    fi
    prev="$arg"
done
if [[ " $* " == *" --version "* ]]; then
    echo "2024.01.01"
    exit 0
fi
if [[ " $* " == *" --dump-single-json "* ]]; then
    if [[ " $* " == *"broken"* ]]; then
        echo "ERROR: [youtube] broken: Video unavailable" >&2
        exit 1
    fi
cat <<'JSON'
{
  "id": "dQw4w9WgXcQ",
  "title": "Never: Gonna Give!",
  "formats": [
    {"format_id": "sb0", "format_note": "storyboard", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
    {"format_id": "140", "format_note": "medium", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 3400000},
    {"format_id": "137", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "height": 1080, "fps": 30},
    {"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 360, "fps": 25, "abr": 96},
    {"format_id": "22", "format_note": "720p", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a"}
  ]
}
JSON
    exit 0
fi
if [[ "$format" == "bad" ]]; then
    printf 'partial'
    echo "ERROR: fragment 3 not found" >&2
    exit 1
fi
printf 'bytes-of-%s' "$format"
"#;
        fs::write(&script_path, script).unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
        script_path
    }

    async fn collect(stream: &mut Box<dyn RemoteStream>) -> Result<Vec<u8>, ProviderError> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn ensure_available_reports_missing_binary() {
        let dir = tempdir().unwrap();
        let missing = YtDlp::new(dir.path().join("does-not-exist"));
        assert!(missing.ensure_available().await.is_err());

        let stub = YtDlp::new(install_ytdlp_stub(dir.path()));
        stub.ensure_available().await.unwrap();
    }

    #[tokio::test]
    async fn fetch_info_maps_formats() {
        let dir = tempdir().unwrap();
        let provider = YtDlp::new(install_ytdlp_stub(dir.path()));

        let info = provider
            .fetch_info("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap();
        assert_eq!(info.title, "Never: Gonna Give!");
        let ids: Vec<_> = info.formats.iter().map(|f| f.rendition_id.as_str()).collect();
        assert_eq!(ids, ["sb0", "140", "137", "18", "22"]);

        let audio = &info.formats[1];
        assert!(audio.has_audio && !audio.has_video);
        assert_eq!(audio.audio_quality.as_deref(), Some("medium"));
        assert_eq!(audio.file_size, Some(3_400_000));

        let muxed = &info.formats[3];
        assert!(muxed.has_audio && muxed.has_video);
        assert_eq!(muxed.quality_label.as_deref(), Some("360p"));
        assert_eq!(muxed.audio_quality.as_deref(), Some("96k"));

        assert_eq!(info.formats[4].quality_label.as_deref(), Some("720p"));
    }

    #[tokio::test]
    async fn fetch_info_surfaces_provider_errors() {
        let dir = tempdir().unwrap();
        let provider = YtDlp::new(install_ytdlp_stub(dir.path()));

        let err = provider
            .fetch_info("https://www.youtube.com/watch?v=broken")
            .await
            .unwrap_err();
        match err {
            ProviderError::Failed { message, .. } => {
                assert!(message.contains("Video unavailable"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_stream_yields_stdout_bytes() {
        let dir = tempdir().unwrap();
        let provider = YtDlp::new(install_ytdlp_stub(dir.path()));

        let mut stream = provider
            .open_stream("https://youtu.be/dQw4w9WgXcQ", "140")
            .await
            .unwrap();
        assert_eq!(collect(&mut stream).await.unwrap(), b"bytes-of-140");
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_zero_exit_turns_into_stream_failure() {
        let dir = tempdir().unwrap();
        let provider = YtDlp::new(install_ytdlp_stub(dir.path()));

        let mut stream = provider
            .open_stream("https://youtu.be/dQw4w9WgXcQ", "bad")
            .await
            .unwrap();
        let err = collect(&mut stream).await.unwrap_err();
        match err {
            ProviderError::Failed { message, .. } => {
                assert!(message.contains("fragment 3"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn quality_label_includes_high_frame_rates() {
        assert_eq!(
            format_quality_label(Some(1080), Some(60.0)).as_deref(),
            Some("1080p60")
        );
        assert_eq!(format_quality_label(Some(720), Some(30.0)).as_deref(), Some("720p"));
        assert_eq!(format_quality_label(None, Some(60.0)), None);
    }

    #[test]
    fn empty_format_list_is_unusable() {
        let err = parse_info(br#"{"title": "x", "formats": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidMetadata(_)));
        let err = parse_info(b"not json").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidMetadata(_)));
    }
}
