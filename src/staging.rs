//! Staging files that buffer a transfer between the remote source and the
//! caller.
//!
//! Every staging file lives behind a [`StagingFile`] (and later a
//! [`StagedFile`]) handle that owns a [`TempPath`]: when the handle goes out
//! of scope the file is unlinked, whatever the reason the scope ended. On-disk
//! names are random so concurrent requests never share a path; the
//! human-readable name only ends up in the `Content-Disposition` header.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::media::MediaKind;

/// Prefix shared by every staging file, used to recognise leftovers.
pub const STAGING_PREFIX: &str = ".newtube-relay-";
const FALLBACK_TITLE: &str = "download";

/// Builds the attachment name handed to the caller.
///
/// Only ASCII letters, ASCII digits and whitespace survive from `title`.
/// Video files carry the quality label in parentheses.
pub fn derive_file_name(title: &str, kind: MediaKind, quality_label: Option<&str>) -> String {
    let sanitized: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let base = if sanitized.trim().is_empty() {
        FALLBACK_TITLE
    } else {
        sanitized.as_str()
    };

    match (kind, quality_label) {
        (MediaKind::Video, Some(label)) => format!("{base}({label}).{}", kind.extension()),
        _ => format!("{base}.{}", kind.extension()),
    }
}

/// Directory that holds the staging files of in-flight transfers.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory and removes staging files left behind by a
    /// previous process. Returns how many leftovers were deleted.
    pub fn prepare(&self) -> io::Result<usize> {
        fs::create_dir_all(&self.dir)?;

        let mut removed = 0;
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("could not inspect staging entry: {}", err);
                    continue;
                }
            };
            let is_leftover = entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(STAGING_PREFIX));
            if !is_leftover {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => warn!(
                    "could not remove stale staging file {}: {}",
                    entry.path().display(),
                    err
                ),
            }
        }
        Ok(removed)
    }

    /// Opens a fresh, uniquely named staging file for writing.
    pub fn create(&self, kind: MediaKind) -> io::Result<StagingFile> {
        let suffix = format!(".{}", kind.extension());
        let (file, path) = Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.dir)?
            .into_parts();
        debug!(path = %path.display(), "staging file created");
        Ok(StagingFile {
            file: File::from_std(file),
            path,
            written: 0,
        })
    }
}

/// Staging file being written. Dropping it deletes the file.
#[derive(Debug)]
pub struct StagingFile {
    file: File,
    path: TempPath,
    written: u64,
}

impl StagingFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes and closes the writer, then reopens the file for reading. The
    /// returned handle keeps owning the path.
    pub async fn finish(self) -> io::Result<StagedFile> {
        let Self {
            mut file,
            path,
            written,
        } = self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let reader = File::open(&path).await?;
        Ok(StagedFile {
            reader,
            path,
            len: written,
        })
    }

    /// Deletes the file now and reports whether that worked. Dropping the
    /// handle does the same but can only log.
    pub fn release(self) -> io::Result<()> {
        let Self { file, path, .. } = self;
        drop(file);
        path.close()
    }
}

/// Completed staging file, open for reading.
#[derive(Debug)]
pub struct StagedFile {
    reader: File,
    path: TempPath,
    len: u64,
}

impl StagedFile {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_parts(self) -> (File, TempPath) {
        (self.reader, self.path)
    }
}
