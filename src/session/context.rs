//! Per-transfer state, replaced wholesale when a batch ends.

use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;

use super::state::UploadState;
use crate::collab::FileInfo;
use crate::transfer::file_handle::DownloadHandle;
use crate::transfer::staging::StagingFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    #[default]
    None,
    Upload,
    Download,
}

/// The single file handle a session may hold.
pub enum OpenHandle {
    Upload(StagingFile),
    Download(DownloadHandle),
}

/// Running CRC32 of the current upload.
///
/// Only strictly sequential writes extend it. Any gap, overlap or rewrite marks it
/// stale and the committed file is hashed from disk instead.
pub struct Integrity {
    hasher: crc32fast::Hasher,
    covered: u64,
    in_order: bool,
}

impl Default for Integrity {
    fn default() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
            covered: 0,
            in_order: true,
        }
    }
}

impl Integrity {
    pub fn record(&mut self, offset: u64, data: &[u8]) {
        if !self.in_order {
            return;
        }
        if offset == self.covered {
            self.hasher.update(data);
            self.covered += data.len() as u64;
        } else {
            self.in_order = false;
        }
    }

    /// Checksum if the sequential writes cover exactly `file_len` bytes.
    pub fn finalize(self, file_len: u64) -> Option<u32> {
        (self.in_order && self.covered == file_len).then(|| self.hasher.finalize())
    }
}

/// Everything about the transfer in progress. Identity lives on `Session`.
#[derive(Default)]
pub struct TransferContext {
    pub state: UploadState,
    pub operation: Operation,
    pub handle: Option<OpenHandle>,
    /// Staging files created for this transfer, in creation order.
    pub staging_files: Vec<PathBuf>,
    pub pending_files: VecDeque<String>,
    pub current_file: Option<String>,
    /// Most recent file committed or started, for finish() auditing.
    pub last_file: Option<String>,
    pub recipients: Vec<String>,
    pub comment: String,
    pub integrity: Integrity,
    /// Highest byte offset written for the current file.
    pub bytes_written: u64,
    pub download: Option<FileInfo>,
}

impl TransferContext {
    /// Close the open handle and delete every staging file that was not promoted.
    /// Failures are logged, never returned.
    pub async fn release_resources(&mut self) {
        match self.handle.take() {
            Some(OpenHandle::Upload(mut staging)) => {
                if let Err(e) = staging.close().await {
                    tracing::warn!(
                        path = %staging.path().display(),
                        error = %e,
                        "Cannot close staging file"
                    );
                }
            }
            Some(OpenHandle::Download(handle)) => {
                tracing::debug!(path = %handle.path().display(), "closing download handle");
            }
            None => {}
        }

        for path in self.staging_files.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "deleted staging file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Cannot delete staging file"
                ),
            }
        }
    }

    pub fn staging_mut(&mut self) -> Option<&mut StagingFile> {
        match self.handle.as_mut() {
            Some(OpenHandle::Upload(staging)) => Some(staging),
            _ => None,
        }
    }

    pub fn download_handle(&self) -> Option<&DownloadHandle> {
        match self.handle.as_ref() {
            Some(OpenHandle::Download(handle)) => Some(handle),
            _ => None,
        }
    }
}
