//! Random-access, read-only handle for serving download blocks.

use anyhow::{Context, Result};
use positioned_io::{RandomAccessFile, ReadAt};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct DownloadHandle {
    file: Arc<RandomAccessFile>,
    path: PathBuf,
    size: u64,
}

impl DownloadHandle {
    #[tracing::instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).context(format!(
            "Failed to open file for download: {}",
            path.display()
        ))?;
        let size = file.metadata()?.len();

        // On Unix this advises the OS with FADV_RANDOM
        let file = RandomAccessFile::try_new(file).context("Failed to create RandomAccessFile")?;

        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `block_size` bytes starting at `offset`.
    ///
    /// Returns an empty block at end of file; an offset past the end is an error.
    pub async fn read_block(&self, offset: u64, block_size: usize) -> Result<Vec<u8>> {
        let bytes_left = self
            .size
            .checked_sub(offset)
            .ok_or_else(|| anyhow::anyhow!("File pointer {} > file size {}", offset, self.size))?;
        let len = (block_size as u64).min(bytes_left) as usize;
        if len == 0 {
            return Ok(Vec::new());
        }

        let file = self.file.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; len];
            file.read_exact_at(offset, &mut buffer)
                .context(format!("Failed to read block at offset {offset}"))?;
            Ok(buffer)
        })
        .await
        .context("read task panicked")?
    }
}
