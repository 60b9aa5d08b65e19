//! Staging file written block by block, promoted to its target by rename.
//!
//! The staging file always lives next to its target so promotion is a
//! same-filesystem rename.

use anyhow::{Context, Result};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::names::{numbered_sibling, staging_path_for};

/// RAII: `disarmed=false` → Drop deletes the staging file. Set `true` after promotion.
pub struct StagingFile {
    file: Option<File>,
    path: PathBuf,
    target: PathBuf,
    disarmed: bool,
}

impl StagingFile {
    /// Reserve a staging file for `target`, or for the first free ` (N)` variant of it.
    ///
    /// The exclusive create is the reservation: a name whose target or staging
    /// file already exists is skipped, so two uploads never share a staging file.
    pub async fn create(target: PathBuf) -> Result<Self> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut counter = 0u32;
        loop {
            let candidate = numbered_sibling(&target, counter);
            let path = staging_path_for(&candidate);

            let result = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match result {
                Ok(file) => {
                    let committed = tokio::fs::try_exists(&candidate)
                        .await
                        .context(format!("Failed to check {}", candidate.display()))?;
                    if !committed {
                        return Ok(Self {
                            file: Some(file),
                            path,
                            target: candidate,
                            disarmed: false,
                        });
                    }
                    // Name already holds a committed file, give the slot back
                    drop(file);
                    tokio::fs::remove_file(&path).await.context(format!(
                        "Failed to release staging file {}",
                        path.display()
                    ))?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!(
                        "Failed to create staging file: {}",
                        path.display()
                    )));
                }
            }

            counter = counter
                .checked_add(1)
                .context(format!("No free file name left for {}", target.display()))?;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("staging file {} is closed", self.path.display()))
    }

    /// Write `data` at `offset`. Rewriting a range with the same bytes is a no-op on content.
    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data)
            .await
            .context(format!("Failed to write block at offset {offset}"))?;
        // tokio completes the write in the background until flushed
        file.flush().await?;
        Ok(())
    }

    /// Current length on disk.
    pub async fn len(&mut self) -> Result<u64> {
        let file = self.file_mut()?;
        file.flush().await?;
        Ok(file.metadata().await?.len())
    }

    /// CRC32 over the whole staged content.
    pub async fn crc32(&mut self) -> Result<u32> {
        let file = self.file_mut()?;
        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;

        let mut hasher = crc32fast::Hasher::new();
        let mut buffer = vec![0u8; 64 * 1024]; // 64KB
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }

    /// Flush and drop the handle. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Close and rename onto the target. Returns the final path.
    pub async fn promote(mut self) -> Result<PathBuf> {
        self.close().await?;
        tokio::fs::rename(&self.path, &self.target)
            .await
            .context(format!(
                "Failed to move {} to {}",
                self.path.display(),
                self.target.display()
            ))?;
        self.disarmed = true;
        Ok(self.target.clone())
    }
}

/// Deletes the staging file unless it was promoted.
impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.disarmed {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up staging file"
                ),
            }
        }
    }
}
