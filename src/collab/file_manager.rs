use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Authenticator, FileInfo, FileRegistration, FileShare, User};
use crate::transfer::names;

#[async_trait]
pub trait FileManager: Send + Sync {
    /// Preferred location for an upload of `file_name` by `user`.
    /// The staging file picks a free ` (N)` variant if the name is taken.
    async fn allocate_target_path(&self, user: &User, file_name: &str) -> Result<PathBuf>;

    /// Record a committed file and notify its recipients.
    /// Returns the recipient identifiers that could not be resolved.
    async fn register_and_notify(&self, registration: FileRegistration<'_>)
        -> Result<Vec<String>>;

    async fn file_info(&self, file_id: u64) -> Result<Option<FileInfo>>;

    fn is_allowed_access(&self, user: &User, file: &FileInfo) -> bool;

    /// Whether `user` may pass `file` on to others.
    fn is_controlling(&self, user: &User, file: &FileInfo) -> bool;

    /// Grant the share's recipients access to its files and notify them.
    /// Returns the recipient identifiers that could not be resolved.
    async fn share_files_with(&self, share: FileShare<'_>) -> Result<Vec<String>>;

    async fn list_download_files(&self, user: &User) -> Result<Vec<FileInfo>>;
}

struct StoredFile {
    info: FileInfo,
    shared_with: Vec<String>,
}

/// Per-user directories under a root, with an in-memory index.
pub struct LocalFileManager {
    root: PathBuf,
    directory: Arc<dyn Authenticator>,
    files: DashMap<u64, StoredFile>,
    next_id: AtomicU64,
}

impl LocalFileManager {
    /// `directory` resolves recipient identifiers.
    pub fn new(root: PathBuf, directory: Arc<dyn Authenticator>) -> Self {
        Self {
            root,
            directory,
            files: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Known and unknown recipient identifiers, in that order.
    fn split_recipients(&self, recipients: &[String]) -> (Vec<String>, Vec<String>) {
        recipients
            .iter()
            .cloned()
            .partition(|r| self.directory.is_known_user(r))
    }

    fn user_dir(&self, user: &User) -> Result<PathBuf> {
        let dir_name = names::base_name(&user.id);
        if names::is_unusable(dir_name) || dir_name != user.id {
            anyhow::bail!("user id {:?} cannot be used as a directory name", user.id);
        }
        Ok(self.root.join(dir_name))
    }
}

#[async_trait]
impl FileManager for LocalFileManager {
    async fn allocate_target_path(&self, user: &User, file_name: &str) -> Result<PathBuf> {
        let dir = self.user_dir(user)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .context(format!("Failed to create user directory {}", dir.display()))?;

        Ok(dir.join(file_name))
    }

    async fn register_and_notify(
        &self,
        registration: FileRegistration<'_>,
    ) -> Result<Vec<String>> {
        let size = tokio::fs::metadata(registration.path)
            .await
            .context(format!(
                "Failed to stat committed file {}",
                registration.path.display()
            ))?
            .len();

        let (valid, invalid) = self.split_recipients(registration.recipients);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let info = FileInfo {
            id,
            name: registration.file_name.to_string(),
            owner: registration.user.id.clone(),
            size,
            content_type: registration.content_type.to_string(),
            comment: registration.comment.to_string(),
            path: registration.path.to_path_buf(),
        };
        tracing::info!(
            file_id = id,
            owner = %info.owner,
            name = %info.name,
            size,
            "registered file"
        );

        for recipient in &valid {
            tracing::info!(
                recipient = %recipient,
                link = %format!("{}/files/{}", registration.origin_url.trim_end_matches('/'), id),
                "notifying recipient"
            );
        }

        self.files.insert(
            id,
            StoredFile {
                info,
                shared_with: valid,
            },
        );

        Ok(invalid)
    }

    async fn file_info(&self, file_id: u64) -> Result<Option<FileInfo>> {
        let Some(info) = self.files.get(&file_id).map(|f| f.info.clone()) else {
            return Ok(None);
        };
        // Index entries whose file vanished from disk count as missing.
        if tokio::fs::try_exists(&info.path).await.unwrap_or(false) {
            Ok(Some(info))
        } else {
            Ok(None)
        }
    }

    fn is_allowed_access(&self, user: &User, file: &FileInfo) -> bool {
        if file.owner == user.id {
            return true;
        }
        self.files
            .get(&file.id)
            .map(|f| f.shared_with.iter().any(|r| r == &user.id))
            .unwrap_or(false)
    }

    fn is_controlling(&self, user: &User, file: &FileInfo) -> bool {
        file.owner == user.id
    }

    async fn share_files_with(&self, share: FileShare<'_>) -> Result<Vec<String>> {
        let (valid, invalid) = self.split_recipients(share.recipients);

        for file in share.files {
            let mut stored = self
                .files
                .get_mut(&file.id)
                .with_context(|| format!("file {} is not registered", file.id))?;
            for recipient in &valid {
                if !stored.shared_with.contains(recipient) {
                    stored.shared_with.push(recipient.clone());
                }
            }
        }

        let file_ids: Vec<u64> = share.files.iter().map(|f| f.id).collect();
        for recipient in &valid {
            tracing::info!(
                recipient = %recipient,
                sharer = %share.user.id,
                ?file_ids,
                comment = share.comment,
                link = %format!("{}/files", share.origin_url.trim_end_matches('/')),
                "notifying recipient"
            );
        }

        Ok(invalid)
    }

    async fn list_download_files(&self, user: &User) -> Result<Vec<FileInfo>> {
        let mut files: Vec<FileInfo> = self
            .files
            .iter()
            .filter(|entry| self.is_allowed_access(user, &entry.info))
            .map(|entry| entry.info.clone())
            .collect();
        files.sort_by_key(|f| f.id);
        Ok(files)
    }
}
