//! RPC-facing orchestration of sessions, the state table and storage.
//!
//! Every token-keyed call holds its session's transfer lock for its whole
//! duration. State checks run before any side effect, so a rejected call
//! leaves the session exactly as it was.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use super::file_handle::DownloadHandle;
use super::names::{self, base_name, content_type_for, ensure_maximum_size, is_unusable};
use super::staging::StagingFile;
use crate::collab::{
    AuditLog, Authenticator, FileInfo, FileManager, FileRegistration, FileShare, User,
};
use crate::common::config::{SessionSettings, TransferSettings, MB};
use crate::common::AppError;
use crate::session::context::OpenHandle;
use crate::session::state::{require_state, transition, Transition, UploadEvent};
use crate::session::{
    Operation, RemovalReason, Session, SessionRegistry, TransferContext, UploadState,
};

pub const PROTOCOL_VERSION: u32 = 4;
/// Oldest client protocol still served.
pub const MIN_CLIENT_VERSION: u32 = 3;

const LOGIN_FAILED: &str = "Login failed: invalid user or password";
const MAX_REPORTED_RECIPIENTS: usize = 10;

/// External services the transfer logic depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub files: Arc<dyn FileManager>,
    pub auth: Arc<dyn Authenticator>,
    pub audit: Arc<dyn AuditLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub state: UploadState,
    pub operation: Operation,
    pub current_file: Option<String>,
    pub pending_files: Vec<String>,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedFile {
    pub name: String,
    pub size: u64,
    pub crc32: u32,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockReceipt {
    /// Highest offset written so far for the current file.
    pub bytes_written: u64,
    /// Set when this block was the last one of its file.
    pub committed: Option<CommittedFile>,
    /// True when the block arrived after a cancel and was dropped.
    pub ignored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: u32,
    pub min_client_version: u32,
    pub server: &'static str,
}

fn io_failure(err: anyhow::Error) -> AppError {
    AppError::Io(format!("{err:#}"))
}

/// `[a, b, ... (3 left)]`
fn abbreviate(items: &[String], max: usize) -> String {
    let shown = items.iter().take(max).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > max {
        format!("[{shown}, ... ({} left)]", items.len() - max)
    } else {
        format!("[{shown}]")
    }
}

/// The single distinct comment of `files`, or every distinct one on its own line.
fn sharing_comment(files: &[FileInfo]) -> String {
    let mut comments: Vec<&str> = Vec::new();
    for comment in files.iter().map(|f| f.comment.trim()) {
        if !comment.is_empty() && !comments.contains(&comment) {
            comments.push(comment);
        }
    }
    match comments.as_slice() {
        [single] => single.to_string(),
        many => many.iter().map(|c| format!("{c}\n")).collect(),
    }
}

pub struct TransferService {
    registry: Arc<SessionRegistry>,
    collab: Collaborators,
    limits: TransferSettings,
    expiry: SessionSettings,
}

impl TransferService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        collab: Collaborators,
        limits: TransferSettings,
        expiry: SessionSettings,
    ) -> Self {
        Self {
            registry,
            collab,
            limits,
            expiry,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn limits(&self) -> &TransferSettings {
        &self.limits
    }

    //==========
    // SESSIONS
    //==========

    pub async fn login(
        &self,
        user_id: &str,
        password: &str,
        origin_url: &str,
    ) -> Result<String, AppError> {
        match self.collab.auth.authenticate(user_id, password).await {
            Some(user) => {
                let session = self.registry.create(user, origin_url.to_string()).await;
                Ok(session.token().to_string())
            }
            None => {
                self.collab.audit.failed_login(user_id);
                tokio::time::sleep(self.limits.failed_login_delay()).await;
                Err(AppError::AuthorizationFailure(LOGIN_FAILED.to_string()))
            }
        }
    }

    /// Session for a user that bypasses authentication. Test mode only.
    pub async fn open_session(&self, user: User, origin_url: &str) -> String {
        let session = self.registry.create(user, origin_url.to_string()).await;
        session.token().to_string()
    }

    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        let session = self.registry.get(token)?;
        {
            let mut ctx = session.lock().await?;
            self.terminate(&session, &mut ctx, RemovalReason::Explicit)
                .await;
        }
        self.registry.remove(token, RemovalReason::Explicit).await;
        Ok(())
    }

    pub fn check_session(&self, token: &str) -> Result<(), AppError> {
        let session = self.registry.get(token)?;
        if session.is_closed() {
            return Err(AppError::InvalidSession(token.to_string()));
        }
        session.touch();
        Ok(())
    }

    /// Shared cleanup for logout, expiry and shutdown.
    ///
    /// Runs under the session's transfer lock. After it returns the session
    /// refuses every further call.
    pub async fn terminate(
        &self,
        session: &Session,
        ctx: &mut TransferContext,
        reason: RemovalReason,
    ) {
        ctx.release_resources().await;
        *ctx = TransferContext::default();
        session.mark_closed();
        self.collab
            .audit
            .session_removed(&session.user().id, session.token(), reason);
    }

    /// Removes every session idle for longer than the inactivity timeout.
    ///
    /// Sessions busy with a call are skipped and retried on the next sweep.
    /// Returns the number of sessions removed.
    pub async fn expire_idle_sessions(&self, now: u64) -> usize {
        let threshold = self.expiry.inactivity_timeout().as_millis() as u64;
        let guard = self.registry.lock_mutation().await;

        let mut removed = 0;
        for session in self.registry.list_all() {
            if session.idle_millis(now) <= threshold {
                continue;
            }
            let Some(mut ctx) = session.try_lock() else {
                tracing::debug!(token = %session.token(), "session busy, skipping expiry");
                continue;
            };
            // A call may have finished between the snapshot and the lock.
            if session.idle_millis(now) <= threshold {
                continue;
            }
            tracing::info!(
                token = %session.token(),
                user = %session.user().id,
                idle_ms = session.idle_millis(now),
                "expiring idle session"
            );
            self.terminate(&session, &mut ctx, RemovalReason::Expired)
                .await;
            drop(ctx);
            self.registry
                .remove_locked(&guard, session.token(), RemovalReason::Expired);
            removed += 1;
        }
        removed
    }

    /// Releases every session concurrently. Used on shutdown.
    pub async fn close_all(&self) {
        let sessions = self.registry.list_all();
        join_all(sessions.iter().map(|session| async move {
            if let Ok(mut ctx) = session.lock().await {
                self.terminate(session, &mut ctx, RemovalReason::Explicit)
                    .await;
            }
        }))
        .await;

        for session in &sessions {
            self.registry
                .remove(session.token(), RemovalReason::Explicit)
                .await;
        }
    }

    //========
    // UPLOAD
    //========

    pub async fn get_upload_status(&self, token: &str) -> Result<UploadStatus, AppError> {
        let session = self.registry.get(token)?;
        let ctx = session.lock().await?;
        let status = UploadStatus {
            state: ctx.state,
            operation: ctx.operation,
            current_file: ctx.current_file.clone(),
            pending_files: ctx.pending_files.iter().cloned().collect(),
            bytes_written: ctx.bytes_written,
        };
        session.touch();
        Ok(status)
    }

    pub async fn define_upload_parameters(
        &self,
        token: &str,
        files: &[String],
        recipients: &str,
        comment: &str,
    ) -> Result<(), AppError> {
        let session = self.registry.get(token)?;
        let mut ctx = session.lock().await?;

        let next = transition(
            ctx.state,
            UploadEvent::DefineParameters {
                file_count: files.len(),
            },
        )?;

        let names = files
            .iter()
            .map(|f| base_name(f).to_string())
            .collect::<Vec<_>>();
        if let Some(bad) = names.iter().find(|n| is_unusable(n)) {
            return Err(AppError::BadRequest(format!("unusable file name {bad:?}")));
        }

        if let Transition::To(state) = next {
            ctx.state = state;
        }
        ctx.pending_files = names.into();
        ctx.recipients = names::tokenize_recipients(recipients);
        ctx.comment = comment.to_string();

        tracing::info!(
            token = %token,
            files = ctx.pending_files.len(),
            recipients = ctx.recipients.len(),
            "upload parameters defined"
        );
        session.touch();
        Ok(())
    }

    /// Opens the staging file for the next declared file and returns its final name.
    pub async fn start_uploading(&self, token: &str) -> Result<String, AppError> {
        let session = self.registry.get(token)?;
        let mut ctx = session.lock().await?;

        let next = transition(ctx.state, UploadEvent::StartUploading)?;
        let requested = ctx
            .pending_files
            .front()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no pending file in state {:?}", ctx.state))?;

        let user = session.user();
        let file_name = ensure_maximum_size(&requested, self.limits.max_file_name_length);

        let staging = match self.open_staging(&session, &file_name).await {
            Ok(staging) => staging,
            Err(e) => {
                self.collab.audit.upload_started(&user.id, &file_name, false);
                return Err(e);
            }
        };
        let final_name = staging
            .target()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());

        ctx.pending_files.pop_front();
        ctx.staging_files.push(staging.path().to_path_buf());
        ctx.handle = Some(OpenHandle::Upload(staging));
        ctx.download = None;
        ctx.current_file = Some(final_name.clone());
        ctx.last_file = Some(final_name.clone());
        ctx.integrity = Default::default();
        ctx.bytes_written = 0;
        ctx.operation = Operation::Upload;
        if let Transition::To(state) = next {
            ctx.state = state;
        }

        self.collab.audit.upload_started(&user.id, &final_name, true);
        tracing::info!(token = %token, file = %final_name, "upload started");
        session.touch();
        Ok(final_name)
    }

    async fn open_staging(&self, session: &Session, file_name: &str) -> Result<StagingFile, AppError> {
        let target = self
            .collab
            .files
            .allocate_target_path(session.user(), file_name)
            .await
            .map_err(io_failure)?;
        StagingFile::create(target).await.map_err(io_failure)
    }

    /// Writes `data` at `offset` of the current file; the last block commits it.
    pub async fn upload_block(
        &self,
        token: &str,
        offset: u64,
        data: &[u8],
        last: bool,
    ) -> Result<BlockReceipt, AppError> {
        let session = self.registry.get(token)?;
        let mut ctx = session.lock().await?;

        let event = UploadEvent::UploadBlock {
            last,
            files_remaining: ctx.pending_files.len(),
        };
        let next = match transition(ctx.state, event)? {
            Transition::To(state) => state,
            Transition::Ignore => {
                tracing::debug!(token = %token, offset, "block after cancel ignored");
                session.touch();
                return Ok(BlockReceipt {
                    ignored: true,
                    ..Default::default()
                });
            }
        };

        let max_mb = session.user().max_upload_mb.unwrap_or(self.limits.max_upload_mb);
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| AppError::BadRequest(format!("offset {offset} out of range")))?;
        if end > max_mb.saturating_mul(MB) {
            return Err(AppError::FileSizeExceeded { max_mb });
        }

        let staging = ctx
            .staging_mut()
            .ok_or_else(|| AppError::NotInProgress("no upload in progress".to_string()))?;
        staging.write_at(offset, data).await.map_err(io_failure)?;
        ctx.integrity.record(offset, data);
        ctx.bytes_written = ctx.bytes_written.max(end);
        tracing::debug!(token = %token, offset, len = data.len(), last, "block written");

        if !last {
            ctx.state = next;
            session.touch();
            return Ok(BlockReceipt {
                bytes_written: ctx.bytes_written,
                ..Default::default()
            });
        }

        let committed = self.commit_current(&session, &mut ctx, next).await?;
        session.touch();
        let receipt = BlockReceipt {
            bytes_written: ctx.bytes_written,
            committed: Some(committed.file),
            ignored: false,
        };

        if !committed.invalid_recipients.is_empty() {
            return Err(AppError::UserFailure(format!(
                "Some user identifiers are invalid: {}",
                abbreviate(&committed.invalid_recipients, MAX_REPORTED_RECIPIENTS)
            )));
        }
        Ok(receipt)
    }

    async fn commit_current(
        &self,
        session: &Session,
        ctx: &mut TransferContext,
        next: UploadState,
    ) -> Result<Commit, AppError> {
        let Some(OpenHandle::Upload(mut staging)) = ctx.handle.take() else {
            return Err(AppError::NotInProgress("no upload in progress".to_string()));
        };
        let integrity = std::mem::take(&mut ctx.integrity);
        let measured = async {
            let size = staging.len().await?;
            let crc32 = match integrity.finalize(size) {
                Some(crc) => crc,
                None => {
                    tracing::debug!(token = %session.token(), "non-sequential upload, hashing from disk");
                    staging.crc32().await?
                }
            };
            anyhow::Ok((size, crc32))
        }
        .await;
        let (size, crc32) = match measured {
            Ok(measured) => measured,
            Err(e) => {
                ctx.handle = Some(OpenHandle::Upload(staging));
                return Err(io_failure(e));
            }
        };

        let staging_path = staging.path().to_path_buf();
        let target = staging.promote().await.map_err(io_failure)?;
        ctx.staging_files.retain(|p| p != &staging_path);

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = content_type_for(&name);
        ctx.current_file = None;
        ctx.state = next;

        tracing::info!(
            token = %session.token(),
            file = %name,
            size,
            crc32 = format_args!("{crc32:08x}"),
            "upload committed"
        );

        let invalid_recipients = self
            .collab
            .files
            .register_and_notify(FileRegistration {
                user: session.user(),
                file_name: &name,
                comment: &ctx.comment,
                content_type: &content_type,
                path: &target,
                recipients: &ctx.recipients,
                origin_url: session.origin_url(),
            })
            .await?;

        Ok(Commit {
            file: CommittedFile {
                name,
                size,
                crc32,
                content_type,
            },
            invalid_recipients,
        })
    }

    //==========
    // DOWNLOAD
    //==========

    pub async fn start_downloading(&self, token: &str, file_id: u64) -> Result<FileInfo, AppError> {
        let session = self.registry.get(token)?;
        let mut ctx = session.lock().await?;
        let user = session.user();

        require_state(
            ctx.state,
            &[
                UploadState::Initialized,
                UploadState::ReadyForNextFile,
                UploadState::Finished,
            ],
        )?;

        let mut info = match self.collab.files.file_info(file_id).await? {
            Some(info) if self.collab.files.is_allowed_access(user, &info) => info,
            _ => {
                self.collab.audit.download_started(&user.id, file_id, false);
                return Err(AppError::NotFoundOrUnauthorized { file_id });
            }
        };

        let handle = match DownloadHandle::open(&info.path) {
            Ok(handle) => handle,
            Err(e) => {
                self.collab.audit.download_started(&user.id, file_id, false);
                return Err(io_failure(e));
            }
        };

        // The index records the size at commit, the handle sees what is on disk now
        info.size = handle.size();
        ctx.handle = Some(OpenHandle::Download(handle));
        ctx.download = Some(info.clone());
        ctx.operation = Operation::Download;

        self.collab.audit.download_started(&user.id, file_id, true);
        tracing::info!(token = %token, file_id, size = info.size, "download started");
        session.touch();
        Ok(info)
    }

    pub async fn download_block(
        &self,
        token: &str,
        offset: u64,
        block_size: usize,
    ) -> Result<Vec<u8>, AppError> {
        let session = self.registry.get(token)?;
        let ctx = session.lock().await?;

        if ctx.state == UploadState::Aborted {
            return Err(AppError::ProtocolState {
                expected: vec![
                    UploadState::Initialized,
                    UploadState::ReadyForNextFile,
                    UploadState::Finished,
                ],
                actual: ctx.state,
            });
        }
        let handle = ctx
            .download_handle()
            .ok_or_else(|| AppError::NotInProgress("no download in progress".to_string()))?;

        let block_size = block_size.min(self.limits.max_block_bytes as usize);
        let block = handle
            .read_block(offset, block_size)
            .await
            .map_err(io_failure)?;
        tracing::debug!(token = %token, offset, len = block.len(), "block served");
        session.touch();
        Ok(block)
    }

    pub async fn list_download_files(&self, token: &str) -> Result<Vec<FileInfo>, AppError> {
        let session = self.registry.get(token)?;
        let files = self.collab.files.list_download_files(session.user()).await?;
        session.touch();
        Ok(files)
    }

    //=========
    // SHARING
    //=========

    /// Grants `recipients` access to already stored files. The caller must control every file.
    pub async fn share_files(
        &self,
        token: &str,
        file_ids: &[u64],
        recipients: &str,
    ) -> Result<(), AppError> {
        let session = self.registry.get(token)?;
        // serialized with the token's other calls, transfer state is not touched
        let _ctx = session.lock().await?;
        let user = session.user();
        let recipients = names::tokenize_recipients(recipients);

        let mut files = Vec::with_capacity(file_ids.len());
        for &file_id in file_ids {
            match self.collab.files.file_info(file_id).await? {
                Some(info) => files.push(info),
                None => {
                    tracing::warn!(token = %token, file_id, "share refused, unknown file");
                    self.collab.audit.files_shared(&user.id, file_ids, false);
                    return Err(AppError::NotFoundOrUnauthorized { file_id });
                }
            }
        }

        if let Some(file) = files
            .iter()
            .find(|f| !self.collab.files.is_controlling(user, f))
        {
            tracing::warn!(
                token = %token,
                user = %user.id,
                file_id = file.id,
                "share refused, file not controlled by caller"
            );
            self.collab.audit.files_shared(&user.id, file_ids, false);
            return Err(AppError::InsufficientPrivileges(format!(
                "Insufficient privileges for user {}.",
                user.id
            )));
        }

        let comment = sharing_comment(&files);
        let invalid = self
            .collab
            .files
            .share_files_with(FileShare {
                user,
                files: &files,
                recipients: &recipients,
                comment: &comment,
                origin_url: session.origin_url(),
            })
            .await?;
        self.collab.audit.files_shared(&user.id, file_ids, true);
        tracing::info!(
            token = %token,
            files = files.len(),
            recipients = recipients.len(),
            "files shared"
        );
        session.touch();

        if !invalid.is_empty() {
            return Err(AppError::UserFailure(format!(
                "Some user identifiers are invalid: {}",
                abbreviate(&invalid, MAX_REPORTED_RECIPIENTS)
            )));
        }
        Ok(())
    }

    //===========
    // LIFECYCLE
    //===========

    /// Aborts the current transfer. The session stays usable for `finish`.
    pub async fn cancel(&self, token: &str) -> Result<(), AppError> {
        let session = self.registry.get(token)?;
        let mut ctx = session.lock().await?;

        match transition(ctx.state, UploadEvent::Cancel)? {
            Transition::To(state) => ctx.state = state,
            Transition::Ignore => {
                tracing::debug!(token = %token, state = ?ctx.state, "nothing left to cancel")
            }
        }
        ctx.release_resources().await;
        ctx.operation = Operation::None;
        ctx.current_file = None;
        ctx.download = None;

        self.collab.audit.cancelled(&session.user().id, token);
        tracing::info!(token = %token, "transfer cancelled");
        session.touch();
        Ok(())
    }

    /// Ends the batch and resets the session for reuse.
    pub async fn finish(&self, token: &str, successful: bool) -> Result<(), AppError> {
        let session = self.registry.get(token)?;
        let mut ctx = session.lock().await?;
        let user_id = &session.user().id;

        transition(ctx.state, UploadEvent::Finish)?;
        match (ctx.operation, &ctx.last_file, &ctx.download) {
            (Operation::Upload, Some(file), _) => {
                self.collab.audit.upload_finished(user_id, file, successful)
            }
            (Operation::Download, _, Some(info)) => {
                self.collab
                    .audit
                    .download_finished(user_id, info.id, successful)
            }
            _ => tracing::warn!(
                token = %token,
                "finish() called when no operation was in progress"
            ),
        }

        ctx.release_resources().await;
        *ctx = TransferContext::default();
        tracing::info!(token = %token, successful, "transfer finished");
        session.touch();
        Ok(())
    }

    pub fn version(&self) -> VersionInfo {
        VersionInfo {
            version: PROTOCOL_VERSION,
            min_client_version: MIN_CLIENT_VERSION,
            server: env!("CARGO_PKG_VERSION"),
        }
    }
}

struct Commit {
    file: CommittedFile,
    invalid_recipients: Vec<String>,
}
