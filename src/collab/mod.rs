//! Collaborators consumed by the transfer service.
//!
//! The service only talks to these traits. `LocalFileManager`,
//! `StaticAuthenticator` and `TracingAuditLog` back the binary.

mod audit;
mod auth;
mod file_manager;

pub use audit::{AuditLog, TracingAuditLog};
pub use auth::{hash_password, Authenticator, StaticAuthenticator};
pub use file_manager::{FileManager, LocalFileManager};

use serde::Serialize;
use std::path::PathBuf;

/// Authenticated identity. Opaque to the protocol apart from the upload cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    /// Overrides the configured upload cap when set.
    pub max_upload_mb: Option<u64>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_upload_mb: None,
        }
    }
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: u64,
    pub name: String,
    pub owner: String,
    pub size: u64,
    pub content_type: String,
    pub comment: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Everything the file manager needs to register a committed upload.
#[derive(Debug, Clone)]
pub struct FileRegistration<'a> {
    pub user: &'a User,
    pub file_name: &'a str,
    pub comment: &'a str,
    pub content_type: &'a str,
    pub path: &'a std::path::Path,
    pub recipients: &'a [String],
    pub origin_url: &'a str,
}

/// Already stored files to be shared with more recipients.
#[derive(Debug, Clone)]
pub struct FileShare<'a> {
    pub user: &'a User,
    pub files: &'a [FileInfo],
    pub recipients: &'a [String],
    pub comment: &'a str,
    pub origin_url: &'a str,
}
