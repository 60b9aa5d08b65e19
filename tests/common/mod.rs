#![allow(dead_code)]

pub mod config_test_utils;
pub mod http;

use std::sync::{Arc, Mutex};

use blockdrop::collab::{AuditLog, Authenticator, LocalFileManager, StaticAuthenticator};
use blockdrop::common::config::{SessionSettings, TransferSettings, UserEntry};
use blockdrop::collab::hash_password;
use blockdrop::session::{RemovalReason, SessionRegistry};
use blockdrop::transfer::{Collaborators, TransferService};
use tempfile::TempDir;

pub const ALICE_PASSWORD: &str = "alice-pw";
pub const BOB_PASSWORD: &str = "bob-pw";
pub const ORIGIN: &str = "http://localhost:8420";

/// Audit sink that keeps every event as a short string.
#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<String>>,
}

impl RecordingAudit {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.events().iter().any(|e| e.starts_with(prefix))
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl AuditLog for RecordingAudit {
    fn failed_login(&self, user_id: &str) {
        self.push(format!("failed_login {user_id}"));
    }
    fn upload_started(&self, user_id: &str, file_name: &str, success: bool) {
        self.push(format!("upload_started {user_id} {file_name} {success}"));
    }
    fn upload_finished(&self, user_id: &str, file_name: &str, success: bool) {
        self.push(format!("upload_finished {user_id} {file_name} {success}"));
    }
    fn download_started(&self, user_id: &str, file_id: u64, success: bool) {
        self.push(format!("download_started {user_id} {file_id} {success}"));
    }
    fn download_finished(&self, user_id: &str, file_id: u64, success: bool) {
        self.push(format!("download_finished {user_id} {file_id} {success}"));
    }
    fn cancelled(&self, user_id: &str, _token: &str) {
        self.push(format!("cancelled {user_id}"));
    }
    fn files_shared(&self, user_id: &str, file_ids: &[u64], success: bool) {
        self.push(format!("files_shared {user_id} {file_ids:?} {success}"));
    }
    fn session_removed(&self, user_id: &str, _token: &str, reason: RemovalReason) {
        self.push(format!("session_removed {user_id} {reason}"));
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub service: Arc<TransferService>,
    pub audit: Arc<RecordingAudit>,
}

impl TestEnv {
    pub fn storage(&self) -> std::path::PathBuf {
        self.dir.path().join("files")
    }

    pub async fn login(&self, user: &str) -> String {
        let password = match user {
            "alice" => ALICE_PASSWORD,
            "bob" => BOB_PASSWORD,
            "carol" => "carol-pw",
            other => panic!("no test password for {other}"),
        };
        self.service
            .login(user, password, ORIGIN)
            .await
            .expect("login should succeed")
    }

    /// Declares and uploads one file in `block`-sized pieces. Returns the final name.
    pub async fn upload_one(&self, token: &str, name: &str, data: &[u8], block: usize) -> String {
        self.service
            .define_upload_parameters(token, &[name.to_string()], "", "")
            .await
            .expect("define parameters");
        let file_name = self.service.start_uploading(token).await.expect("start uploading");
        self.send_blocks(token, data, block).await;
        file_name
    }

    pub async fn send_blocks(&self, token: &str, data: &[u8], block: usize) {
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(block).collect()
        };
        let mut offset = 0u64;
        for (i, chunk) in chunks.iter().enumerate() {
            let last = i + 1 == chunks.len();
            self.service
                .upload_block(token, offset, chunk, last)
                .await
                .expect("upload block");
            offset += chunk.len() as u64;
        }
    }

    /// Reads a whole open download in `block`-sized pieces.
    pub async fn read_all(&self, token: &str, block: usize) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let chunk = self
                .service
                .download_block(token, out.len() as u64, block)
                .await
                .expect("download block");
            if chunk.is_empty() {
                return out;
            }
            out.extend_from_slice(&chunk);
        }
    }
}

pub fn users() -> Vec<UserEntry> {
    vec![
        UserEntry {
            id: "alice".to_string(),
            password_sha256: hash_password(ALICE_PASSWORD),
            max_upload_mb: None,
        },
        UserEntry {
            id: "bob".to_string(),
            password_sha256: hash_password(BOB_PASSWORD),
            max_upload_mb: None,
        },
        UserEntry {
            id: "carol".to_string(),
            password_sha256: hash_password("carol-pw"),
            max_upload_mb: Some(1),
        },
    ]
}

pub fn fast_limits() -> TransferSettings {
    TransferSettings {
        failed_login_delay_ms: 10,
        ..TransferSettings::default()
    }
}

pub fn setup() -> TestEnv {
    setup_with(fast_limits(), SessionSettings::default())
}

pub fn setup_with(limits: TransferSettings, expiry: SessionSettings) -> TestEnv {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let auth: Arc<dyn Authenticator> = Arc::new(StaticAuthenticator::new(users()));
    let files = Arc::new(LocalFileManager::new(dir.path().join("files"), auth.clone()));
    let audit = Arc::new(RecordingAudit::default());

    let service = Arc::new(TransferService::new(
        Arc::new(SessionRegistry::new()),
        Collaborators {
            files,
            auth,
            audit: audit.clone(),
        },
        limits,
        expiry,
    ));

    TestEnv {
        dir,
        service,
        audit,
    }
}

/// Deterministic pseudo-random payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
