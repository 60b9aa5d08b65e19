//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const MB: u64 = 1024 * 1024;

/// Hard ceiling for a single block in either direction.
pub const MAX_BLOCK_BYTES_LIMIT: u64 = 64 * MB;
/// Longest name most filesystems accept, in bytes.
const FILESYSTEM_NAME_BYTES: usize = 255;
/// `$` staging prefix plus the widest ` (N)` collision suffix.
const NAME_DECORATION_BYTES: usize = 1 + " (4294967295)".len();
pub const MAX_FILE_NAME_LENGTH_LIMIT: usize = FILESYSTEM_NAME_BYTES - NAME_DECORATION_BYTES;

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "blockdrop")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("blockdrop.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding one sub-directory per user.
    pub root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let root = ProjectDirs::from("", "", "blockdrop")
            .map(|p| p.data_dir().join("files"))
            .unwrap_or_else(|| PathBuf::from("blockdrop-files"));
        Self { root }
    }
}

/// Session expiry tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub sweep_interval_secs: u64,
    pub inactivity_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            inactivity_timeout_secs: 30 * 60,
        }
    }
}

impl SessionSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Upload and download limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Per-file upload cap in MB, unless the user carries an override
    pub max_upload_mb: u64,
    /// In bytes, before the staging prefix and any ` (N)` suffix are added
    pub max_file_name_length: usize,
    /// Largest block accepted or served in one call
    pub max_block_bytes: u64,
    pub failed_login_delay_ms: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_upload_mb: 2048,
            max_file_name_length: 240,
            max_block_bytes: 16 * MB,
            failed_login_delay_ms: 500,
        }
    }
}

impl TransferSettings {
    pub fn failed_login_delay(&self) -> Duration {
        Duration::from_millis(self.failed_login_delay_ms)
    }
}

/// Deterministic single-session mode for repeatable client test runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestModeSettings {
    pub enabled: bool,
    pub user_id: String,
}

impl Default for TestModeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            user_id: "test-user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    pub id: String,
    /// Hex SHA-256 of the password
    pub password_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_mb: Option<u64>,
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub sessions: SessionSettings,
    pub upload: TransferSettings,
    pub test_mode: TestModeSettings,
    pub users: Vec<UserEntry>,
}

impl AppConfig {
    /// Rejects values that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sessions.sweep_interval_secs > 0,
            "Invalid config: sessions.sweep_interval_secs must be > 0"
        );
        ensure!(
            self.sessions.inactivity_timeout_secs > 0,
            "Invalid config: sessions.inactivity_timeout_secs must be > 0"
        );
        ensure!(
            self.upload.max_upload_mb > 0,
            "Invalid config: upload.max_upload_mb must be > 0"
        );
        ensure!(
            self.upload.max_block_bytes > 0,
            "Invalid config: upload.max_block_bytes must be > 0"
        );
        ensure!(
            self.upload.max_block_bytes <= MAX_BLOCK_BYTES_LIMIT,
            "Invalid config: upload.max_block_bytes must be <= {MAX_BLOCK_BYTES_LIMIT}"
        );
        ensure!(
            self.upload.max_file_name_length >= 8,
            "Invalid config: upload.max_file_name_length must be >= 8"
        );
        ensure!(
            self.upload.max_file_name_length <= MAX_FILE_NAME_LENGTH_LIMIT,
            "Invalid config: upload.max_file_name_length must be <= {MAX_FILE_NAME_LENGTH_LIMIT}"
        );
        for user in &self.users {
            ensure!(
                !user.id.trim().is_empty(),
                "Invalid config: users[].id must not be empty"
            );
            ensure!(
                user.password_sha256.len() == 64
                    && user.password_sha256.chars().all(|c| c.is_ascii_hexdigit()),
                "Invalid config: users[{}].password_sha256 must be 64 hex characters",
                user.id
            );
        }
        Ok(())
    }
}

/// Values supplied on the command line, applied last.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,
    pub test_mode: bool,
}

/// Loads config from defaults/file/env.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &std::path::Path) -> Result<AppConfig> {
    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("BLOCKDROP_").split("__"))
        .extract()
        .context("Failed to load configuration")?;

    config.validate()?;

    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(bind) = &overrides.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(root) = &overrides.storage_root {
        config.storage.root = root.clone();
    }
    if overrides.test_mode {
        config.test_mode.enabled = true;
    }

    config
}
