//! Fire-and-forget audit hooks.

use crate::session::RemovalReason;

/// Every method has an empty default so sinks only implement what they record.
pub trait AuditLog: Send + Sync {
    fn failed_login(&self, _user_id: &str) {}
    fn upload_started(&self, _user_id: &str, _file_name: &str, _success: bool) {}
    fn upload_finished(&self, _user_id: &str, _file_name: &str, _success: bool) {}
    fn download_started(&self, _user_id: &str, _file_id: u64, _success: bool) {}
    fn download_finished(&self, _user_id: &str, _file_id: u64, _success: bool) {}
    fn cancelled(&self, _user_id: &str, _token: &str) {}
    fn files_shared(&self, _user_id: &str, _file_ids: &[u64], _success: bool) {}
    fn session_removed(&self, _user_id: &str, _token: &str, _reason: RemovalReason) {}
}

/// Writes audit events as `tracing` events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn failed_login(&self, user_id: &str) {
        tracing::warn!(target: "audit", user = user_id, "login failed");
    }

    fn upload_started(&self, user_id: &str, file_name: &str, success: bool) {
        tracing::info!(target: "audit", user = user_id, file = file_name, success, "upload started");
    }

    fn upload_finished(&self, user_id: &str, file_name: &str, success: bool) {
        tracing::info!(target: "audit", user = user_id, file = file_name, success, "upload finished");
    }

    fn download_started(&self, user_id: &str, file_id: u64, success: bool) {
        tracing::info!(target: "audit", user = user_id, file_id, success, "download started");
    }

    fn download_finished(&self, user_id: &str, file_id: u64, success: bool) {
        tracing::info!(target: "audit", user = user_id, file_id, success, "download finished");
    }

    fn cancelled(&self, user_id: &str, token: &str) {
        tracing::info!(target: "audit", user = user_id, token, "transfer cancelled");
    }

    fn files_shared(&self, user_id: &str, file_ids: &[u64], success: bool) {
        tracing::info!(target: "audit", user = user_id, ?file_ids, success, "files shared");
    }

    fn session_removed(&self, user_id: &str, token: &str, reason: RemovalReason) {
        tracing::info!(target: "audit", user = user_id, token, %reason, "session removed");
    }
}
