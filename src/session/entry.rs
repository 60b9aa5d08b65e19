use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, MutexGuard};

use super::context::TransferContext;
use crate::collab::User;
use crate::common::AppError;

/// Wall-clock milliseconds since the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One authenticated login.
///
/// Identity fields never change. All transfer state sits behind `ctx`, so
/// two calls on the same token serialize while different tokens run in parallel.
pub struct Session {
    token: String,
    user: User,
    origin_url: String,
    last_active: AtomicU64,
    closed: AtomicBool,
    ctx: Mutex<TransferContext>,
}

impl Session {
    pub fn new(token: String, user: User, origin_url: String) -> Self {
        tracing::debug!(token = %token, user = %user.id, "created session");
        Self {
            token,
            user,
            origin_url,
            last_active: AtomicU64::new(now_millis()),
            closed: AtomicBool::new(false),
            ctx: Mutex::new(TransferContext::default()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    pub fn touch(&self) {
        self.touch_at(now_millis());
    }

    pub fn touch_at(&self, millis: u64) {
        self.last_active.store(millis, Ordering::SeqCst);
    }

    pub fn last_active_millis(&self) -> u64 {
        self.last_active.load(Ordering::SeqCst)
    }

    pub fn idle_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_active_millis())
    }

    /// Waits for the transfer context.
    ///
    /// A session terminated while the caller was queued reports `InvalidSession`
    /// instead of handing out a context that was already released.
    pub async fn lock(&self) -> Result<MutexGuard<'_, TransferContext>, AppError> {
        let guard = self.ctx.lock().await;
        if self.is_closed() {
            return Err(AppError::InvalidSession(self.token.clone()));
        }
        Ok(guard)
    }

    /// Non-blocking variant for the sweeper. `None` if busy or closed.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, TransferContext>> {
        let guard = self.ctx.try_lock().ok()?;
        if self.is_closed() {
            return None;
        }
        Some(guard)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("user", &self.user.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
