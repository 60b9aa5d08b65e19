//! Token-keyed store of live sessions.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::entry::Session;
use crate::collab::User;
use crate::common::AppError;

/// Why a session left the registry. Only used for logging and auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Explicit,
    Expired,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalReason::Explicit => write!(f, "explicit"),
            RemovalReason::Expired => write!(f, "expired"),
        }
    }
}

enum TokenSource {
    Random,
    Sequential(AtomicU64),
}

impl TokenSource {
    fn next(&self) -> String {
        match self {
            TokenSource::Random => Uuid::new_v4().to_string(),
            TokenSource::Sequential(counter) => {
                format!("session-{}", counter.fetch_add(1, Ordering::SeqCst))
            }
        }
    }
}

/// Proof that the caller holds the registry mutation lock.
pub struct MutationGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    /// Serializes create/remove against the sweeper's scan-then-remove.
    mutation: Mutex<()>,
    tokens: TokenSource,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            mutation: Mutex::new(()),
            tokens: TokenSource::Random,
        }
    }

    /// Tokens are `session-1`, `session-2`, ... for reproducible client runs.
    pub fn new_deterministic() -> Self {
        Self {
            tokens: TokenSource::Sequential(AtomicU64::new(1)),
            ..Self::new()
        }
    }

    pub async fn create(&self, user: User, origin_url: String) -> Arc<Session> {
        let _guard = self.mutation.lock().await;

        let mut token = self.tokens.next();
        while self.sessions.contains_key(&token) {
            token = self.tokens.next();
        }

        let session = Arc::new(Session::new(token.clone(), user, origin_url));
        self.sessions.insert(token, session.clone());
        tracing::info!(
            token = %session.token(),
            user = %session.user().id,
            active = self.sessions.len(),
            "session created"
        );
        session
    }

    pub fn get(&self, token: &str) -> Result<Arc<Session>, AppError> {
        self.sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::InvalidSession(token.to_string()))
    }

    pub async fn remove(&self, token: &str, reason: RemovalReason) -> Option<Arc<Session>> {
        let guard = self.lock_mutation().await;
        self.remove_locked(&guard, token, reason)
    }

    pub async fn lock_mutation(&self) -> MutationGuard<'_> {
        MutationGuard(self.mutation.lock().await)
    }

    /// Removal for callers already holding the mutation lock.
    pub fn remove_locked(
        &self,
        _guard: &MutationGuard<'_>,
        token: &str,
        reason: RemovalReason,
    ) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(token).map(|(_, session)| session);
        if removed.is_some() {
            tracing::info!(
                token = %token,
                %reason,
                active = self.sessions.len(),
                "session removed"
            );
        }
        removed
    }

    /// Point-in-time snapshot. Safe against concurrent create/remove.
    pub fn list_all(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
