use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::User;
use crate::common::config::UserEntry;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `None` when the credentials are wrong or the user is unknown.
    async fn authenticate(&self, user_id: &str, password: &str) -> Option<User>;

    /// Whether `user_id` names a known account. Used to validate recipients.
    fn is_known_user(&self, user_id: &str) -> bool;
}

/// Hex SHA-256 of a password, as stored in the `users` table.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Accounts loaded from configuration.
pub struct StaticAuthenticator {
    users: HashMap<String, UserEntry>,
}

impl StaticAuthenticator {
    pub fn new(entries: impl IntoIterator<Item = UserEntry>) -> Self {
        let users = entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        Self { users }
    }

    /// Convenience constructor from plain `(id, password)` pairs.
    pub fn with_passwords<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(pairs.into_iter().map(|(id, password)| UserEntry {
            id: id.to_string(),
            password_sha256: hash_password(password),
            max_upload_mb: None,
        }))
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, user_id: &str, password: &str) -> Option<User> {
        let entry = self.users.get(user_id)?;
        let digest = hash_password(password);
        if !digest.eq_ignore_ascii_case(&entry.password_sha256) {
            return None;
        }
        Some(User {
            id: entry.id.clone(),
            max_upload_mb: entry.max_upload_mb,
        })
    }

    fn is_known_user(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }
}
