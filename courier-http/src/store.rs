//! Credential persistence seam.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Default lifetime of stored entries (one week).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Fixed logical keys of the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Access/refresh pair with expiry.
    Token,
    /// Signed-in user's profile.
    UserInfo,
    /// Role list.
    Roles,
}

impl StoreKey {
    /// Storage key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "TOKEN__",
            Self::UserInfo => "USER__INFO__",
            Self::Roles => "ROLES__KEY__",
        }
    }
}

/// How long a stored value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlPolicy {
    /// [`DEFAULT_TTL`].
    #[default]
    Default,
    /// Never expires.
    Forever,
    /// Custom lifetime.
    For(Duration),
}

impl TtlPolicy {
    /// Lifetime, `None` for no expiry.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Default => Some(DEFAULT_TTL),
            Self::Forever => None,
            Self::For(d) => Some(*d),
        }
    }
}

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Stored value has the wrong shape.
    #[error("Invalid stored value for {key}: {message}")]
    Invalid {
        /// Key that was read.
        key: &'static str,
        /// Decode error.
        message: String,
    },
}

/// Key-value capability holding credential state.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read a value. Expired entries read as `None`.
    async fn get(&self, key: StoreKey) -> Result<Option<Value>, StoreError>;

    /// Write a value.
    async fn set(&self, key: StoreKey, value: Value, ttl: TtlPolicy) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: StoreKey) -> Result<(), StoreError>;
}

/// In-memory [`CredentialStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<RwLock<HashMap<StoreKey, (Value, Option<Instant>)>>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|(_, expires)| expires.is_none_or(|at| at > now))
            .count()
    }

    /// Check if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: StoreKey) -> Result<Option<Value>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                None => return Ok(None),
                Some((value, expires)) if expires.is_none_or(|at| at > now) => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => {}
            }
        }
        tracing::trace!(key = key.as_str(), "Evicting expired store entry");
        self.entries.write().remove(&key);
        Ok(None)
    }

    async fn set(&self, key: StoreKey, value: Value, ttl: TtlPolicy) -> Result<(), StoreError> {
        // A lifetime past the clock's range never expires
        let expires = ttl.duration().and_then(|d| Instant::now().checked_add(d));
        self.entries.write().insert(key, (value, expires));
        Ok(())
    }

    async fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        self.entries.write().remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryCredentialStore::new();
        tokio_test::assert_ok!(
            store
                .set(StoreKey::Roles, json!(["admin"]), TtlPolicy::Default)
                .await
        );
        assert_eq!(store.get(StoreKey::Roles).await.unwrap(), Some(json!(["admin"])));

        store.remove(StoreKey::Roles).await.unwrap();
        assert_eq!(store.get(StoreKey::Roles).await.unwrap(), None);
        store.remove(StoreKey::Roles).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryCredentialStore::new();
        store
            .set(StoreKey::Token, json!("t"), TtlPolicy::For(Duration::from_secs(10)))
            .await
            .unwrap();
        store
            .set(StoreKey::Roles, json!([]), TtlPolicy::Forever)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.get(StoreKey::Token).await.unwrap(), None);
        assert_eq!(store.get(StoreKey::Roles).await.unwrap(), Some(json!([])));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let store = MemoryCredentialStore::new();
        tokio_test::assert_ok!(
            store
                .set(StoreKey::Token, json!("t"), TtlPolicy::For(Duration::MAX))
                .await
        );
        assert_eq!(store.get(StoreKey::Token).await.unwrap(), Some(json!("t")));
        assert_eq!(store.len(), 1);
    }
}
