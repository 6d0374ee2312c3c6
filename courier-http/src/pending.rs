//! In-flight request tracking and de-duplication.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::params::TIMESTAMP_PARAM;
use crate::request::RequestDescriptor;

/// Identity of a request for de-duplication.
///
/// Built from the method, URL, query and body. The `_t` freshness
/// parameter is left out so cache-busting does not defeat it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Fingerprint the given request parts.
    pub fn new(method: &str, url: &str, params: Option<&Value>, data: Option<&Value>) -> Self {
        let params = params.map(|p| match p {
            Value::Object(map) if map.contains_key(TIMESTAMP_PARAM) => {
                let mut map = map.clone();
                map.remove(TIMESTAMP_PARAM);
                Value::Object(map).to_string()
            }
            other => other.to_string(),
        });
        let data = data.map(Value::to_string);

        Self(format!(
            "{}&{}&{}&{}",
            method,
            url,
            params.as_deref().unwrap_or(""),
            data.as_deref().unwrap_or("")
        ))
    }

    /// Fingerprint a descriptor.
    pub fn of(request: &RequestDescriptor) -> Self {
        Self::new(
            request.method.as_str(),
            &request.url,
            request.params.as_ref(),
            request.data.as_ref(),
        )
    }

    /// The fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Entries = HashMap<RequestFingerprint, (u64, CancellationToken)>;

/// Tracks in-flight requests by fingerprint.
///
/// At most one request per fingerprint is in flight: registering a key
/// that is already pending cancels the older request first.
#[derive(Clone, Default)]
pub struct PendingRequests {
    entries: Arc<Mutex<Entries>>,
    next_id: Arc<AtomicU64>,
}

impl PendingRequests {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request, cancelling any in-flight duplicate.
    pub fn register(&self, key: RequestFingerprint) -> PendingHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self
            .entries
            .lock()
            .insert(key.clone(), (id, token.clone()));
        if let Some((previous_id, previous_token)) = previous {
            tracing::debug!(fingerprint = %key, previous_id, "Cancelling superseded request");
            previous_token.cancel();
        }

        PendingHandle {
            key,
            id,
            token,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Remove a registration.
    ///
    /// A newer registration under the same key is left in place.
    pub fn resolve(&self, handle: &PendingHandle) {
        remove_if_owned(&self.entries, &handle.key, handle.id);
    }

    /// Cancel and remove the request registered under `key`.
    ///
    /// Returns `true` if one was pending.
    pub fn cancel_if_pending(&self, key: &RequestFingerprint) -> bool {
        match self.entries.lock().remove(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending request.
    pub fn cancel_all(&self) {
        for (_, (_, token)) in self.entries.lock().drain() {
            token.cancel();
        }
    }

    /// Number of requests in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Check if `key` is in flight.
    pub fn is_pending(&self, key: &RequestFingerprint) -> bool {
        self.entries.lock().contains_key(key)
    }
}

fn remove_if_owned(entries: &Mutex<Entries>, key: &RequestFingerprint, id: u64) {
    let mut entries = entries.lock();
    if entries.get(key).is_some_and(|(owner, _)| *owner == id) {
        entries.remove(key);
    }
}

/// A registration in [`PendingRequests`].
///
/// Dropping the handle resolves the registration.
pub struct PendingHandle {
    key: RequestFingerprint,
    id: u64,
    token: CancellationToken,
    entries: std::sync::Weak<Mutex<Entries>>,
}

impl PendingHandle {
    /// Fingerprint this handle was registered under.
    pub fn key(&self) -> &RequestFingerprint {
        &self.key
    }

    /// Token cancelled when a newer duplicate is registered.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Check if this request was superseded.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            remove_if_owned(&entries, &self.key, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(url: &str) -> RequestFingerprint {
        RequestFingerprint::new("GET", url, None, None)
    }

    #[test]
    fn test_fingerprint_ignores_timestamp() {
        let a = RequestFingerprint::new("GET", "/demo", Some(&json!({"q": 1, "_t": 1})), None);
        let b = RequestFingerprint::new("GET", "/demo", Some(&json!({"q": 1, "_t": 2})), None);
        assert_eq!(a, b);

        let c = RequestFingerprint::new("GET", "/demo", Some(&json!({"q": 2})), None);
        assert_ne!(a, c);
        let d = RequestFingerprint::new("POST", "/demo", Some(&json!({"q": 1})), None);
        assert_ne!(a, d);
    }

    #[test]
    fn test_register_supersedes_duplicate() {
        let pending = PendingRequests::new();
        let first = pending.register(key("/a"));
        let second = pending.register(key("/a"));

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_resolve_old_handle_keeps_newer() {
        let pending = PendingRequests::new();
        let first = pending.register(key("/a"));
        let second = pending.register(key("/a"));

        pending.resolve(&first);
        assert!(pending.is_pending(second.key()));

        pending.resolve(&second);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_drop_resolves() {
        let pending = PendingRequests::new();
        {
            let _a = pending.register(key("/a"));
            let _b = pending.register(key("/b"));
            assert_eq!(pending.len(), 2);
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn test_cancel_if_pending() {
        let pending = PendingRequests::new();
        let handle = pending.register(key("/a"));

        assert!(pending.cancel_if_pending(&key("/a")));
        assert!(handle.is_cancelled());
        assert!(!pending.cancel_if_pending(&key("/a")));
    }

    #[test]
    fn test_cancel_all() {
        let pending = PendingRequests::new();
        let a = pending.register(key("/a"));
        let b = pending.register(key("/b"));
        pending.cancel_all();
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(pending.is_empty());
    }
}
