use std::sync::Arc;

use {dashmap::DashMap, tracing::debug};

use crate::token::{AuthToken, HostKey};

/// Latest session cookie per device host, shared by every interceptor.
///
/// Cloning yields another handle to the same map. `get`/`set` are atomic per
/// key and never block on I/O; the last `set` for a host wins. Entries are
/// never evicted.
#[derive(Clone, Default)]
pub struct CredentialCache {
    entries: Arc<DashMap<HostKey, AuthToken>>,
}

impl CredentialCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token for `host`, or the empty sentinel when none is known.
    pub fn get(&self, host: &HostKey) -> AuthToken {
        self.entries
            .get(host)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| AuthToken::empty(host.clone()))
    }

    /// Insert or overwrite the token for `host`.
    pub fn set(&self, host: &HostKey, token: AuthToken) {
        debug!(
            host = %host,
            empty = token.is_empty(),
            expires_at = ?token.expires_at(),
            "storing auth cookie"
        );
        self.entries.insert(host.clone(), token);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when both handles point at the same underlying map.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("hosts", &self.entries.len())
            .finish()
    }
}
