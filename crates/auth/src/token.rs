use std::fmt;

use {
    chrono::{DateTime, Utc},
    secrecy::{ExposeSecret, Secret},
    url::Url,
};

/// Name of the session cookie issued by Scalar-Web devices.
pub const AUTH_COOKIE_NAME: &str = "auth";

/// Network host of a device's control endpoint (no scheme, no port).
///
/// Keys compare as exact strings: `tv.local` and `192.168.1.20` are two
/// separate sessions even when they reach the same set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey(String);

impl HostKey {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    /// Host portion of `url`, or `None` for host-less URLs (`file:`, `data:`).
    pub fn from_url(url: &Url) -> Option<Self> {
        url.host_str()
            .filter(|h| !h.is_empty())
            .map(|h| Self(h.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        Self::new(host)
    }
}

/// The session cookie for one host: value, optional expiry, and origin.
///
/// Immutable once built. An empty value means "unauthenticated" and always
/// needs renewal, whatever the expiry says.
#[derive(Clone)]
pub struct AuthToken {
    value: Secret<String>,
    expires_at: Option<DateTime<Utc>>,
    host: HostKey,
}

impl AuthToken {
    pub fn new(host: HostKey, value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: Secret::new(value.into()),
            expires_at,
            host,
        }
    }

    /// The "no token" sentinel for `host`.
    pub fn empty(host: HostKey) -> Self {
        Self::new(host, String::new(), None)
    }

    pub fn value(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn host(&self) -> &HostKey {
        &self.host
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// Expiry is exclusive: a token expiring exactly at `now` is expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn needs_renewal_at(&self, now: DateTime<Utc>) -> bool {
        self.is_empty() || self.is_expired_at(now)
    }

    pub fn needs_renewal(&self) -> bool {
        self.needs_renewal_at(Utc::now())
    }

    /// `auth=<value>`, the form sent in a `Cookie` header. Empty tokens
    /// serialize as `auth=`.
    pub fn cookie_pair(&self) -> String {
        format!("{AUTH_COOKIE_NAME}={}", self.value.expose_secret())
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.expires_at == other.expires_at
            && self.value.expose_secret() == other.value.expose_secret()
    }
}

impl Eq for AuthToken {}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("host", &self.host)
            .field(
                "value",
                &if self.is_empty() {
                    "<empty>"
                } else {
                    "[REDACTED]"
                },
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
