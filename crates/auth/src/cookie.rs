//! Picks the device session cookie out of `Set-Cookie` headers.
//!
//! `Max-Age` wins over `Expires` when a header carries both.

use {
    chrono::{DateTime, Duration, Utc},
    cookie::Cookie,
    reqwest::header::{HeaderMap, SET_COOKIE},
    tracing::debug,
};

use crate::token::{AUTH_COOKIE_NAME, AuthToken, HostKey};

/// One parsed `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Parse a single `Set-Cookie` header value relative to `now`.
///
/// Returns `None` when the header has no `name=value` pair.
pub fn parse_set_cookie(header: &str, now: DateTime<Utc>) -> Option<SetCookie> {
    let parsed = match Cookie::parse(header) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "ignoring malformed Set-Cookie header");
            return None;
        },
    };

    let expires_at = match parsed.max_age().map(|age| age.whole_seconds()) {
        // Non-positive Max-Age expires the cookie immediately.
        Some(secs) if secs <= 0 => Some(now),
        Some(secs) => Some(
            Duration::try_seconds(secs)
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        ),
        None => parsed
            .expires_datetime()
            .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), at.nanosecond())),
    };

    Some(SetCookie {
        name: parsed.name().to_string(),
        value: parsed.value_trimmed().to_string(),
        expires_at,
    })
}

/// Pull the `auth` cookie for `host` out of response headers.
///
/// When a response sets the cookie more than once, the last one wins.
pub fn auth_cookie_from_headers(headers: &HeaderMap, host: &HostKey) -> Option<AuthToken> {
    let now = Utc::now();
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| parse_set_cookie(raw, now))
        .filter(|c| c.name == AUTH_COOKIE_NAME)
        .last()
        .map(|c| AuthToken::new(host.clone(), c.value, c.expires_at))
}
