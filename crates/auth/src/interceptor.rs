//! Per-device hooks that attach the session cookie to outgoing calls and
//! learn fresher cookies from responses.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    reqwest::header::{COOKIE, HeaderMap, HeaderValue},
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use scalarweb_metrics::{auth as auth_metrics, counter, labels};

use crate::{
    cache::CredentialCache,
    cookie::auth_cookie_from_headers,
    registration::Registrar,
    token::{AuthToken, HostKey},
};

/// Header carrying the pre-shared key on devices configured for PSK auth.
pub const PSK_HEADER: &str = "x-auth-psk";

/// Decides, per outgoing call, whether a renewal handshake may be attempted.
pub type AutoAuthPredicate = Arc<dyn Fn(&reqwest::Request) -> bool + Send + Sync>;

/// Lifecycle of one interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No call has gone through and no renewal has been attempted.
    Fresh,
    /// A renewal succeeded, or a call completed with a usable cookie.
    Active,
    /// A connection failure latched renewal off. Terminal.
    Disabled,
}

/// Session hooks for a single device host.
///
/// `before_send` renews the cookie when it is empty or expired (unless the
/// predicate declines or renewal has been disabled) and always attaches the
/// cached cookie. `after_receive` stores any `auth` cookie the device sent
/// back. Neither hook ever fails the call.
pub struct AuthInterceptor {
    host: HostKey,
    cache: CredentialCache,
    registrar: Arc<dyn Registrar>,
    auto_auth: AutoAuthPredicate,
    pre_shared_key: Option<Secret<String>>,
    renewal_disabled: AtomicBool,
    active: AtomicBool,
}

impl AuthInterceptor {
    pub fn new(
        host: HostKey,
        cache: CredentialCache,
        registrar: Arc<dyn Registrar>,
        auto_auth: impl Fn(&reqwest::Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            host,
            cache,
            registrar,
            auto_auth: Arc::new(auto_auth),
            pre_shared_key: None,
            renewal_disabled: AtomicBool::new(false),
            active: AtomicBool::new(false),
        }
    }

    /// Send `key` as `X-Auth-PSK` on every call.
    #[must_use]
    pub fn with_pre_shared_key(mut self, key: Secret<String>) -> Self {
        self.pre_shared_key = Some(key);
        self
    }

    pub fn host(&self) -> &HostKey {
        &self.host
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub fn renewal_disabled(&self) -> bool {
        self.renewal_disabled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        if self.renewal_disabled() {
            SessionState::Disabled
        } else if self.active.load(Ordering::Acquire) {
            SessionState::Active
        } else {
            SessionState::Fresh
        }
    }

    /// Pre-call hook: renew if needed, then decorate `request`.
    pub async fn before_send(&self, request: &mut reqwest::Request) {
        let token = self.cache.get(&self.host);

        if !token.needs_renewal() {
            self.mark_active();
        } else if self.renewal_disabled() {
            debug!(host = %self.host, "renewal disabled, sending cached cookie as is");
        } else if !(self.auto_auth)(request) {
            debug!(host = %self.host, url = %request.url(), "auto-auth declined for this call");
        } else {
            self.renew().await;
        }

        // Re-read: a concurrent renewal or response may have landed meanwhile.
        let token = self.cache.get(&self.host);
        self.decorate(request, &token);
    }

    /// Post-call hook: keep any `auth` cookie the device sent, whatever the
    /// status code.
    pub fn after_receive(&self, headers: &HeaderMap) {
        self.mark_active();
        let Some(token) = auth_cookie_from_headers(headers, &self.host) else {
            return;
        };

        debug!(host = %self.host, expires_at = ?token.expires_at(), "device rotated auth cookie");
        #[cfg(feature = "metrics")]
        counter!(auth_metrics::COOKIES_CAPTURED_TOTAL, labels::HOST => self.host.to_string())
            .increment(1);

        self.cache.set(&self.host, token);
    }

    async fn renew(&self) {
        #[cfg(feature = "metrics")]
        counter!(auth_metrics::RENEWALS_TOTAL, labels::HOST => self.host.to_string()).increment(1);

        match self.registrar.register().await {
            Ok(token) if token.is_empty() => {
                debug!(host = %self.host, "no session granted, continuing unauthenticated");
                #[cfg(feature = "metrics")]
                counter!(auth_metrics::SESSIONS_NOT_GRANTED_TOTAL, labels::HOST => self.host.to_string())
                    .increment(1);
                self.mark_active();
            },
            Ok(token) => {
                info!(host = %self.host, expires_at = ?token.expires_at(), "auth cookie renewed");
                self.cache.set(&self.host, token);
                self.mark_active();
            },
            Err(e) if e.is_connection_failure() => {
                #[cfg(feature = "metrics")]
                counter!(
                    auth_metrics::RENEWAL_FAILURES_TOTAL,
                    labels::HOST => self.host.to_string(),
                    labels::KIND => e.kind()
                )
                .increment(1);

                if !self.renewal_disabled.swap(true, Ordering::AcqRel) {
                    warn!(
                        host = %self.host,
                        kind = e.kind(),
                        error = %e,
                        "device unreachable, disabling session renewal"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(auth_metrics::RENEWAL_DISABLED_TOTAL, labels::HOST => self.host.to_string())
                        .increment(1);
                }
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(
                    auth_metrics::RENEWAL_FAILURES_TOTAL,
                    labels::HOST => self.host.to_string(),
                    labels::KIND => e.kind()
                )
                .increment(1);

                warn!(host = %self.host, kind = e.kind(), error = %e, "session renewal failed, will retry");
            },
        }
    }

    fn decorate(&self, request: &mut reqwest::Request, token: &AuthToken) {
        let mut cookie = HeaderValue::from_str(&token.cookie_pair()).unwrap_or_else(|_| {
            warn!(host = %self.host, "cached cookie is not a valid header value, sending it empty");
            HeaderValue::from_static("auth=")
        });
        cookie.set_sensitive(true);
        request.headers_mut().insert(COOKIE, cookie);

        if let Some(key) = &self.pre_shared_key {
            match HeaderValue::from_str(key.expose_secret()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers_mut().insert(PSK_HEADER, value);
                },
                Err(_) => {
                    warn!(host = %self.host, "pre-shared key is not a valid header value, not sent");
                },
            }
        }
    }

    fn mark_active(&self) {
        self.active.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("host", &self.host)
            .field("state", &self.state())
            .field("pre_shared_key", &self.pre_shared_key.is_some())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Mutex, atomic::AtomicUsize},
    };

    use {
        async_trait::async_trait,
        chrono::{Duration, Utc},
        reqwest::{Method, header::SET_COOKIE},
    };

    use {super::*, crate::error::RegistrationError};

    type Outcome = Result<AuthToken, RegistrationError>;

    /// Replays scripted outcomes; repeats the last one when the script runs out.
    struct ScriptedRegistrar {
        script: Mutex<VecDeque<Outcome>>,
        last: Mutex<Option<Outcome>>,
        calls: AtomicUsize,
    }

    impl ScriptedRegistrar {
        fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into_iter().collect()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Registrar for ScriptedRegistrar {
        async fn register(&self) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(outcome) => {
                    *self.last.lock().unwrap() = Some(outcome.clone());
                    outcome
                },
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .expect("registrar script is empty"),
            }
        }
    }

    fn host() -> HostKey {
        HostKey::new("tv.local")
    }

    fn request(path: &str) -> reqwest::Request {
        let url = format!("http://tv.local{path}").parse().unwrap();
        reqwest::Request::new(Method::POST, url)
    }

    fn cookie_header(request: &reqwest::Request) -> &str {
        request.headers().get(COOKIE).unwrap().to_str().unwrap()
    }

    fn interceptor(registrar: Arc<ScriptedRegistrar>) -> AuthInterceptor {
        AuthInterceptor::new(host(), CredentialCache::new(), registrar, |_| true)
    }

    #[tokio::test]
    async fn renews_missing_cookie_and_attaches_it() {
        let token = AuthToken::new(host(), "abc", Some(Utc::now() + Duration::hours(1)));
        let registrar = ScriptedRegistrar::new([Ok(token.clone())]);
        let interceptor = interceptor(registrar.clone());
        assert_eq!(interceptor.state(), SessionState::Fresh);

        let mut req = request("/sony/system");
        interceptor.before_send(&mut req).await;

        assert_eq!(registrar.calls(), 1);
        assert_eq!(cookie_header(&req), "auth=abc");
        assert_eq!(interceptor.cache().get(&host()), token);
        assert_eq!(interceptor.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn valid_cookie_skips_renewal() {
        let registrar = ScriptedRegistrar::new([]);
        let interceptor = interceptor(registrar.clone());
        interceptor
            .cache()
            .set(&host(), AuthToken::new(host(), "abc", None));

        let mut req = request("/sony/system");
        interceptor.before_send(&mut req).await;

        assert_eq!(registrar.calls(), 0);
        assert_eq!(cookie_header(&req), "auth=abc");
        assert_eq!(interceptor.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn expired_cookie_is_renewed() {
        let registrar = ScriptedRegistrar::new([Ok(AuthToken::new(host(), "new", None))]);
        let interceptor = interceptor(registrar.clone());
        interceptor.cache().set(
            &host(),
            AuthToken::new(host(), "old", Some(Utc::now() - Duration::seconds(1))),
        );

        let mut req = request("/sony/system");
        interceptor.before_send(&mut req).await;

        assert_eq!(registrar.calls(), 1);
        assert_eq!(cookie_header(&req), "auth=new");
    }

    #[tokio::test]
    async fn connection_failure_is_sticky() {
        let registrar =
            ScriptedRegistrar::new([Err(RegistrationError::connection_failed(&host(), "refused"))]);
        let interceptor = interceptor(registrar.clone());

        for _ in 0..3 {
            let mut req = request("/sony/system");
            interceptor.before_send(&mut req).await;
            assert_eq!(cookie_header(&req), "auth=");
        }

        assert_eq!(registrar.calls(), 1);
        assert!(interceptor.renewal_disabled());
        assert_eq!(interceptor.state(), SessionState::Disabled);

        // A later response does not leave the terminal state.
        interceptor.after_receive(&HeaderMap::new());
        assert_eq!(interceptor.state(), SessionState::Disabled);
    }

    #[tokio::test]
    async fn registration_failure_is_retried() {
        let registrar = ScriptedRegistrar::new([
            Err(RegistrationError::registration_failed(&host(), "HTTP 500")),
            Ok(AuthToken::new(host(), "abc", None)),
        ]);
        let interceptor = interceptor(registrar.clone());

        let mut first = request("/sony/system");
        interceptor.before_send(&mut first).await;
        assert_eq!(cookie_header(&first), "auth=");
        assert_eq!(interceptor.state(), SessionState::Fresh);

        let mut second = request("/sony/system");
        interceptor.before_send(&mut second).await;
        assert_eq!(cookie_header(&second), "auth=abc");
        assert_eq!(registrar.calls(), 2);
        assert_eq!(interceptor.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn no_session_granted_keeps_trying_on_later_calls() {
        let registrar = ScriptedRegistrar::new([Ok(AuthToken::empty(host()))]);
        let interceptor = interceptor(registrar.clone());

        for _ in 0..2 {
            let mut req = request("/sony/system");
            interceptor.before_send(&mut req).await;
            assert_eq!(cookie_header(&req), "auth=");
        }

        assert_eq!(registrar.calls(), 2);
        assert!(interceptor.cache().is_empty());
        assert_eq!(interceptor.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn predicate_can_veto_renewal() {
        let registrar = ScriptedRegistrar::new([Ok(AuthToken::new(host(), "abc", None))]);
        let interceptor = AuthInterceptor::new(
            host(),
            CredentialCache::new(),
            registrar.clone(),
            |req: &reqwest::Request| req.url().path().ends_with("/system"),
        );

        let mut vetoed = request("/sony/avContent");
        interceptor.before_send(&mut vetoed).await;
        assert_eq!(registrar.calls(), 0);
        assert_eq!(cookie_header(&vetoed), "auth=");

        let mut allowed = request("/sony/system");
        interceptor.before_send(&mut allowed).await;
        assert_eq!(registrar.calls(), 1);
        assert_eq!(cookie_header(&allowed), "auth=abc");
    }

    #[tokio::test]
    async fn pre_shared_key_header_is_attached() {
        let interceptor = AuthInterceptor::new(
            host(),
            CredentialCache::new(),
            ScriptedRegistrar::new([]),
            |_| false,
        )
        .with_pre_shared_key(Secret::new("0000-psk".into()));

        let mut req = request("/sony/system");
        interceptor.before_send(&mut req).await;

        let psk = req.headers().get(PSK_HEADER).unwrap();
        assert_eq!(psk.to_str().unwrap(), "0000-psk");
        assert!(psk.is_sensitive());
        assert!(!format!("{interceptor:?}").contains("0000-psk"));
    }

    #[test]
    fn after_receive_overwrites_cache() {
        let interceptor = interceptor(ScriptedRegistrar::new([]));
        interceptor.cache().set(
            &host(),
            AuthToken::new(host(), "abc", Some(Utc::now() + Duration::hours(1))),
        );

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("auth=def; Path=/sony/"));
        interceptor.after_receive(&headers);

        let cached = interceptor.cache().get(&host());
        assert_eq!(cached.value(), "def");
        assert_eq!(cached.expires_at(), None);
    }

    #[test]
    fn after_receive_without_cookie_leaves_cache_alone() {
        let interceptor = interceptor(ScriptedRegistrar::new([]));
        interceptor
            .cache()
            .set(&host(), AuthToken::new(host(), "abc", None));

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("other=1"));
        interceptor.after_receive(&headers);

        assert_eq!(interceptor.cache().get(&host()).value(), "abc");
        assert_eq!(interceptor.state(), SessionState::Active);
    }
}
