//! The `actRegister` handshake that obtains a session cookie.

use {
    async_trait::async_trait,
    scalarweb_config::RegistrationConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::{Value, json},
    tracing::{debug, info},
    url::Url,
};

#[cfg(feature = "metrics")]
use scalarweb_metrics::{auth as auth_metrics, histogram, labels};

use crate::{
    cookie::auth_cookie_from_headers,
    error::{Error, RegistrationError, Result},
    service::{ScalarWebService, service_url},
    token::{AuthToken, HostKey},
};

/// Request id used for the handshake envelope; devices echo it back.
const ACT_REGISTER_ID: u64 = 8;

/// Performs the device handshake for one host.
///
/// `Ok` with an empty token means the device answered but granted no
/// session (it does not require pairing).
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self) -> std::result::Result<AuthToken, RegistrationError>;
}

/// Build the fixed JSON-RPC envelope for `actRegister`.
pub fn act_register_payload(cfg: &RegistrationConfig) -> Value {
    json!({
        "method": "actRegister",
        "version": "1.0",
        "id": ACT_REGISTER_ID,
        "params": [
            {
                "clientid": cfg.client_id,
                "nickname": cfg.nickname,
                "level": cfg.level,
            },
            [
                {
                    "function": "WOL",
                    "value": if cfg.wake_on_lan { "yes" } else { "no" },
                }
            ]
        ],
    })
}

/// [`Registrar`] that POSTs `actRegister` to the device's `accessControl`
/// service over HTTP.
pub struct ActRegisterClient {
    client: reqwest::Client,
    endpoint: Url,
    host: HostKey,
    payload: Value,
    pin: Option<Secret<String>>,
}

impl ActRegisterClient {
    /// `base` is the device address; only its scheme, host and port are used.
    pub fn new(
        client: reqwest::Client,
        base: &Url,
        registration: &RegistrationConfig,
    ) -> Result<Self> {
        let host = HostKey::from_url(base)
            .ok_or_else(|| Error::invalid_address(base.as_str(), "address has no host"))?;
        Ok(Self {
            client,
            endpoint: service_url(base, ScalarWebService::AccessControl),
            host,
            payload: act_register_payload(registration),
            pin: None,
        })
    }

    /// Send the on-screen PIN as basic auth (empty user name).
    #[must_use]
    pub fn with_pin(mut self, pin: Secret<String>) -> Self {
        self.pin = Some(pin);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn host(&self) -> &HostKey {
        &self.host
    }

    fn classify(&self, err: &reqwest::Error) -> RegistrationError {
        // A connect *timeout* is not a refusal; only hard connect errors latch.
        if err.is_connect() && !err.is_timeout() {
            RegistrationError::connection_failed(&self.host, err.to_string())
        } else {
            RegistrationError::registration_failed(&self.host, err.to_string())
        }
    }

    async fn handshake(&self) -> std::result::Result<AuthToken, RegistrationError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&self.payload);
        if let Some(pin) = &self.pin {
            request = request.basic_auth("", Some(pin.expose_secret()));
        }

        let response = request.send().await.map_err(|e| self.classify(&e))?;
        let status = response.status();
        let cookie = auth_cookie_from_headers(response.headers(), &self.host);

        if !status.is_success() {
            return Err(RegistrationError::registration_failed(
                &self.host,
                format!("accessControl answered HTTP {status}"),
            ));
        }

        let body = response.text().await.map_err(|e| self.classify(&e))?;
        check_envelope(&self.host, &body)?;

        match cookie {
            Some(token) => {
                info!(host = %self.host, expires_at = ?token.expires_at(), "device granted auth cookie");
                Ok(token)
            },
            None => {
                debug!(host = %self.host, "device accepted actRegister without a cookie");
                Ok(AuthToken::empty(self.host.clone()))
            },
        }
    }
}

#[async_trait]
impl Registrar for ActRegisterClient {
    async fn register(&self) -> std::result::Result<AuthToken, RegistrationError> {
        debug!(host = %self.host, endpoint = %self.endpoint, "sending actRegister");

        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = self.handshake().await;

        #[cfg(feature = "metrics")]
        histogram!(auth_metrics::RENEWAL_DURATION_SECONDS, labels::HOST => self.host.to_string())
            .record(started.elapsed().as_secs_f64());

        result
    }
}

/// Reject JSON-RPC error envelopes and unparseable bodies. An empty body is
/// accepted; some firmware answers the handshake with headers only.
fn check_envelope(host: &HostKey, body: &str) -> std::result::Result<(), RegistrationError> {
    if body.trim().is_empty() {
        return Ok(());
    }

    let envelope: Value = serde_json::from_str(body).map_err(|e| {
        RegistrationError::registration_failed(host, format!("malformed actRegister response: {e}"))
    })?;

    match envelope.get("error") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(parts)) => {
            let code = parts.first().and_then(Value::as_i64).unwrap_or_default();
            let message = parts.get(1).and_then(Value::as_str).unwrap_or("unknown error");
            Err(RegistrationError::registration_failed(
                host,
                format!("device error {code}: {message}"),
            ))
        },
        Some(other) => Err(RegistrationError::registration_failed(
            host,
            format!("device error: {other}"),
        )),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {mockito::Matcher, std::net::TcpListener};

    use super::*;

    fn registrar_for(server_url: &str) -> ActRegisterClient {
        let base = Url::parse(server_url).unwrap();
        ActRegisterClient::new(reqwest::Client::new(), &base, &RegistrationConfig::default())
            .unwrap()
    }

    #[test]
    fn payload_shape() {
        let payload = act_register_payload(&RegistrationConfig::default());
        assert_eq!(payload["method"], "actRegister");
        assert_eq!(payload["version"], "1.0");
        assert_eq!(payload["params"][0]["clientid"], "scalarweb:control-point");
        assert_eq!(payload["params"][0]["level"], "private");
        assert_eq!(payload["params"][1][0]["function"], "WOL");
        assert_eq!(payload["params"][1][0]["value"], "yes");
    }

    #[test]
    fn endpoint_is_access_control() {
        let registrar = registrar_for("http://tv.local:8080/sony/system");
        assert_eq!(
            registrar.endpoint().as_str(),
            "http://tv.local:8080/sony/accessControl"
        );
        assert_eq!(registrar.host().as_str(), "tv.local");
    }

    #[tokio::test]
    async fn cookie_in_response_becomes_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sony/accessControl")
            .match_body(Matcher::PartialJson(json!({"method": "actRegister"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("set-cookie", "auth=abc; Path=/sony/; Max-Age=1209600")
            .with_body(r#"{"result":[],"id":8}"#)
            .create_async()
            .await;

        let token = registrar_for(&server.url()).register().await.unwrap();
        assert_eq!(token.value(), "abc");
        assert!(token.expires_at().is_some());
        assert!(!token.needs_renewal());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn no_cookie_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/sony/accessControl")
            .with_status(200)
            .with_body(r#"{"result":[],"id":8}"#)
            .create_async()
            .await;

        let token = registrar_for(&server.url()).register().await.unwrap();
        assert!(token.is_empty());
    }

    #[tokio::test]
    async fn http_error_is_registration_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/sony/accessControl")
            .with_status(500)
            .create_async()
            .await;

        let err = registrar_for(&server.url()).register().await.unwrap_err();
        assert!(matches!(err, RegistrationError::RegistrationFailed { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn error_envelope_is_registration_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/sony/accessControl")
            .with_status(200)
            .with_header("set-cookie", "auth=ignored")
            .with_body(r#"{"error":[401,"Unauthorized"],"id":8}"#)
            .create_async()
            .await;

        let err = registrar_for(&server.url()).register().await.unwrap_err();
        assert!(!err.is_connection_failure());
        assert!(err.to_string().contains("401: Unauthorized"));
    }

    #[tokio::test]
    async fn malformed_body_is_registration_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/sony/accessControl")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = registrar_for(&server.url()).register().await.unwrap_err();
        assert!(matches!(err, RegistrationError::RegistrationFailed { .. }));
    }

    #[tokio::test]
    async fn pin_is_sent_as_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        // base64(":1234")
        let mock = server
            .mock("POST", "/sony/accessControl")
            .match_header("authorization", "Basic OjEyMzQ=")
            .with_status(200)
            .with_header("set-cookie", "auth=paired")
            .create_async()
            .await;

        let token = registrar_for(&server.url())
            .with_pin(Secret::new("1234".into()))
            .register()
            .await
            .unwrap();
        assert_eq!(token.value(), "paired");
        assert_eq!(token.expires_at(), None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refused_connection_is_connection_failure() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = registrar_for(&format!("http://127.0.0.1:{port}"))
            .register()
            .await
            .unwrap_err();
        assert!(err.is_connection_failure(), "{err}");
    }

    #[tokio::test]
    async fn timeout_is_retryable_not_a_connection_failure() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let base = Url::parse(&format!("http://{addr}")).unwrap();
        let registrar =
            ActRegisterClient::new(client, &base, &RegistrationConfig::default()).unwrap();

        let err = registrar.register().await.unwrap_err();
        assert!(!err.is_connection_failure(), "{err}");
        assert!(matches!(err, RegistrationError::RegistrationFailed { .. }));

        let interceptor = crate::AuthInterceptor::new(
            HostKey::from_url(&base).unwrap(),
            crate::CredentialCache::new(),
            std::sync::Arc::new(registrar),
            |_| true,
        );
        let mut request = reqwest::Request::new(reqwest::Method::POST, base.clone());
        interceptor.before_send(&mut request).await;
        assert!(!interceptor.renewal_disabled());
        assert_eq!(interceptor.state(), crate::SessionState::Fresh);

        silent.abort();
    }

    #[test]
    fn rejects_hostless_address() {
        let base = Url::parse("data:text/plain,tv").unwrap();
        let result =
            ActRegisterClient::new(reqwest::Client::new(), &base, &RegistrationConfig::default());
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }
}
