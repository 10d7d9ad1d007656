//! Authenticated HTTP pipeline for device calls.

use std::{sync::Arc, time::Duration};

use {
    scalarweb_common::{CancellationToken, check_interrupt, run_until_cancelled},
    scalarweb_config::{AccessCode, DeviceConfig, HttpConfig, RegistrationConfig},
    serde_json::{Value, json},
    tracing::{debug, warn},
    url::Url,
};

#[cfg(feature = "metrics")]
use scalarweb_metrics::{counter, device as device_metrics, histogram, labels};

use crate::{
    cache::CredentialCache,
    error::{Error, Result},
    interceptor::AuthInterceptor,
    registration::ActRegisterClient,
    service::{AutoAuthPolicy, ScalarWebService, service_url},
    token::HostKey,
};

/// Request id for JSON-RPC calls issued through [`AuthClient::call`].
const CALL_ID: u64 = 1;

/// A `reqwest::Client` bound to one device, with its session hooks wrapped
/// around every call.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base: Url,
    interceptor: Arc<AuthInterceptor>,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, base: Url, interceptor: Arc<AuthInterceptor>) -> Self {
        Self {
            http,
            base,
            interceptor,
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn interceptor(&self) -> &AuthInterceptor {
        &self.interceptor
    }

    pub fn service_url(&self, service: ScalarWebService) -> Url {
        service_url(&self.base, service)
    }

    /// Send `request` through the session hooks.
    ///
    /// Only transport errors surface here. Renewal problems are logged by the
    /// interceptor and the call goes out with whatever cookie is cached.
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        self.interceptor.before_send(&mut request).await;

        #[cfg(feature = "metrics")]
        let service_label = ScalarWebService::from_url(request.url())
            .map_or("other", ScalarWebService::as_str);
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        debug!(host = %self.interceptor.host(), method = %request.method(), url = %request.url(), "sending device call");
        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(device_metrics::CALL_ERRORS_TOTAL, labels::SERVICE => service_label)
                    .increment(1);
                warn!(host = %self.interceptor.host(), error = %e, "device call failed");
                return Err(e.into());
            },
        };

        #[cfg(feature = "metrics")]
        {
            counter!(
                device_metrics::CALLS_TOTAL,
                labels::SERVICE => service_label,
                labels::STATUS => response.status().as_u16().to_string()
            )
            .increment(1);
            histogram!(device_metrics::CALL_DURATION_SECONDS, labels::SERVICE => service_label)
                .record(started.elapsed().as_secs_f64());
        }

        self.interceptor.after_receive(response.headers());
        Ok(response)
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`Error::Cancelled`] once `cancel` fires. The in-flight request
    /// (renewal included) is dropped.
    pub async fn execute_cancellable(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        check_interrupt(cancel)?;
        run_until_cancelled(cancel, self.execute(request)).await?
    }

    /// POST `body` as JSON to `service`.
    pub async fn post_json(
        &self,
        service: ScalarWebService,
        body: &Value,
    ) -> Result<reqwest::Response> {
        let request = self
            .http
            .post(self.service_url(service))
            .json(body)
            .build()?;
        self.execute(request).await
    }

    /// Issue a Scalar-Web JSON-RPC call and return the decoded response body.
    ///
    /// Non-2xx answers are errors carrying the status and body text. A 2xx
    /// body with an `error` member is returned as is; interpreting device
    /// error codes is up to the caller.
    pub async fn call(
        &self,
        service: ScalarWebService,
        method: &str,
        version: &str,
        params: Vec<Value>,
    ) -> Result<Value> {
        let body = json!({
            "method": method,
            "id": CALL_ID,
            "params": params,
            "version": version,
        });
        let response = self.post_json(service, &body).await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::message(format!(
                "{service}.{method} answered HTTP {status}: {text}"
            )));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Assembles [`AuthClient`]s that share one transport and one
/// [`CredentialCache`].
#[derive(Debug, Clone)]
pub struct AuthClientFactory {
    http: reqwest::Client,
    cache: CredentialCache,
    registration: RegistrationConfig,
}

impl AuthClientFactory {
    /// Build the shared transport. The timeout covers every call, the
    /// handshake included.
    pub fn new(http: &HttpConfig, registration: RegistrationConfig) -> Result<Self> {
        if http.timeout_secs == 0 {
            return Err(Error::message(
                "http.timeout_secs must be at least 1; every call would time out",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()?;
        Ok(Self::with_client(
            client,
            CredentialCache::new(),
            registration,
        ))
    }

    pub fn with_client(
        http: reqwest::Client,
        cache: CredentialCache,
        registration: RegistrationConfig,
    ) -> Self {
        Self {
            http,
            cache,
            registration,
        }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Handshake client for a device, with its PIN applied.
    pub fn registrar(&self, device: &DeviceConfig) -> Result<ActRegisterClient> {
        let base = parse_address(&device.address)?;
        let registrar = ActRegisterClient::new(self.http.clone(), &base, &self.registration)?;
        Ok(match device.access_code() {
            Some(AccessCode::Pin(pin)) => registrar.with_pin(pin),
            _ => registrar,
        })
    }

    /// Build the authenticated client for `device`.
    pub fn build(&self, device: &DeviceConfig) -> Result<AuthClient> {
        let base = parse_address(&device.address)?;
        let host = HostKey::from_url(&base)
            .ok_or_else(|| Error::invalid_address(&device.address, "address has no host"))?;
        let policy = auto_auth_policy(device)?;
        let registrar = self.registrar(device)?;

        let mut interceptor = AuthInterceptor::new(
            host.clone(),
            self.cache.clone(),
            Arc::new(registrar),
            move |request: &reqwest::Request| policy.allows_url(request.url()),
        );
        if let Some(AccessCode::PreSharedKey(key)) = device.access_code() {
            interceptor = interceptor.with_pre_shared_key(key);
        }

        debug!(device = %device.name, host = %host, ?policy, "built device client");
        Ok(AuthClient::new(self.http.clone(), base, Arc::new(interceptor)))
    }
}

fn parse_address(address: &str) -> Result<Url> {
    let url = Url::parse(address).map_err(|e| Error::invalid_address(address, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::invalid_address(
            address,
            format!("unsupported scheme \"{other}\""),
        )),
    }
}

fn auto_auth_policy(device: &DeviceConfig) -> Result<AutoAuthPolicy> {
    if !device.auto_auth_enabled() {
        return Ok(AutoAuthPolicy::never());
    }
    match &device.auto_auth_services {
        Some(names) => AutoAuthPolicy::from_names(names),
        None => Ok(AutoAuthPolicy::always()),
    }
}
