//! Config schema types (transport, registration payload, devices).

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalarWebConfig {
    pub http: HttpConfig,
    pub registration: RegistrationConfig,
    pub metrics: MetricsConfig,
    pub devices: Vec<DeviceConfig>,
}

impl ScalarWebConfig {
    /// Look up a device by its configured name (exact match).
    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }
}

/// Transport settings shared by every device call, the handshake included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// The fixed actRegister payload sent to `accessControl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Identifier the device lists under "registered devices".
    pub client_id: String,
    /// Human readable name shown on the TV during pairing.
    pub nickname: String,
    /// Registration level; devices only accept `private` today.
    pub level: String,
    /// Ask the device to keep Wake-on-LAN enabled for this client.
    #[serde(default = "default_true")]
    pub wake_on_lan: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            client_id: "scalarweb:control-point".into(),
            nickname: "scalarweb".into(),
            level: "private".into(),
            wake_on_lan: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

/// A single controlled device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    /// Base URL of the device, e.g. `http://192.168.1.20`.
    pub address: String,
    /// `RQST`, a four digit PIN, or a pre-shared key.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_code: Option<Secret<String>>,
    /// Forces the handshake on or off; derived from the access code when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_auth: Option<bool>,
    /// Restrict the handshake to calls against these services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_auth_services: Option<Vec<String>>,
}

impl DeviceConfig {
    pub fn access_code(&self) -> Option<AccessCode> {
        self.access_code
            .as_ref()
            .and_then(|s| AccessCode::parse(s.expose_secret()))
    }

    /// Whether calls to this device may trigger the actRegister handshake.
    ///
    /// An explicit `auto_auth` wins; otherwise pre-shared-key devices skip it
    /// because they authenticate by header.
    pub fn auto_auth_enabled(&self) -> bool {
        self.auto_auth
            .unwrap_or_else(|| !matches!(self.access_code(), Some(AccessCode::PreSharedKey(_))))
    }
}

/// How a device expects to be authenticated.
#[derive(Clone)]
pub enum AccessCode {
    /// `RQST`: ask the device to show a pairing PIN.
    Request,
    /// Four digit PIN shown on screen, sent as basic auth on the handshake.
    Pin(Secret<String>),
    /// Pre-shared key sent as `X-Auth-PSK` on every call.
    PreSharedKey(Secret<String>),
}

impl AccessCode {
    pub const REQUEST: &'static str = "RQST";

    /// Classify a raw access code. Blank input means "none configured".
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim();
        if code.is_empty() {
            return None;
        }
        if code.eq_ignore_ascii_case(Self::REQUEST) {
            return Some(Self::Request);
        }
        if code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Self::Pin(Secret::new(code.to_string())));
        }
        Some(Self::PreSharedKey(Secret::new(code.to_string())))
    }
}

impl std::fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "Request"),
            Self::Pin(_) => write!(f, "Pin([REDACTED])"),
            Self::PreSharedKey(_) => write!(f, "PreSharedKey([REDACTED])"),
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
