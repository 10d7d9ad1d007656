//! Scalar-Web service names, endpoint resolution, and the per-service
//! auto-auth table.

use std::{fmt, str::FromStr};

use url::Url;

use crate::error::Error;

/// Services exposed under `/sony/<name>` on Scalar-Web devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarWebService {
    AccessControl,
    AppControl,
    Audio,
    AvContent,
    Browser,
    Cec,
    ContentShare,
    Encryption,
    Guide,
    Illumination,
    Notification,
    Recording,
    System,
    VideoScreen,
}

impl ScalarWebService {
    pub const ALL: [Self; 14] = [
        Self::AccessControl,
        Self::AppControl,
        Self::Audio,
        Self::AvContent,
        Self::Browser,
        Self::Cec,
        Self::ContentShare,
        Self::Encryption,
        Self::Guide,
        Self::Illumination,
        Self::Notification,
        Self::Recording,
        Self::System,
        Self::VideoScreen,
    ];

    /// Wire name, as it appears in the endpoint path.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessControl => "accessControl",
            Self::AppControl => "appControl",
            Self::Audio => "audio",
            Self::AvContent => "avContent",
            Self::Browser => "browser",
            Self::Cec => "cec",
            Self::ContentShare => "contentshare",
            Self::Encryption => "encryption",
            Self::Guide => "guide",
            Self::Illumination => "illumination",
            Self::Notification => "notification",
            Self::Recording => "recording",
            Self::System => "system",
            Self::VideoScreen => "videoScreen",
        }
    }

    /// Service addressed by `url`, judged by its last non-empty path segment.
    pub fn from_url(url: &Url) -> Option<Self> {
        url.path_segments()?
            .rev()
            .find(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ScalarWebService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarWebService {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|svc| svc.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownService(s.to_string()))
    }
}

/// Endpoint for `service` on the device at `base`:
/// `scheme://host[:port]/sony/<service>`. Any path, query or fragment on
/// `base` is discarded.
pub fn service_url(base: &Url, service: ScalarWebService) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("/sony/{}", service.as_str()));
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Which calls may trigger the actRegister handshake, as a lookup table
/// indexed by service. Calls whose URL names no known service use
/// `fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoAuthPolicy {
    table: [bool; ScalarWebService::ALL.len()],
    fallback: bool,
}

impl AutoAuthPolicy {
    /// Every call may renew the session.
    #[must_use]
    pub fn always() -> Self {
        Self {
            table: [true; ScalarWebService::ALL.len()],
            fallback: true,
        }
    }

    /// No call renews the session (pre-shared-key devices).
    #[must_use]
    pub fn never() -> Self {
        Self {
            table: [false; ScalarWebService::ALL.len()],
            fallback: false,
        }
    }

    /// Only calls to `services` renew the session.
    #[must_use]
    pub fn only(services: impl IntoIterator<Item = ScalarWebService>) -> Self {
        let mut policy = Self::never();
        for service in services {
            policy.table[service.index()] = true;
        }
        policy
    }

    /// Parse service names from config; unknown names are an error.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, Error> {
        let services = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<ScalarWebService>, _>>()?;
        Ok(Self::only(services))
    }

    #[must_use]
    pub fn allows(&self, service: Option<ScalarWebService>) -> bool {
        service.map_or(self.fallback, |s| self.table[s.index()])
    }

    #[must_use]
    pub fn allows_url(&self, url: &Url) -> bool {
        self.allows(ScalarWebService::from_url(url))
    }
}

impl Default for AutoAuthPolicy {
    fn default() -> Self {
        Self::always()
    }
}
