//! Configuration validation.
//!
//! Checks device entries for problems the parser cannot see: unreachable
//! addresses, duplicate names, and contradictory auth settings.

use std::collections::HashSet;

use url::Url;

use crate::schema::{AccessCode, ScalarWebConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "address", "duplicate", "auth", "http"
    pub category: &'static str,
    /// Dotted path, e.g. "devices[0].address"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: String,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path,
            message: message.into(),
        });
    }
}

/// Validate a parsed configuration.
#[must_use]
pub fn validate(config: &ScalarWebConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.http.timeout_secs == 0 {
        result.push(
            Severity::Error,
            "http",
            "http.timeout_secs".into(),
            "timeout must be at least one second",
        );
    }

    if config.devices.is_empty() {
        result.push(
            Severity::Info,
            "devices",
            "devices".into(),
            "no devices configured",
        );
    }

    let mut seen = HashSet::new();
    for (idx, device) in config.devices.iter().enumerate() {
        let base = format!("devices[{idx}]");

        if device.name.trim().is_empty() {
            result.push(
                Severity::Error,
                "duplicate",
                format!("{base}.name"),
                "device name must not be empty",
            );
        } else if !seen.insert(device.name.as_str()) {
            result.push(
                Severity::Error,
                "duplicate",
                format!("{base}.name"),
                format!("device name \"{}\" is used more than once", device.name),
            );
        }

        match Url::parse(&device.address) {
            Ok(url) if url.host_str().is_none_or(str::is_empty) => result.push(
                Severity::Error,
                "address",
                format!("{base}.address"),
                "address has no host",
            ),
            Ok(url) if !matches!(url.scheme(), "http" | "https") => result.push(
                Severity::Error,
                "address",
                format!("{base}.address"),
                format!("unsupported scheme \"{}\"", url.scheme()),
            ),
            Ok(_) => {},
            Err(e) => result.push(
                Severity::Error,
                "address",
                format!("{base}.address"),
                format!("invalid address \"{}\": {e}", device.address),
            ),
        }

        if matches!(device.access_code(), Some(AccessCode::PreSharedKey(_)))
            && device.auto_auth == Some(true)
        {
            result.push(
                Severity::Warning,
                "auth",
                format!("{base}.auto_auth"),
                "pre-shared key devices do not issue auth cookies; the handshake will be wasted",
            );
        }

        if device
            .auto_auth_services
            .as_ref()
            .is_some_and(|services| services.is_empty())
        {
            result.push(
                Severity::Warning,
                "auth",
                format!("{base}.auto_auth_services"),
                "empty service list disables the handshake for every call",
            );
        }
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use secrecy::Secret;

    use super::*;
    use crate::schema::DeviceConfig;

    fn device(name: &str, address: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_config_is_informational_only() {
        let result = validate(&ScalarWebConfig::default());
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Info), 1);
    }

    #[test]
    fn flags_bad_addresses_and_duplicates() {
        let cfg = ScalarWebConfig {
            devices: vec![
                device("tv", "http://tv.local"),
                device("tv", "not a url"),
                device("den", "ftp://den.local"),
            ],
            ..Default::default()
        };
        let result = validate(&cfg);
        let paths: Vec<_> = result.diagnostics.iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"devices[1].name"));
        assert!(paths.contains(&"devices[1].address"));
        assert!(paths.contains(&"devices[2].address"));
        assert_eq!(result.count(Severity::Error), 3);
    }

    #[test]
    fn zero_timeout_is_an_error() {
        let mut cfg = ScalarWebConfig {
            devices: vec![device("tv", "http://tv.local")],
            ..Default::default()
        };
        cfg.http.timeout_secs = 0;
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "http");
    }

    #[test]
    fn warns_on_psk_with_forced_handshake() {
        let mut tv = device("tv", "http://tv.local");
        tv.access_code = Some(Secret::new("my-psk".into()));
        tv.auto_auth = Some(true);
        let result = validate(&ScalarWebConfig {
            devices: vec![tv],
            ..Default::default()
        });
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
        assert_eq!(result.diagnostics[0].path, "devices[0].auto_auth");
    }
}
