//! Metric name and label definitions.
//!
//! All metric names emitted by scalarweb crates live here so dashboards have a
//! single list to read from.

/// Device session (auth cookie) metrics
pub mod auth {
    /// Handshake (actRegister) calls issued to renew a session cookie
    pub const RENEWALS_TOTAL: &str = "scalarweb_auth_renewals_total";
    /// Handshake calls that failed, labelled by `kind` (`connection` / `registration`)
    pub const RENEWAL_FAILURES_TOTAL: &str = "scalarweb_auth_renewal_failures_total";
    /// Handshakes the device accepted without issuing a cookie
    pub const SESSIONS_NOT_GRANTED_TOTAL: &str = "scalarweb_auth_sessions_not_granted_total";
    /// Fresh `auth` cookies learned from ordinary responses
    pub const COOKIES_CAPTURED_TOTAL: &str = "scalarweb_auth_cookies_captured_total";
    /// Interceptors that permanently stopped renewing after a connection failure
    pub const RENEWAL_DISABLED_TOTAL: &str = "scalarweb_auth_renewal_disabled_total";
    /// Handshake duration in seconds
    pub const RENEWAL_DURATION_SECONDS: &str = "scalarweb_auth_renewal_duration_seconds";
}

/// Outgoing device call metrics
pub mod device {
    /// Calls dispatched through an authenticated client
    pub const CALLS_TOTAL: &str = "scalarweb_device_calls_total";
    /// Calls that failed at the transport level
    pub const CALL_ERRORS_TOTAL: &str = "scalarweb_device_call_errors_total";
    /// Call duration in seconds
    pub const CALL_DURATION_SECONDS: &str = "scalarweb_device_call_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const HOST: &str = "host";
    pub const SERVICE: &str = "service";
    pub const KIND: &str = "kind";
    pub const STATUS: &str = "status";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Device call duration buckets (in seconds)
    /// Covers 5ms to 30s; TVs in standby answer slowly
    pub static DEVICE_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            auth::RENEWALS_TOTAL,
            auth::RENEWAL_FAILURES_TOTAL,
            auth::SESSIONS_NOT_GRANTED_TOTAL,
            auth::COOKIES_CAPTURED_TOTAL,
            auth::RENEWAL_DISABLED_TOTAL,
            auth::RENEWAL_DURATION_SECONDS,
            device::CALLS_TOTAL,
            device::CALL_ERRORS_TOTAL,
            device::CALL_DURATION_SECONDS,
        ] {
            assert!(name.starts_with("scalarweb_"), "{name}");
        }
    }

    #[test]
    fn duration_buckets_are_sorted() {
        assert!(buckets::DEVICE_DURATION.windows(2).all(|w| w[0] < w[1]));
    }
}
