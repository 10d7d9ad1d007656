use scalarweb_common::Interrupted;

use crate::token::HostKey;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid device address \"{address}\": {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("unknown scalar web service \"{0}\"")]
    UnknownService(String),

    #[error("device call was cancelled")]
    Cancelled(#[from] Interrupted),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why an `actRegister` handshake did not produce a session.
///
/// A device that answers but grants no cookie is not an error; registrars
/// return [`AuthToken::empty`](crate::AuthToken::empty) for that case.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistrationError {
    /// The host could not be reached at all (refused, no route).
    #[error("device {host} is unreachable: {message}")]
    ConnectionFailed { host: HostKey, message: String },

    /// The device was reached but the handshake failed (status, body, timeout).
    #[error("registration with {host} failed: {message}")]
    RegistrationFailed { host: HostKey, message: String },
}

impl RegistrationError {
    #[must_use]
    pub fn connection_failed(host: &HostKey, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            host: host.clone(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn registration_failed(host: &HostKey, message: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            host: host.clone(),
            message: message.into(),
        }
    }

    /// `true` for failures that permanently stop renewal on an interceptor.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection",
            Self::RegistrationFailed { .. } => "registration",
        }
    }
}
