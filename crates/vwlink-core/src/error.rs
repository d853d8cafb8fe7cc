// ── Core error types ──
//
// User-facing errors from vwlink-core. These wrap lower-level API errors
// and classify them so the synchronization loop can decide whether a
// failure touches one resource, one cycle, or the whole account.

use thiserror::Error;

use crate::model::CapabilityId;

/// Authentication outcome that blocks (or may block) every request on an
/// account.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    #[error("Terms or consent must be accepted on the vendor portal: {message}")]
    ConsentRequired {
        message: String,
        consent_url: Option<String>,
    },

    #[error("Access token expired and could not be renewed")]
    TokenExpired,

    #[error("Identity service unreachable: {message}")]
    Network { message: String },
}

impl AuthError {
    /// Returns `true` if nothing will succeed until the user acts.
    pub fn blocks_account(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. } | Self::ConsentRequired { .. }
        )
    }
}

/// Failures that are expected to clear up on their own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientError {
    #[error("Rate limited by the vendor, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Vendor server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },
}

/// Outcome of fetching one resource.
///
/// `Clone` because a single fetch result is handed to every caller that
/// joined the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transient(#[from] TransientError),

    #[error("Resource not found: {path}")]
    NotFound { path: String },

    #[error("Access to resource denied: {message}")]
    Forbidden { message: String },

    #[error("Resource unavailable: {message}")]
    Unavailable { message: String },

    #[error("Malformed vendor response: {message}")]
    Malformed { message: String },

    #[error("Unexpected vendor response: {message}")]
    Unexpected { message: String },
}

/// How far a fetch failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Record against the resource; the rest of the cycle still applies.
    Resource,
    /// End the cycle without applying anything.
    Cycle,
    /// Pause every loop on the account until credentials change.
    Account,
}

impl FetchError {
    pub fn scope(&self) -> FailureScope {
        match self {
            Self::Auth(auth) if auth.blocks_account() => FailureScope::Account,
            Self::Auth(AuthError::TokenExpired) | Self::Malformed { .. } => FailureScope::Cycle,
            _ => FailureScope::Resource,
        }
    }

    /// Vendor back-off hint, if this is a rate limit.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Transient(TransientError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

impl From<vwlink_api::Error> for FetchError {
    fn from(err: vwlink_api::Error) -> Self {
        use vwlink_api::Error as Api;

        match err {
            Api::Authentication { message } => AuthError::InvalidCredentials { message }.into(),
            Api::ConsentRequired {
                message,
                consent_url,
            } => AuthError::ConsentRequired {
                message,
                consent_url,
            }
            .into(),
            Api::TokenRejected => AuthError::TokenExpired.into(),
            Api::RateLimited { retry_after_secs } => {
                TransientError::RateLimited { retry_after_secs }.into()
            }
            Api::Timeout { timeout_secs } => TransientError::Timeout { timeout_secs }.into(),
            Api::Server { status, message } => TransientError::Server { status, message }.into(),
            Api::Transport(e) => TransientError::Network {
                message: e.to_string(),
            }
            .into(),
            Api::Forbidden { message } => Self::Forbidden { message },
            Api::NotFound { path } => Self::NotFound { path },
            Api::ResourceUnavailable { message } => Self::Unavailable { message },
            Api::Deserialization { message, .. } => Self::Malformed { message },
            Api::Api { status, message } => Self::Unexpected {
                message: format!("HTTP {status}: {message}"),
            },
            Api::InvalidUrl(e) => Self::Unexpected {
                message: format!("invalid URL: {e}"),
            },
            Api::Tls(message) => Self::Unexpected {
                message: format!("TLS: {message}"),
            },
        }
    }
}

/// Why a remote command did not reach `Succeeded`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Vehicle lacks the {capability} capability")]
    CapabilityMissing { capability: CapabilityId },

    #[error("This command needs the S-PIN, but none is configured")]
    PinRequired,

    #[error("Command precondition not met: {message}")]
    PreconditionFailed { message: String },

    #[error("Invalid command parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Vendor rejected the command: {message}")]
    VendorRejected { message: String },

    #[error("No final outcome after {waited_secs}s")]
    TimedOut { waited_secs: u64 },

    #[error("Connector stopped before the command finished")]
    Cancelled,
}

/// Unified error type for the connector.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(FetchError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Vehicle not found: {vin}")]
    VehicleNotFound { vin: String },

    #[error("Command not found: {id}")]
    CommandNotFound { id: String },

    #[error("Account is paused until credentials or consent are fixed")]
    AccountPaused,

    #[error("Connector is not running")]
    NotRunning,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FetchError> for CoreError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(auth) => Self::Auth(auth),
            other => Self::Fetch(other),
        }
    }
}

impl From<vwlink_api::Error> for CoreError {
    fn from(err: vwlink_api::Error) -> Self {
        FetchError::from(err).into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn consent_and_bad_credentials_block_the_account() {
        let consent: FetchError = vwlink_api::Error::ConsentRequired {
            message: "accept terms".into(),
            consent_url: None,
        }
        .into();
        assert_eq!(consent.scope(), FailureScope::Account);

        let creds: FetchError = vwlink_api::Error::Authentication {
            message: "bad password".into(),
        }
        .into();
        assert_eq!(creds.scope(), FailureScope::Account);
    }

    #[test]
    fn expired_token_and_garbage_end_the_cycle() {
        let expired: FetchError = vwlink_api::Error::TokenRejected.into();
        assert_eq!(expired.scope(), FailureScope::Cycle);

        let garbage: FetchError = vwlink_api::Error::Deserialization {
            message: "expected object".into(),
            body: "<html>".into(),
        }
        .into();
        assert_eq!(garbage.scope(), FailureScope::Cycle);
    }

    #[test]
    fn transient_failures_stay_with_the_resource() {
        let limited: FetchError = vwlink_api::Error::RateLimited {
            retry_after_secs: 120,
        }
        .into();
        assert_eq!(limited.scope(), FailureScope::Resource);
        assert_eq!(limited.retry_after_secs(), Some(120));

        let server: FetchError = vwlink_api::Error::Server {
            status: 503,
            message: String::new(),
        }
        .into();
        assert_eq!(server.scope(), FailureScope::Resource);
        assert_eq!(server.retry_after_secs(), None);
    }

    #[test]
    fn core_error_lifts_auth_failures() {
        let err: CoreError = vwlink_api::Error::TokenRejected.into();
        assert!(matches!(err, CoreError::Auth(AuthError::TokenExpired)));

        let err: CoreError = vwlink_api::Error::NotFound {
            path: "/x".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Fetch(FetchError::NotFound { .. })));
    }
}
