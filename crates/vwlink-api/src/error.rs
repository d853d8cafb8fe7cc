use thiserror::Error;

/// Top-level error type for the `vwlink-api` crate.
///
/// Covers every failure mode at the vendor boundary: authentication,
/// transport, HTTP status semantics, and payload decoding.
/// `vwlink-core` folds these into its fetch and command taxonomies.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong username/password, locked account).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The vendor requires the user to accept new terms or grant consent
    /// in the official app before API access resumes.
    #[error("Consent required: {message}")]
    ConsentRequired {
        message: String,
        consent_url: Option<String>,
    },

    /// The access token was rejected again after a successful renewal.
    #[error("Access token rejected after renewal -- re-authentication required")]
    TokenRejected,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Vendor API ──────────────────────────────────────────────────
    /// Too many requests from this account. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The account is not allowed to read or control this resource.
    #[error("Access denied: {message}")]
    Forbidden { message: String },

    /// Unknown vehicle or endpoint.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// The vendor has no data for this resource right now
    /// (e.g. no parking position while the car is driving).
    #[error("Resource unavailable: {message}")]
    ResourceUnavailable { message: String },

    /// 5xx from the vendor backend.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the user must act out-of-band before retrying.
    pub fn is_consent_required(&self) -> bool {
        matches!(self, Self::ConsentRequired { .. })
    }

    /// Returns `true` if the stored username/password were rejected.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Map a `reqwest` send failure, surfacing timeouts as [`Error::Timeout`].
    pub(crate) fn from_send(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Transport(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(Error::Timeout { timeout_secs: 30 }.is_transient());
        assert!(Error::RateLimited { retry_after_secs: 900 }.is_transient());
        assert!(
            Error::Server {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !Error::ConsentRequired {
                message: "terms".into(),
                consent_url: None
            }
            .is_transient()
        );
        assert!(
            !Error::Authentication {
                message: "bad password".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn auth_predicates_are_disjoint() {
        let consent = Error::ConsentRequired {
            message: "terms".into(),
            consent_url: Some("https://example.invalid/consent".into()),
        };
        assert!(consent.is_consent_required());
        assert!(!consent.is_invalid_credentials());
        assert!(!Error::TokenRejected.is_invalid_credentials());
    }
}
