//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use vwlink_config::ConfigError;
use vwlink_core::{AuthError, CommandError, CoreError, FetchError, TransientError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONSENT: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the vendor service: {message}")]
    #[diagnostic(
        code(vwlink::connection_failed),
        help("Check your network connection, or retry later if the vendor is having problems.")
    )]
    ConnectionFailed { message: String },

    #[error("Rate limited by the vendor")]
    #[diagnostic(
        code(vwlink::rate_limited),
        help("The vendor asked to wait {retry_after_secs}s before the next request.")
    )]
    RateLimited { retry_after_secs: u64 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(vwlink::auth_failed),
        help(
            "Verify the username and password for profile '{profile}'.\n\
             Store the password in the keyring (service 'vwlink', user '<profile>/<username>')\n\
             or set VWLINK_PASSWORD."
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("The vendor requires you to accept updated terms")]
    #[diagnostic(
        code(vwlink::consent_required),
        help("Log in to the vendor app or portal and accept the terms: {url}")
    )]
    ConsentRequired { url: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(vwlink::no_credentials),
        help(
            "Add username and password_env to the profile, store the password in the keyring,\n\
             or add a 'volkswagen' entry to ~/.netrc."
        )
    )]
    NoCredentials { profile: String },

    #[error("This command needs the S-PIN")]
    #[diagnostic(
        code(vwlink::spin_required),
        help("Set 'spin' in the profile, VWLINK_SPIN, or the netrc 'account' field.")
    )]
    SpinRequired,

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(vwlink::not_found),
        help("Run: vwlink {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("Vehicle does not support this command (missing '{capability}' capability)")]
    #[diagnostic(code(vwlink::unsupported))]
    Unsupported { capability: String },

    #[error("Command failed: {message}")]
    #[diagnostic(code(vwlink::command_failed))]
    CommandFailed { message: String },

    #[error("No final result after {seconds}s")]
    #[diagnostic(
        code(vwlink::timeout),
        help("The vehicle may still carry out the command; check with: vwlink status <VIN>")
    )]
    Timeout { seconds: u64 },

    // ── Vendor ───────────────────────────────────────────────────────

    #[error("Vendor error: {message}")]
    #[diagnostic(code(vwlink::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vwlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(vwlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Config file: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(code(vwlink::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(vwlink::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::RateLimited { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::SpinRequired => {
                exit_code::AUTH
            }
            Self::ConsentRequired { .. } => exit_code::CONSENT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },
            AuthError::ConsentRequired {
                message,
                consent_url,
            } => CliError::ConsentRequired {
                url: consent_url.unwrap_or(message),
            },
            AuthError::TokenExpired => CliError::AuthFailed {
                profile: "current".into(),
                message: "session expired and could not be renewed".into(),
            },
            AuthError::Network { message } => CliError::ConnectionFailed { message },
        }
    }
}

impl From<FetchError> for CliError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(auth) => auth.into(),
            FetchError::Transient(TransientError::RateLimited { retry_after_secs }) => {
                CliError::RateLimited { retry_after_secs }
            }
            FetchError::Transient(TransientError::Timeout { timeout_secs }) => CliError::Timeout {
                seconds: timeout_secs,
            },
            FetchError::Transient(other) => CliError::ConnectionFailed {
                message: other.to_string(),
            },
            other => CliError::ApiError {
                message: other.to_string(),
            },
        }
    }
}

impl From<CommandError> for CliError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::CapabilityMissing { capability } => CliError::Unsupported {
                capability: capability.to_string(),
            },
            CommandError::PinRequired => CliError::SpinRequired,
            CommandError::InvalidParameter { message } => CliError::Validation {
                field: "command".into(),
                reason: message,
            },
            CommandError::TimedOut { waited_secs } => CliError::Timeout {
                seconds: waited_secs,
            },
            other => CliError::CommandFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth(auth) => auth.into(),
            CoreError::Fetch(fetch) => fetch.into(),
            CoreError::Command(command) => command.into(),

            CoreError::VehicleNotFound { vin } => CliError::NotFound {
                resource_type: "vehicle".into(),
                identifier: vin,
                list_command: "vehicles".into(),
            },

            CoreError::CommandNotFound { id } => CliError::NotFound {
                resource_type: "command".into(),
                identifier: id,
                list_command: "watch".into(),
            },

            CoreError::AccountPaused => CliError::AuthFailed {
                profile: "current".into(),
                message: "account is paused until credentials or consent are fixed".into(),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            other => CliError::ApiError {
                message: other.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn consent_maps_to_its_own_exit_code() {
        let err: CliError = CoreError::Auth(AuthError::ConsentRequired {
            message: "consent_required".into(),
            consent_url: Some("https://identity.example/terms".into()),
        })
        .into();
        assert_eq!(err.exit_code(), exit_code::CONSENT);
        assert!(matches!(err, CliError::ConsentRequired { ref url } if url.ends_with("/terms")));
    }

    #[test]
    fn command_outcomes_map_to_exit_codes() {
        let timeout: CliError = CoreError::Command(CommandError::TimedOut { waited_secs: 120 }).into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let missing: CliError = CoreError::VehicleNotFound { vin: "X".into() }.into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let pin: CliError = CoreError::Command(CommandError::PinRequired).into();
        assert_eq!(pin.exit_code(), exit_code::AUTH);
    }
}
