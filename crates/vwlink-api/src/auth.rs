use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::Deserialize;

/// Lifetime assumed when the identity service omits `expiresIn`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Tokens are renewed this long before their nominal expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// The vehicle security PIN required for lock/unlock and PIN-gated commands.
#[derive(Debug, Clone)]
pub struct Spin(SecretString);

impl Spin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(SecretString::from(pin.into()))
    }

    pub fn secret(&self) -> &SecretString {
        &self.0
    }
}

/// Account credentials, resolved from config, keyring, or netrc.
///
/// Immutable once built. `Debug` never prints the password or S-PIN.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
    pub spin: Option<Spin>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            spin: None,
        }
    }

    pub fn with_spin(mut self, spin: Spin) -> Self {
        self.spin = Some(spin);
        self
    }
}

/// Raw token payload returned by login and refresh.
///
/// The EMEA identity service answers in camelCase, the North American
/// OpenID endpoint in snake_case.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenResponse {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(alias = "id_token")]
    pub id_token: Option<String>,
    #[serde(alias = "expires_in")]
    pub expires_in: Option<i64>,
}

/// OpenID token set held by the [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub(crate) access_token: SecretString,
    pub(crate) refresh_token: Option<SecretString>,
    pub(crate) id_token: Option<SecretString>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Build a token set from a vendor response.
    ///
    /// When renewing, the vendor may omit the refresh token; the previous
    /// one stays valid and is carried forward.
    pub(crate) fn from_response(
        response: TokenResponse,
        now: DateTime<Utc>,
        previous: Option<&TokenSet>,
    ) -> Self {
        let expires_in = response
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let refresh_token = response
            .refresh_token
            .map(SecretString::from)
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
        let id_token = response
            .id_token
            .map(SecretString::from)
            .or_else(|| previous.and_then(|p| p.id_token.clone()));

        Self {
            access_token: SecretString::from(response.access_token),
            refresh_token,
            id_token,
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    /// Whether the access token should be renewed before use.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn response(refresh: Option<&str>, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: "access".into(),
            refresh_token: refresh.map(String::from),
            id_token: None,
            expires_in,
        }
    }

    #[test]
    fn defaults_expiry_to_one_hour() {
        let now = Utc::now();
        let tokens = TokenSet::from_response(response(Some("r"), None), now, None);
        assert_eq!(tokens.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn keeps_previous_refresh_token_when_omitted() {
        let now = Utc::now();
        let first = TokenSet::from_response(response(Some("first"), Some(600)), now, None);
        let renewed = TokenSet::from_response(response(None, Some(600)), now, Some(&first));
        assert_eq!(
            renewed.refresh_token.unwrap().expose_secret(),
            "first",
            "refresh token should carry over"
        );
    }

    #[test]
    fn expires_ahead_of_deadline() {
        let now = Utc::now();
        let tokens = TokenSet::from_response(response(None, Some(90)), now, None);
        assert!(!tokens.is_expired(now));
        assert!(tokens.is_expired(now + Duration::seconds(31)));
    }

    #[test]
    fn accepts_both_token_spellings() {
        let camel: TokenResponse =
            serde_json::from_str(r#"{"accessToken":"a","refreshToken":"r","expiresIn":60}"#)
                .unwrap();
        let snake: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","id_token":"i","expires_in":60}"#,
        )
        .unwrap();
        assert_eq!(camel.refresh_token.as_deref(), Some("r"));
        assert_eq!(snake.refresh_token.as_deref(), Some("r"));
        assert_eq!(snake.id_token.as_deref(), Some("i"));
        assert_eq!(snake.expires_in, Some(60));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = Credentials::new("driver@example.com", SecretString::from("hunter2"))
            .with_spin(Spin::new("1234"));
        let printed = format!("{creds:?}");
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("1234"));
    }
}
