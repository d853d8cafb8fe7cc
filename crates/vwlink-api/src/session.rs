// Session Manager
//
// Owns the account's credentials and OpenID tokens. Token state sits
// behind a single async mutex: whoever holds it performs the refresh,
// everyone else waits and then reuses the renewed token. Callers never
// see a raw token; they hand an `ApiRequest` to `Session::send`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{Credentials, Spin, TokenResponse, TokenSet};
use crate::error::Error;
use crate::token_store::{StoredTokens, TokenStore};
use crate::transport::TransportConfig;

const EMEA_API_BASE: &str = "https://emea.bff.cariad.digital";
const EMEA_IDENTITY_BASE: &str = "https://emea.bff.cariad.digital/user-login";
const NA_BASE: &str = "https://b-h-s.spr.us00.p.con-veh.net";

/// OpenID client registered for the North American app.
const NA_CLIENT_ID: &str = "59992128-69a9-42c3-8621-7942041ba824_MYVW_ANDROID";
const NA_TOKEN_PATH: &str = "oidc/v1/token";

/// Vendor backend family. Regions differ in hosts, login flow, and the
/// shape of the vehicle status endpoints.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Region {
    /// Europe, Middle East and Africa.
    #[default]
    Emea,
    /// North America.
    Na,
}

/// Base URLs for the vehicle API and the identity service.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub region: Region,
    pub api_base: Url,
    pub identity_base: Url,
}

impl Endpoints {
    pub fn new(api_base: Url, identity_base: Url) -> Self {
        Self {
            region: Region::Emea,
            api_base,
            identity_base,
        }
    }

    /// The vendor's production hosts for `region`.
    pub fn for_region(region: Region) -> Result<Self, Error> {
        let (api, identity) = match region {
            Region::Emea => (EMEA_API_BASE, EMEA_IDENTITY_BASE),
            Region::Na => (NA_BASE, NA_BASE),
        };
        Ok(Self {
            region,
            api_base: Url::parse(api)?,
            identity_base: Url::parse(identity)?,
        })
    }

    /// Serve both the vehicle API and identity calls from one host.
    pub fn single_host(base: Url) -> Self {
        Self {
            region: Region::Emea,
            api_base: base.clone(),
            identity_base: base,
        }
    }

    /// Talk the protocol of `region` to whatever hosts are configured.
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Build a full URL for a vehicle API path.
    pub fn api_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.api_base, path)
    }

    fn identity_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.identity_base, path)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, Error> {
    let full = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&full)?)
}

/// A replayable request description.
///
/// `reqwest::RequestBuilder` cannot be cloned once a body is attached, so
/// the session keeps the parts needed to send the request a second time
/// after a token renewal.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
        }
    }

    pub fn post(url: Url, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(body),
        }
    }

    pub fn put(url: Url, body: serde_json::Value) -> Self {
        Self {
            method: Method::PUT,
            url,
            body: Some(body),
        }
    }
}

/// Error body returned by the identity service on a failed login.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityError {
    error: Option<String>,
    #[serde(alias = "error_description")]
    error_description: Option<String>,
    #[serde(alias = "consent_url")]
    consent_url: Option<String>,
}

impl IdentityError {
    fn requires_consent(&self) -> bool {
        let marker = |s: &str| {
            let s = s.to_ascii_lowercase();
            s.contains("consent") || s.contains("terms")
        };
        self.consent_url.is_some()
            || self.error.as_deref().is_some_and(marker)
            || self.error_description.as_deref().is_some_and(marker)
    }

    fn describe(&self, status: StatusCode) -> String {
        self.error_description
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("HTTP {status}"))
    }
}

#[derive(Default)]
struct TokenState {
    tokens: Option<TokenSet>,
    /// Bumped on every successful login or refresh.
    generation: u64,
}

/// Authenticated session for one account.
///
/// Several sessions may coexist in a process (one per account); they share
/// nothing mutable.
pub struct Session {
    http: reqwest::Client,
    endpoints: Endpoints,
    credentials: Credentials,
    timeout: Duration,
    state: Mutex<TokenState>,
    token_store: Option<Arc<dyn TokenStore>>,
}

impl Session {
    pub fn new(
        credentials: Credentials,
        endpoints: Endpoints,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            endpoints,
            credentials,
            timeout: transport.timeout,
            state: Mutex::new(TokenState::default()),
            token_store: None,
        })
    }

    /// Reuse and persist tokens through `store`.
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// The configured S-PIN, if any.
    pub fn spin(&self) -> Option<&Spin> {
        self.credentials.spin.as_ref()
    }

    /// Whether a token set is currently held (it may be expired).
    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.tokens.is_some()
    }

    // ── Login / refresh ──────────────────────────────────────────────

    /// Sign in.
    ///
    /// A fresh session first tries the tokens persisted by a previous run,
    /// renewing them if they have expired. Otherwise, or when tokens are
    /// already held, a full login replaces them.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let restored = if state.tokens.is_none() {
            self.restore()
        } else {
            None
        };
        if let Some(tokens) = restored {
            info!(user = %self.credentials.username, "reusing tokens from previous session");
            let expired = tokens.is_expired(Utc::now());
            state.tokens = Some(tokens);
            state.generation += 1;
            if expired {
                self.renew(&mut state).await?;
            }
            return Ok(());
        }

        let tokens = self.login().await?;
        self.persist(&tokens);
        state.tokens = Some(tokens);
        state.generation += 1;
        info!(user = %self.credentials.username, "authenticated");
        Ok(())
    }

    // ── Token persistence ────────────────────────────────────────────

    fn store_key(&self) -> String {
        format!("{}:{}", self.endpoints.region, self.credentials.username)
    }

    fn restore(&self) -> Option<TokenSet> {
        let store = self.token_store.as_ref()?;
        match store.load(&self.store_key()) {
            Ok(stored) => stored.map(TokenSet::from),
            Err(e) => {
                warn!(error = %e, "could not read stored tokens, logging in");
                None
            }
        }
    }

    fn persist(&self, tokens: &TokenSet) {
        let Some(store) = self.token_store.as_ref() else {
            return;
        };
        if let Err(e) = store.save(&self.store_key(), &StoredTokens::from(tokens)) {
            warn!(error = %e, "could not persist tokens");
        }
    }

    // ── Identity requests ────────────────────────────────────────────

    fn login_request(&self) -> Result<reqwest::RequestBuilder, Error> {
        let username = self.credentials.username.as_str();
        let password = self.credentials.password.expose_secret();
        Ok(match self.endpoints.region {
            Region::Emea => self
                .http
                .post(self.endpoints.identity_url("login/v1")?)
                .json(&json!({ "username": username, "password": password })),
            Region::Na => self.http.post(self.endpoints.identity_url(NA_TOKEN_PATH)?).form(&[
                ("grant_type", "password"),
                ("client_id", NA_CLIENT_ID),
                ("username", username),
                ("password", password),
                ("scope", "openid"),
            ]),
        })
    }

    fn refresh_request(&self, refresh_token: &str) -> Result<reqwest::RequestBuilder, Error> {
        Ok(match self.endpoints.region {
            Region::Emea => self
                .http
                .post(self.endpoints.identity_url("refresh/v1")?)
                .json(&json!({ "refreshToken": refresh_token })),
            Region::Na => self.http.post(self.endpoints.identity_url(NA_TOKEN_PATH)?).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", NA_CLIENT_ID),
                ("refresh_token", refresh_token),
            ]),
        })
    }

    async fn login(&self) -> Result<TokenSet, Error> {
        let request = self.login_request()?;
        debug!(region = %self.endpoints.region, "logging in");

        let resp = request
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout.as_secs()))?;

        let status = resp.status();
        if status.is_success() {
            let tokens: TokenResponse = decode(resp).await?;
            return Ok(TokenSet::from_response(tokens, Utc::now(), None));
        }

        let retry_after = retry_after_secs(resp.headers());
        let text = resp.text().await.unwrap_or_default();
        let detail: IdentityError = serde_json::from_str(&text).unwrap_or_default();

        match status {
            StatusCode::FORBIDDEN if detail.requires_consent() => {
                warn!("login blocked: vendor requires consent");
                Err(Error::ConsentRequired {
                    message: detail.describe(status),
                    consent_url: detail.consent_url,
                })
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Authentication {
                    message: format!("login failed: {}", detail.describe(status)),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited {
                retry_after_secs: retry_after,
            }),
            s if s.is_server_error() => Err(Error::Server {
                status: s.as_u16(),
                message: detail.describe(status),
            }),
            s => Err(Error::Api {
                status: s.as_u16(),
                message: text,
            }),
        }
    }

    async fn refresh(&self, current: &TokenSet) -> Result<TokenSet, Error> {
        let Some(refresh_token) = current.refresh_token.as_ref() else {
            return Err(Error::Authentication {
                message: "no refresh token held".into(),
            });
        };

        let request = self.refresh_request(refresh_token.expose_secret())?;
        debug!(region = %self.endpoints.region, "refreshing tokens");

        let resp = request
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout.as_secs()))?;

        let status = resp.status();
        match status {
            s if s.is_success() => {
                let tokens: TokenResponse = decode(resp).await?;
                Ok(TokenSet::from_response(tokens, Utc::now(), Some(current)))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Authentication {
                    message: format!("refresh rejected (HTTP {status})"),
                })
            }
            s if s.is_server_error() => Err(Error::Server {
                status: s.as_u16(),
                message: "identity service unavailable during refresh".into(),
            }),
            s => Err(Error::Api {
                status: s.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Renew tokens while holding the state lock.
    ///
    /// A rejected refresh falls back to a full login with the stored
    /// credentials; transient failures propagate unchanged.
    async fn renew(&self, state: &mut TokenState) -> Result<(), Error> {
        let renewed = match state.tokens.as_ref() {
            Some(current) if current.has_refresh_token() => match self.refresh(current).await {
                Ok(tokens) => tokens,
                Err(e) if e.is_invalid_credentials() => {
                    debug!("refresh rejected, falling back to login");
                    self.login().await?
                }
                Err(e) => return Err(e),
            },
            _ => self.login().await?,
        };
        self.persist(&renewed);
        state.tokens = Some(renewed);
        state.generation += 1;
        debug!(generation = state.generation, "tokens renewed");
        Ok(())
    }

    /// Current access token, renewing it first if it has expired.
    async fn bearer(&self) -> Result<(SecretString, u64), Error> {
        let mut state = self.state.lock().await;
        let expired = state
            .tokens
            .as_ref()
            .is_none_or(|t| t.is_expired(Utc::now()));
        if expired {
            self.renew(&mut state).await?;
        }
        match state.tokens.as_ref() {
            Some(tokens) => Ok((tokens.access_token.clone(), state.generation)),
            None => Err(Error::TokenRejected),
        }
    }

    /// Renew after the vendor rejected a token of generation `seen`.
    ///
    /// If another caller already renewed since then, the newer token is
    /// reused and no extra call is made.
    async fn renew_after_rejection(&self, seen: u64) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.generation != seen {
            debug!("tokens already renewed by a concurrent caller");
            return Ok(());
        }
        self.renew(&mut state).await
    }

    // ── Authorized requests ──────────────────────────────────────────

    /// Send a request with the account's bearer token.
    ///
    /// A 401 triggers one renewal and exactly one retry. A second 401
    /// surfaces as [`Error::TokenRejected`]. Other statuses are returned to
    /// the caller untouched.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, Error> {
        let (token, generation) = self.bearer().await?;
        let resp = self.dispatch(request, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!("{} {} rejected with 401, renewing", request.method, request.url);
        self.renew_after_rejection(generation).await?;

        let (token, _) = self.bearer().await?;
        let resp = self.dispatch(request, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("token rejected again after renewal");
            return Err(Error::TokenRejected);
        }
        Ok(resp)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: &SecretString,
    ) -> Result<reqwest::Response, Error> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .bearer_auth(token.expose_secret());
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        builder
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout.as_secs()))
    }
}

/// Parse a `Retry-After` header, defaulting to 15 minutes.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(900)
}

/// Read a body and decode it as JSON, keeping the raw text on failure.
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, Error> {
    let body = resp.text().await.map_err(Error::Transport)?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn production_hosts_parse_for_every_region() {
        let emea = Endpoints::for_region(Region::Emea).unwrap();
        assert_eq!(emea.region, Region::Emea);
        assert_eq!(
            emea.identity_url("login/v1").unwrap().as_str(),
            "https://emea.bff.cariad.digital/user-login/login/v1"
        );

        let na = Endpoints::for_region(Region::Na).unwrap();
        assert_eq!(na.region, Region::Na);
        assert_eq!(
            na.api_url("account/v1/garage").unwrap().as_str(),
            "https://b-h-s.spr.us00.p.con-veh.net/account/v1/garage"
        );
    }

    #[test]
    fn region_names() {
        assert_eq!("NA".parse::<Region>().unwrap(), Region::Na);
        assert_eq!(Region::Emea.to_string(), "emea");
        assert!("apac".parse::<Region>().is_err());
    }
}
