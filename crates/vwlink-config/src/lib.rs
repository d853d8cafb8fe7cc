//! Shared configuration for vwlink.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext +
//! netrc), and translation to `vwlink_core::ConnectorConfig`. The core
//! never sees where a setting came from.

mod netrc;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vwlink_core::{
    ConnectorConfig, Credentials, Endpoints, FileTokenStore, Region, Spin, TlsMode, TransportConfig,
};

pub use netrc::{DEFAULT_NETRC_HOST, Machine, Netrc};

/// Keyring service name; entries are keyed `<profile>/<username>`.
pub const KEYRING_SERVICE: &str = "vwlink";

/// The vendor throttles accounts polled more often than this.
pub const MIN_INTERVAL_SECS: u64 = 180;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("failed to read netrc file {}: {reason}", path.display())]
    Netrc { path: PathBuf, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Polling interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_interval() -> u64 {
    300
}
fn default_timeout() -> u64 {
    30
}

/// A named account profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account e-mail.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring, env or netrc).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// S-PIN for lock and unlock (plaintext).
    pub spin: Option<String>,

    /// netrc file to read; `~/.netrc` when unset.
    pub netrc: Option<PathBuf>,

    /// Host key in the netrc file.
    pub netrc_host: Option<String>,

    /// Polling interval in seconds.
    pub interval: Option<u64>,

    /// Cache freshness window in seconds. Defaults to `interval - 1`.
    pub max_age: Option<u64>,

    /// VINs to leave alone.
    #[serde(default)]
    pub exclude_vins: Vec<String>,

    /// Vendor backend: `emea` (default) or `na`.
    pub region: Option<Region>,

    /// Keep tokens between runs so a restart does not log in again.
    #[serde(default)]
    pub persist_tokens: bool,

    /// Token file; the platform cache directory when unset. Setting it
    /// implies `persist_tokens`.
    pub token_store: Option<PathBuf>,

    /// Vehicle API base URL override.
    pub api_base: Option<String>,

    /// Identity service base URL override.
    pub identity_base: Option<String>,

    /// Extra CA certificate to trust.
    pub ca_cert: Option<PathBuf>,

    /// HTTP timeout in seconds.
    pub timeout: Option<u64>,

    /// Seconds a command may stay unresolved.
    pub command_timeout: Option<u64>,

    /// Seconds between command status polls.
    pub command_poll_interval: Option<u64>,

    /// Consecutive failures before a resource counts as failing.
    pub failure_threshold: Option<u32>,
}

impl Config {
    /// Select a profile by name, falling back to `default_profile`, then
    /// to `"default"`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "vwlink", "vwlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default token file, under the platform cache directory.
pub fn token_store_path() -> PathBuf {
    ProjectDirs::from("com", "vwlink", "vwlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("tokens.json");
            p
        },
        |dirs| dirs.cache_dir().join("tokens.json"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("vwlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment.
///
/// Environment keys nest on a double underscore, e.g.
/// `VWLINK_DEFAULTS__INTERVAL=600` or `VWLINK_DEFAULT_PROFILE=work`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("VWLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Where secrets outside the config file come from.
///
/// The system implementation reads process environment and the OS
/// keyring; tests substitute their own.
pub trait SecretSource {
    fn env(&self, name: &str) -> Option<String>;
    fn keyring(&self, user: &str) -> Option<String>;
}

/// Process environment plus the OS keyring.
pub struct SystemSecrets;

impl SecretSource for SystemSecrets {
    fn env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn keyring(&self, user: &str) -> Option<String> {
        keyring::Entry::new(KEYRING_SERVICE, user)
            .and_then(|entry| entry.get_password())
            .ok()
    }
}

/// netrc entry for the profile, if any.
///
/// A missing `~/.netrc` is not an error; a missing file the profile names
/// explicitly is.
fn netrc_machine(profile: &Profile) -> Result<Option<Machine>, ConfigError> {
    let host = profile.netrc_host.as_deref().unwrap_or(DEFAULT_NETRC_HOST);
    let netrc = match &profile.netrc {
        Some(path) => Netrc::from_file(path)?,
        None => match netrc::default_netrc_path() {
            Some(path) if path.exists() => Netrc::from_file(&path)?,
            _ => return Ok(None),
        },
    };
    Ok(netrc.machine(host).cloned())
}

/// Resolve account credentials and the S-PIN from the credential chain.
pub fn resolve_credentials(profile: &Profile, profile_name: &str) -> Result<Credentials, ConfigError> {
    resolve_credentials_with(profile, profile_name, &SystemSecrets)
}

pub fn resolve_credentials_with(
    profile: &Profile,
    profile_name: &str,
    secrets: &dyn SecretSource,
) -> Result<Credentials, ConfigError> {
    let machine = netrc_machine(profile)?;
    let no_credentials = || ConfigError::NoCredentials {
        profile: profile_name.into(),
    };

    let username = profile
        .username
        .clone()
        .or_else(|| secrets.env("VWLINK_USERNAME"))
        .or_else(|| machine.as_ref().and_then(|m| m.login.clone()))
        .ok_or_else(no_credentials)?;

    let password = resolve_password(profile, profile_name, &username, machine.as_ref(), secrets)
        .ok_or_else(no_credentials)?;

    let mut credentials = Credentials::new(username, password);
    if let Some(spin) = resolve_spin(profile, machine.as_ref(), secrets) {
        credentials = credentials.with_spin(spin);
    }
    Ok(credentials)
}

fn resolve_password(
    profile: &Profile,
    profile_name: &str,
    username: &str,
    machine: Option<&Machine>,
    secrets: &dyn SecretSource,
) -> Option<SecretString> {
    // 1. Env var
    if let Some(pw) = secrets.env("VWLINK_PASSWORD") {
        debug!(source = "env", "password resolved");
        return Some(SecretString::from(pw));
    }

    // 2. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Some(pw) = secrets.env(env_name) {
            debug!(source = "password_env", "password resolved");
            return Some(SecretString::from(pw));
        }
    }

    // 3. System keyring
    if let Some(pw) = secrets.keyring(&format!("{profile_name}/{username}")) {
        debug!(source = "keyring", "password resolved");
        return Some(SecretString::from(pw));
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        debug!(source = "config", "password resolved");
        return Some(SecretString::from(pw.clone()));
    }

    // 5. netrc
    machine
        .and_then(|m| m.password.clone())
        .map(SecretString::from)
}

fn resolve_spin(
    profile: &Profile,
    machine: Option<&Machine>,
    secrets: &dyn SecretSource,
) -> Option<Spin> {
    secrets
        .env("VWLINK_SPIN")
        .or_else(|| profile.spin.clone())
        .or_else(|| machine.and_then(|m| m.account.clone()))
        .map(Spin::new)
}

// ── Validation & translation ────────────────────────────────────────

/// Check the numeric settings of a profile against the defaults it
/// inherits.
pub fn validate_profile(profile: &Profile, defaults: &Defaults) -> Result<(), ConfigError> {
    let interval = profile.interval.unwrap_or(defaults.interval);
    if interval < MIN_INTERVAL_SECS {
        return Err(invalid(
            "interval",
            format!("must be at least {MIN_INTERVAL_SECS} seconds, got {interval}"),
        ));
    }
    if profile.max_age == Some(0) {
        return Err(invalid("max_age", "must be greater than zero"));
    }
    if profile.timeout.unwrap_or(defaults.timeout) == 0 {
        return Err(invalid("timeout", "must be greater than zero"));
    }
    if profile.command_timeout == Some(0) {
        return Err(invalid("command_timeout", "must be greater than zero"));
    }
    if profile.command_poll_interval == Some(0) {
        return Err(invalid("command_poll_interval", "must be greater than zero"));
    }
    if profile.failure_threshold == Some(0) {
        return Err(invalid("failure_threshold", "must be at least 1"));
    }
    Ok(())
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse()
        .map_err(|_| invalid(field, format!("invalid URL: {raw}")))
}

/// Build a `ConnectorConfig` from a profile, resolving credentials from
/// the system sources.
pub fn profile_to_connector_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectorConfig, ConfigError> {
    let credentials = resolve_credentials(profile, profile_name)?;
    build_connector_config(profile, defaults, credentials)
}

/// Build a `ConnectorConfig` from a profile and already resolved
/// credentials.
pub fn build_connector_config(
    profile: &Profile,
    defaults: &Defaults,
    credentials: Credentials,
) -> Result<ConnectorConfig, ConfigError> {
    validate_profile(profile, defaults)?;

    let region = profile.region.unwrap_or_default();
    let mut endpoints = Endpoints::for_region(region)
        .map_err(|e| invalid("region", format!("no usable hosts for {region}: {e}")))?;
    if let Some(ref raw) = profile.api_base {
        endpoints.api_base = parse_url("api_base", raw)?;
    }
    if let Some(ref raw) = profile.identity_base {
        endpoints.identity_base = parse_url("identity_base", raw)?;
    }

    let transport = TransportConfig {
        tls: profile
            .ca_cert
            .clone()
            .map_or(TlsMode::System, TlsMode::CustomCa),
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
    };

    let mut config = ConnectorConfig::new(credentials, endpoints);
    config.transport = transport;
    if profile.persist_tokens || profile.token_store.is_some() {
        let path = profile.token_store.clone().unwrap_or_else(token_store_path);
        debug!(path = %path.display(), "persisting tokens");
        config.token_store = Some(Arc::new(FileTokenStore::new(path)));
    }
    config.interval = Duration::from_secs(profile.interval.unwrap_or(defaults.interval));
    config.max_age = profile.max_age.map(Duration::from_secs);
    config.exclude_vins = profile.exclude_vins.iter().cloned().collect::<BTreeSet<_>>();
    if let Some(secs) = profile.command_timeout {
        config.command_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.command_poll_interval {
        config.command_poll_interval = Duration::from_secs(secs);
    }
    if let Some(threshold) = profile.failure_threshold {
        config.failure_threshold = threshold;
    }
    Ok(config)
}
