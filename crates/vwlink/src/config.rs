//! CLI configuration: a thin wrapper around `vwlink_config` shared types.
//!
//! Picks the config file and profile from `GlobalOpts` and turns them into
//! a `ConnectorConfig`.

use std::path::PathBuf;
use std::time::Duration;

use vwlink_core::ConnectorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use vwlink_config::{Config, Profile, config_path, load_config_from};

/// Config file named by `--config`, or the platform default.
pub fn active_config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ConnectorConfig` from the config file, profile, and overrides.
///
/// Without a matching profile the implicit `default` profile still works
/// from environment variables and `~/.netrc` alone.
pub fn build_connector_config(
    global: &GlobalOpts,
    interval_override: Option<u64>,
) -> Result<ConnectorConfig, CliError> {
    let path = active_config_path(global);
    let cfg = load_config_from(&path)?;
    let profile_name = active_profile_name(global, &cfg);

    let fallback = Profile::default();
    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile,
        None if global.profile.is_none() => &fallback,
        None => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
                path: path.display().to_string(),
            });
        }
    };

    let mut config =
        vwlink_config::profile_to_connector_config(profile, &profile_name, &cfg.defaults)?;

    if let Some(secs) = interval_override {
        if secs < vwlink_config::MIN_INTERVAL_SECS {
            return Err(CliError::Validation {
                field: "interval".into(),
                reason: format!(
                    "must be at least {} seconds, got {secs}",
                    vwlink_config::MIN_INTERVAL_SECS
                ),
            });
        }
        config.interval = Duration::from_secs(secs);
    }
    Ok(config)
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}
