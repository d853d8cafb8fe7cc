// ── Connector configuration ──
//
// Everything the connector consumes, independent of where it came from.
// Profile loading and credential resolution live in `vwlink-config`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use vwlink_api::{Credentials, Endpoints, TokenStore, TransportConfig};

use crate::aggregate::AggregationPolicy;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for one account connection.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub credentials: Credentials,
    /// Vendor hosts and the region protocol spoken to them.
    pub endpoints: Endpoints,
    /// Where tokens are kept between runs. `None` logs in on every start.
    pub token_store: Option<Arc<dyn TokenStore>>,
    /// HTTP timeout and TLS settings.
    pub transport: TransportConfig,
    /// Polling interval for the garage and every vehicle loop. Can be
    /// changed at runtime through [`Connector::set_interval`](crate::Connector::set_interval).
    pub interval: Duration,
    /// Cache freshness window. `None` means one second less than the
    /// interval, so every cycle fetches fresh data.
    pub max_age: Option<Duration>,
    /// VINs never synchronized. Compared case-insensitively.
    pub exclude_vins: BTreeSet<String>,
    /// Consecutive failures that mark a resource or vehicle as failing.
    pub failure_threshold: u32,
    /// Time without a successful cycle before a vehicle is offline.
    /// `None` means three intervals.
    pub offline_after: Option<Duration>,
    /// Delay between command status polls.
    pub command_poll_interval: Duration,
    /// How long a command may stay unresolved before it is timed out.
    pub command_timeout: Duration,
}

impl ConnectorConfig {
    pub fn new(credentials: Credentials, endpoints: Endpoints) -> Self {
        Self {
            credentials,
            endpoints,
            token_store: None,
            transport: TransportConfig::default(),
            interval: DEFAULT_INTERVAL,
            max_age: None,
            exclude_vins: BTreeSet::new(),
            failure_threshold: 3,
            offline_after: None,
            command_poll_interval: Duration::from_secs(5),
            command_timeout: Duration::from_secs(120),
        }
    }

    pub(crate) fn is_excluded(&self, vin: &str) -> bool {
        self.exclude_vins
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(vin))
    }

    /// Freshness window to use with the given interval.
    pub(crate) fn max_age_for(&self, interval: Duration) -> Duration {
        self.max_age
            .unwrap_or_else(|| interval.saturating_sub(Duration::from_secs(1)))
    }

    pub(crate) fn policy_for(&self, interval: Duration) -> AggregationPolicy {
        let mut policy = AggregationPolicy::for_interval(interval, self.failure_threshold);
        if let Some(offline_after) = self.offline_after {
            policy.offline_after = offline_after;
        }
        policy
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use vwlink_api::Region;

    use super::*;

    fn config() -> ConnectorConfig {
        ConnectorConfig::new(
            Credentials::new("driver@example.com", SecretString::from("pw")),
            Endpoints::for_region(Region::Emea).unwrap(),
        )
    }

    #[test]
    fn max_age_defaults_to_just_under_interval() {
        let cfg = config();
        assert_eq!(cfg.max_age_for(Duration::from_secs(300)), Duration::from_secs(299));

        let pinned = ConnectorConfig {
            max_age: Some(Duration::from_secs(60)),
            ..config()
        };
        assert_eq!(pinned.max_age_for(Duration::from_secs(300)), Duration::from_secs(60));
    }

    #[test]
    fn exclusions_ignore_case() {
        let mut cfg = config();
        cfg.exclude_vins.insert("wvwzzz1kzaw000001".into());
        assert!(cfg.is_excluded("WVWZZZ1KZAW000001"));
        assert!(!cfg.is_excluded("WVWZZZ1KZAW000002"));
    }

    #[test]
    fn offline_after_overrides_policy() {
        let mut cfg = config();
        assert_eq!(
            cfg.policy_for(Duration::from_secs(300)).offline_after,
            Duration::from_secs(900)
        );
        cfg.offline_after = Some(Duration::from_secs(60));
        assert_eq!(
            cfg.policy_for(Duration::from_secs(300)).offline_after,
            Duration::from_secs(60)
        );
    }
}
