// ── Synchronization loop ──
//
// One cycle per vehicle per interval: Idle → Fetching → Applying → Idle.
// Resource failures are recorded and the rest of the cycle still applies.
// Account or cycle scoped failures end the cycle without touching any
// sub-state. Composites are recomputed in the same store update that
// changes the sub-states they depend on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregate::{AggregationPolicy, aggregate};
use crate::config::ConnectorConfig;
use crate::error::{AuthError, FailureScope, FetchError};
use crate::fetch::{Contact, Fetched, Fetchers};
use crate::model::{CapabilitySet, ResourceKind, SyncPhase, Vehicle};
use crate::store::{DataStore, GarageChange};

// ── AccountStatus ───────────────────────────────────────────────────

/// Whether the account can currently be used. Observable by hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    SignedOut,
    Active,
    /// Terms or consent must be accepted on the vendor portal.
    ConsentRequired {
        message: String,
        consent_url: Option<String>,
    },
    InvalidCredentials { message: String },
}

impl AccountStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// `true` when only user action will unblock the account.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            Self::ConsentRequired { .. } | Self::InvalidCredentials { .. }
        )
    }
}

// ── CycleReport ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CycleOutcome {
    /// Results applied. Lists the resources that failed.
    Applied { failed: Vec<ResourceKind> },
    /// Nothing applied; existing sub-states left as they were.
    Aborted(FetchError),
    AccountPaused,
    UnknownVehicle,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CycleReport {
    pub outcome: CycleOutcome,
    /// Vendor back-off hint from a rate-limited resource.
    pub retry_after: Option<Duration>,
}

impl CycleReport {
    fn skipped(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            retry_after: None,
        }
    }
}

// ── SyncEngine ──────────────────────────────────────────────────────

/// Shared state for every synchronization task on one account.
pub(crate) struct SyncEngine {
    fetchers: Fetchers,
    store: Arc<DataStore>,
    config: ConnectorConfig,
    account: watch::Sender<AccountStatus>,
    interval: watch::Sender<Duration>,
}

impl SyncEngine {
    pub fn new(fetchers: Fetchers, store: Arc<DataStore>, config: ConnectorConfig) -> Self {
        let (account, _) = watch::channel(AccountStatus::SignedOut);
        let (interval, _) = watch::channel(config.interval);
        Self {
            fetchers,
            store,
            config,
            account,
            interval,
        }
    }

    pub fn fetchers(&self) -> &Fetchers {
        &self.fetchers
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    // ── Interval ─────────────────────────────────────────────────────

    pub fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    pub fn set_interval(&self, interval: Duration) {
        let changed = self.interval.send_if_modified(|current| {
            if *current == interval {
                return false;
            }
            *current = interval;
            true
        });
        if changed {
            info!(interval_secs = interval.as_secs(), "polling interval changed");
        }
    }

    pub fn subscribe_interval(&self) -> watch::Receiver<Duration> {
        self.interval.subscribe()
    }

    fn max_age(&self) -> Duration {
        self.config.max_age_for(self.interval())
    }

    // ── Account ──────────────────────────────────────────────────────

    pub fn account_status(&self) -> AccountStatus {
        self.account.borrow().clone()
    }

    pub fn subscribe_account(&self) -> watch::Receiver<AccountStatus> {
        self.account.subscribe()
    }

    pub fn set_account(&self, status: AccountStatus) {
        self.account.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    /// Pause the account if `err` means nothing will work until the user acts.
    pub fn block_on(&self, err: &AuthError) {
        let status = match err {
            AuthError::ConsentRequired {
                message,
                consent_url,
            } => AccountStatus::ConsentRequired {
                message: message.clone(),
                consent_url: consent_url.clone(),
            },
            AuthError::InvalidCredentials { message } => AccountStatus::InvalidCredentials {
                message: message.clone(),
            },
            AuthError::TokenExpired | AuthError::Network { .. } => return,
        };
        warn!(error = %err, "account blocked, pausing synchronization");
        self.set_account(status);
    }

    // ── Garage ───────────────────────────────────────────────────────

    /// Refresh the vehicle list and reconcile the store with it.
    pub async fn refresh_garage(&self) -> Result<GarageChange, FetchError> {
        let listed = match self.fetchers.vehicles(self.max_age()).await {
            Ok(listed) => listed,
            Err(FetchError::Auth(auth)) => {
                self.block_on(&auth);
                return Err(FetchError::Auth(auth));
            }
            Err(e) => return Err(e),
        };

        let kept = listed.iter().filter(|raw| {
            let excluded = self.config.is_excluded(&raw.vin);
            if excluded {
                debug!(vin = %raw.vin, "vehicle excluded by configuration");
            }
            !excluded
        });
        let change = self.store.apply_garage(kept);

        for vin in &change.removed {
            self.fetchers.cache().invalidate_vehicle(vin);
            info!(vin = %vin, "vehicle left the garage");
        }
        for vin in &change.added {
            info!(vin = %vin, "vehicle discovered");
        }
        Ok(change)
    }

    // ── Cycle ────────────────────────────────────────────────────────

    /// Run one synchronization cycle for `vin`.
    pub async fn run_cycle(&self, vin: &str) -> CycleReport {
        if !self.account.borrow().is_active() {
            self.finish_skipped(vin, SyncPhase::Paused);
            return CycleReport::skipped(CycleOutcome::AccountPaused);
        }
        let Some(known) = self.store.update_vehicle(vin, |v| v.sync.phase = SyncPhase::Fetching)
        else {
            return CycleReport::skipped(CycleOutcome::UnknownVehicle);
        };

        let started = Utc::now();
        let max_age = self.max_age();

        let capabilities = match self.fetchers.capabilities(vin).await {
            Ok(capabilities) => capabilities,
            Err(e) if e.scope() == FailureScope::Resource && !known.capabilities.is_empty() => {
                warn!(vin, error = %e, "capability refresh failed, using last known set");
                known.capabilities.clone()
            }
            Err(e) => return self.abort(vin, started, e),
        };

        let fetches = ResourceKind::PER_CYCLE.map(|kind| {
            let capabilities = &capabilities;
            async move {
                let result = self.fetchers.fetch(vin, kind, capabilities, max_age).await;
                (kind, result)
            }
        });
        let results = join_all(fetches).await;

        let retry_after = results
            .iter()
            .filter_map(|(_, r)| r.as_ref().err()?.retry_after_secs())
            .max()
            .map(Duration::from_secs);

        let fatal = results
            .iter()
            .filter_map(|(_, r)| r.as_ref().err())
            .max_by_key(|e| match e.scope() {
                FailureScope::Resource => 0,
                FailureScope::Cycle => 1,
                FailureScope::Account => 2,
            })
            .filter(|e| e.scope() != FailureScope::Resource)
            .cloned();
        if let Some(e) = fatal {
            let mut report = self.abort(vin, started, e);
            report.retry_after = retry_after;
            return report;
        }

        self.store
            .update_vehicle(vin, |v| v.sync.phase = SyncPhase::Applying);
        let failed = self.apply(vin, started, capabilities, results);

        CycleReport {
            outcome: CycleOutcome::Applied { failed },
            retry_after,
        }
    }

    /// Apply every fetched result in one store update.
    ///
    /// Only answers from the vendor count towards `last_success`. A cycle
    /// served entirely from cache or skipped by capability gating leaves the
    /// success clock and the failure streak as they were.
    fn apply(
        &self,
        vin: &str,
        started: DateTime<Utc>,
        capabilities: CapabilitySet,
        results: Vec<(ResourceKind, Result<Fetched, FetchError>)>,
    ) -> Vec<ResourceKind> {
        let policy = self.config.policy_for(self.interval());
        let mut failed = Vec::new();

        self.store.update_vehicle(vin, |v| {
            let now = Utc::now();
            let mut reached_vendor = false;
            v.capabilities = capabilities;

            for (kind, result) in results {
                let health = v.sync.resources.entry(kind).or_default();
                match result {
                    Ok(Fetched { updates, contact }) => {
                        match contact {
                            Contact::Vendor => {
                                health.record_success(now);
                                reached_vendor = true;
                            }
                            Contact::Skipped => health.clear_failures(),
                            Contact::Cached => {}
                        }
                        for update in updates {
                            v.state.apply(update);
                        }
                    }
                    Err(e) => {
                        warn!(vin, resource = %kind, error = %e, "resource fetch failed");
                        health.record_failure(e.to_string());
                        failed.push(kind);
                    }
                }
            }

            v.sync.last_attempt = Some(started);
            if reached_vendor {
                v.sync.last_success = Some(now);
                v.sync.consecutive_failed_cycles = 0;
            } else if !failed.is_empty() {
                v.sync.consecutive_failed_cycles = v.sync.consecutive_failed_cycles.saturating_add(1);
            }
            v.sync.phase = SyncPhase::Idle;
            recompute(v, &policy, now);
        });

        debug!(vin, failed = failed.len(), "cycle applied");
        failed
    }

    /// End the cycle without applying anything.
    fn abort(&self, vin: &str, started: DateTime<Utc>, err: FetchError) -> CycleReport {
        if let FetchError::Auth(auth) = &err {
            self.block_on(auth);
        }
        error!(vin, error = %err, "cycle aborted, keeping previous state");

        let policy = self.config.policy_for(self.interval());
        let paused = !self.account.borrow().is_active();
        self.store.update_vehicle(vin, |v| {
            let now = Utc::now();
            v.sync.last_attempt = Some(started);
            v.sync.consecutive_failed_cycles = v.sync.consecutive_failed_cycles.saturating_add(1);
            v.sync.phase = if paused {
                SyncPhase::Paused
            } else {
                SyncPhase::Idle
            };
            recompute(v, &policy, now);
        });

        let retry_after = err.retry_after_secs().map(Duration::from_secs);
        CycleReport {
            outcome: CycleOutcome::Aborted(err),
            retry_after,
        }
    }

    /// Record that no cycle ran, but let composites age with the clock.
    fn finish_skipped(&self, vin: &str, phase: SyncPhase) {
        let policy = self.config.policy_for(self.interval());
        self.store.update_vehicle(vin, |v| {
            v.sync.phase = phase;
            recompute(v, &policy, Utc::now());
        });
    }
}

fn recompute(vehicle: &mut Vehicle, policy: &AggregationPolicy, now: DateTime<Utc>) {
    let composite = aggregate(vehicle, policy, now);
    if composite != vehicle.composite {
        debug!(
            vin = %vehicle.vin,
            connection = %composite.connection,
            health = %composite.health,
            condition = %composite.condition,
            "composite state changed"
        );
    }
    vehicle.composite = composite;
}

// ── Scheduling ──────────────────────────────────────────────────────

/// Sleep until `started + interval` (at least `floor`), following interval
/// changes. Returns `false` if cancelled.
pub(crate) async fn wait_next(
    started: Instant,
    interval_rx: &mut watch::Receiver<Duration>,
    floor: Option<Duration>,
    cancel: &CancellationToken,
) -> bool {
    let delay_for = |interval: Duration| floor.map_or(interval, |f| interval.max(f));
    let mut deadline = started + delay_for(*interval_rx.borrow_and_update());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep_until(deadline) => return true,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
                deadline = started + delay_for(*interval_rx.borrow_and_update());
            }
        }
    }
}

/// Per-vehicle loop. Runs until cancelled or the vehicle leaves the store.
pub(crate) async fn vehicle_loop(engine: Arc<SyncEngine>, vin: String, cancel: CancellationToken) {
    let mut interval_rx = engine.subscribe_interval();
    let mut account_rx = engine.subscribe_account();
    debug!(vin = %vin, "vehicle loop started");

    loop {
        let active = account_rx.borrow_and_update().is_active();
        if !active {
            engine.finish_skipped(&vin, SyncPhase::Paused);
            let started = Instant::now();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = account_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                // Keep composites ageing while paused.
                true = wait_next(started, &mut interval_rx, None, &cancel) => {}
            }
            continue;
        }

        let started = Instant::now();
        let report = engine.run_cycle(&vin).await;
        if matches!(report.outcome, CycleOutcome::UnknownVehicle) {
            break;
        }
        if let Some(retry_after) = report.retry_after {
            info!(vin = %vin, retry_after_secs = retry_after.as_secs(), "rate limited, backing off");
        }
        if !wait_next(started, &mut interval_rx, report.retry_after, &cancel).await {
            break;
        }
    }
    debug!(vin = %vin, "vehicle loop stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wait_next_follows_interval_changes() {
        let (tx, mut rx) = watch::channel(Duration::from_secs(300));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let waiter = tokio::spawn(async move {
            let done = wait_next(started, &mut rx, None, &cancel).await;
            (done, Instant::now())
        });
        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(Duration::from_secs(60)).unwrap();

        let (done, woke) = waiter.await.unwrap();
        assert!(done);
        assert_eq!(woke - started, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_next_honours_floor() {
        let (_tx, mut rx) = watch::channel(Duration::from_secs(300));
        let cancel = CancellationToken::new();
        let started = Instant::now();
        assert!(wait_next(started, &mut rx, Some(Duration::from_secs(900)), &cancel).await);
        assert_eq!(Instant::now() - started, Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_next_stops_on_cancel() {
        let (_tx, mut rx) = watch::channel(Duration::from_secs(300));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!wait_next(Instant::now(), &mut rx, None, &cancel).await);
    }

    #[test]
    fn blocked_statuses() {
        assert!(!AccountStatus::SignedOut.is_blocked());
        assert!(AccountStatus::Active.is_active());
        assert!(
            AccountStatus::ConsentRequired {
                message: "terms".into(),
                consent_url: None,
            }
            .is_blocked()
        );
    }
}
