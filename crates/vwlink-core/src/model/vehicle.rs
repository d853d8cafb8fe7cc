// ── Vehicle domain type ──

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::capability::CapabilitySet;
use super::command::CommandId;
use super::composite::Composite;
use super::resource::ResourceKind;
use super::state::VehicleState;

/// Where a vehicle's synchronization loop currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Applying,
    /// Waiting for the account to become usable again.
    Paused,
}

/// Per-resource fetch bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceHealth {
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl ResourceHealth {
    pub(crate) fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_success = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    /// Nothing was requested, so earlier failures no longer apply.
    pub(crate) fn clear_failures(&mut self) {
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self, error: String) {
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Last cycle in which the vendor answered for at least one resource.
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failed_cycles: u32,
    pub resources: BTreeMap<ResourceKind, ResourceHealth>,
}

impl SyncStatus {
    pub fn resource(&self, kind: ResourceKind) -> Option<&ResourceHealth> {
        self.resources.get(&kind)
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.resources
            .values()
            .map(|h| h.consecutive_failures)
            .max()
            .unwrap_or(0)
    }
}

/// One vehicle on the account with everything the connector tracks for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub vin: String,
    pub nickname: Option<String>,
    pub model: Option<String>,
    pub capabilities: CapabilitySet,
    pub state: VehicleState,
    pub sync: SyncStatus,
    /// Derived from the fields above whenever any of them change.
    pub composite: Composite,
    pub in_flight_commands: BTreeSet<CommandId>,
}

impl Vehicle {
    pub fn discovered(vin: impl Into<String>, nickname: Option<String>, model: Option<String>) -> Self {
        Self {
            vin: vin.into(),
            nickname,
            model,
            capabilities: CapabilitySet::default(),
            state: VehicleState::default(),
            sync: SyncStatus::default(),
            composite: Composite::default(),
            in_flight_commands: BTreeSet::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.vin)
    }
}
