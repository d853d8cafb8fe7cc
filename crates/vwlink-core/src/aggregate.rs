// ── State aggregator ──
//
// Composite states come from explicit, ordered rule tables: the first rule
// whose predicate holds decides, and every table ends in a fallback. Rules
// read `Facts` extracted from one vehicle snapshot and the clock, so the
// outcome does not depend on the order in which sub-states were updated.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{
    CapabilityId, ChargingState, Composite, ConnectionState, HealthState, ResourceKind,
    Vehicle, VehicleCondition,
};

/// Service warnings start this many days or km before a service is due.
pub const SERVICE_DUE_DAYS: i64 = 30;
pub const SERVICE_DUE_KM: i64 = 1000;

/// Thresholds the rules compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationPolicy {
    /// No successful cycle for this long means the vehicle is offline.
    pub offline_after: Duration,
    /// A sub-state older than this no longer counts as fresh.
    pub stale_after: Duration,
    /// Consecutive failures after which a resource degrades the vehicle.
    pub failure_threshold: u32,
}

impl AggregationPolicy {
    /// Defaults derived from the sync interval: stale after two missed
    /// cycles, offline after three.
    pub fn for_interval(interval: Duration, failure_threshold: u32) -> Self {
        Self {
            offline_after: interval.saturating_mul(3),
            stale_after: interval.saturating_mul(2),
            failure_threshold,
        }
    }
}

fn ago(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(span)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Everything the rule tables look at, precomputed from a vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Facts {
    pub attempted: bool,
    pub ever_succeeded: bool,
    pub succeeded_recently: bool,
    pub failure_streak_at_threshold: bool,
    pub any_access_denied: bool,
    pub any_resource_failing: bool,
    pub all_expected_fresh: bool,
    pub maintenance_supported: bool,
    pub maintenance_present: bool,
    pub service_overdue: bool,
    pub service_due_soon: bool,
    pub charging_error: bool,
    pub charging: bool,
    pub climatizing: bool,
    pub doors_unsecured: bool,
    pub doors_secured: bool,
}

impl Facts {
    pub fn gather(vehicle: &Vehicle, policy: &AggregationPolicy, now: DateTime<Utc>) -> Self {
        let sync = &vehicle.sync;
        let state = &vehicle.state;
        let fresh_cutoff = ago(now, policy.stale_after);

        let expected: Vec<ResourceKind> = ResourceKind::POLLED
            .into_iter()
            .filter(|kind| {
                kind.capability()
                    .is_none_or(|cap| vehicle.capabilities.is_active(&cap, now))
            })
            .collect();

        let maintenance = state.maintenance.value();

        Self {
            attempted: sync.last_attempt.is_some(),
            ever_succeeded: sync.last_success.is_some(),
            succeeded_recently: sync
                .last_success
                .is_some_and(|at| at >= ago(now, policy.offline_after)),
            failure_streak_at_threshold: sync.consecutive_failed_cycles
                >= policy.failure_threshold,
            any_access_denied: ResourceKind::POLLED
                .into_iter()
                .any(|kind| state.resource_view(kind).any_denied()),
            any_resource_failing: ResourceKind::POLLED.into_iter().any(|kind| {
                sync.resource(kind)
                    .is_some_and(|h| h.consecutive_failures >= policy.failure_threshold)
            }),
            all_expected_fresh: expected
                .iter()
                .all(|kind| state.resource_view(*kind).settled_since(fresh_cutoff)),
            maintenance_supported: vehicle
                .capabilities
                .is_active(&CapabilityId::VehicleHealthInspection, now),
            maintenance_present: maintenance.is_some(),
            service_overdue: maintenance.is_some_and(crate::model::Maintenance::is_overdue),
            service_due_soon: maintenance
                .is_some_and(|m| m.is_due_within(SERVICE_DUE_DAYS, SERVICE_DUE_KM)),
            charging_error: state
                .charging
                .value()
                .is_some_and(|c| c.state == ChargingState::Error),
            charging: state
                .charging
                .value()
                .is_some_and(|c| c.state == ChargingState::Charging),
            climatizing: state
                .climatization
                .value()
                .is_some_and(|c| c.state.is_active()),
            doors_unsecured: state.doors.value().is_some_and(crate::model::Doors::is_unsecured),
            doors_secured: state.doors.value().is_some_and(crate::model::Doors::is_secured),
        }
    }
}

/// One row of a rule table.
pub struct Rule<I, S> {
    pub outcome: S,
    pub name: &'static str,
    pub applies: fn(&I) -> bool,
}

fn first_match<I, S: Copy>(rules: &[Rule<I, S>], input: &I, fallback: S) -> S {
    rules
        .iter()
        .find(|rule| (rule.applies)(input))
        .map_or(fallback, |rule| rule.outcome)
}

// ── Connection ──────────────────────────────────────────────────────

pub const CONNECTION_RULES: &[Rule<Facts, ConnectionState>] = &[
    Rule {
        outcome: ConnectionState::Unknown,
        name: "no cycle attempted",
        applies: |f| !f.attempted,
    },
    Rule {
        outcome: ConnectionState::Offline,
        name: "vendor unreachable",
        applies: |f| f.failure_streak_at_threshold || (f.ever_succeeded && !f.succeeded_recently),
    },
    Rule {
        outcome: ConnectionState::Degraded,
        name: "vendor denies a sub-state",
        applies: |f| f.any_access_denied,
    },
    Rule {
        outcome: ConnectionState::Degraded,
        name: "resource failing repeatedly",
        applies: |f| f.any_resource_failing,
    },
    Rule {
        outcome: ConnectionState::Online,
        name: "all expected sub-states fresh",
        applies: |f| f.all_expected_fresh,
    },
];

pub fn connection_state(facts: &Facts) -> ConnectionState {
    first_match(CONNECTION_RULES, facts, ConnectionState::PartiallyOnline)
}

// ── Health ──────────────────────────────────────────────────────────

pub const HEALTH_RULES: &[Rule<Facts, HealthState>] = &[
    Rule {
        outcome: HealthState::Unsupported,
        name: "no maintenance capability",
        applies: |f| !f.maintenance_supported,
    },
    Rule {
        outcome: HealthState::Unknown,
        name: "maintenance not known",
        applies: |f| !f.maintenance_present,
    },
    Rule {
        outcome: HealthState::ServiceOverdue,
        name: "service overdue",
        applies: |f| f.service_overdue,
    },
    Rule {
        outcome: HealthState::ServiceDue,
        name: "service due soon",
        applies: |f| f.service_due_soon,
    },
];

pub fn health_state(facts: &Facts) -> HealthState {
    first_match(HEALTH_RULES, facts, HealthState::Ok)
}

// ── Condition ───────────────────────────────────────────────────────

/// Condition rules also see the two composites computed before them.
#[derive(Debug, Clone, Copy)]
pub struct ConditionFacts {
    pub facts: Facts,
    pub connection: ConnectionState,
    pub health: HealthState,
}

pub const CONDITION_RULES: &[Rule<ConditionFacts, VehicleCondition>] = &[
    Rule {
        outcome: VehicleCondition::Unreachable,
        name: "offline",
        applies: |c| c.connection == ConnectionState::Offline,
    },
    Rule {
        outcome: VehicleCondition::AttentionRequired,
        name: "service overdue or charging fault",
        applies: |c| c.health == HealthState::ServiceOverdue || c.facts.charging_error,
    },
    Rule {
        outcome: VehicleCondition::Unsecured,
        name: "unlocked or open",
        applies: |c| c.facts.doors_unsecured,
    },
    Rule {
        outcome: VehicleCondition::Charging,
        name: "charging",
        applies: |c| c.facts.charging,
    },
    Rule {
        outcome: VehicleCondition::Climatizing,
        name: "climatizing",
        applies: |c| c.facts.climatizing,
    },
    Rule {
        outcome: VehicleCondition::Secured,
        name: "locked and closed",
        applies: |c| c.facts.doors_secured,
    },
];

pub fn vehicle_condition(input: &ConditionFacts) -> VehicleCondition {
    first_match(CONDITION_RULES, input, VehicleCondition::Unknown)
}

/// Compute all composites for a vehicle snapshot.
pub fn aggregate(vehicle: &Vehicle, policy: &AggregationPolicy, now: DateTime<Utc>) -> Composite {
    let facts = Facts::gather(vehicle, policy, now);
    let connection = connection_state(&facts);
    let health = health_state(&facts);
    let condition = vehicle_condition(&ConditionFacts {
        facts,
        connection,
        health,
    });
    Composite {
        connection,
        health,
        condition,
    }
}
