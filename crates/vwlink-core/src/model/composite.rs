// Derived vehicle states. Computed by `aggregate`, never set directly.

use serde::Serialize;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// No cycle has run yet.
    #[default]
    Unknown,
    Offline,
    Degraded,
    Online,
    PartiallyOnline,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthState {
    Unsupported,
    #[default]
    Unknown,
    ServiceOverdue,
    ServiceDue,
    Ok,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VehicleCondition {
    Unreachable,
    AttentionRequired,
    Unsecured,
    Charging,
    Climatizing,
    Secured,
    #[default]
    Unknown,
}

/// The three composites, always computed together from one vehicle snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Composite {
    pub connection: ConnectionState,
    pub health: HealthState,
    pub condition: VehicleCondition,
}
