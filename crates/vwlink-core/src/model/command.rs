// ── Remote command types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::CapabilityId;
use super::resource::ResourceKind;

/// Locally assigned id for a command; vendor request ids are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A user intent to change something on the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandKind {
    Lock,
    Unlock,
    StartClimatization { target_temperature_c: Option<f64> },
    StopClimatization,
    SetClimatizationSettings { target_temperature_c: f64 },
    StartWindowHeating,
    StopWindowHeating,
    StartCharging,
    StopCharging,
    SetChargingSettings { target_soc_pct: u8 },
    WakeUp,
    HonkAndFlash { honk: bool, duration_secs: u32 },
}

/// Accepted target temperature range, in Celsius.
pub const TARGET_TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = 15.5..=30.0;

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::StartClimatization { .. } => "start_climatization",
            Self::StopClimatization => "stop_climatization",
            Self::SetClimatizationSettings { .. } => "set_climatization_settings",
            Self::StartWindowHeating => "start_window_heating",
            Self::StopWindowHeating => "stop_window_heating",
            Self::StartCharging => "start_charging",
            Self::StopCharging => "stop_charging",
            Self::SetChargingSettings { .. } => "set_charging_settings",
            Self::WakeUp => "wake_up",
            Self::HonkAndFlash { .. } => "honk_and_flash",
        }
    }

    pub fn required_capability(&self) -> CapabilityId {
        match self {
            Self::Lock | Self::Unlock => CapabilityId::Access,
            Self::StartClimatization { .. }
            | Self::StopClimatization
            | Self::SetClimatizationSettings { .. }
            | Self::StartWindowHeating
            | Self::StopWindowHeating => CapabilityId::Climatisation,
            Self::StartCharging | Self::StopCharging | Self::SetChargingSettings { .. } => {
                CapabilityId::Charging
            }
            Self::WakeUp => CapabilityId::VehicleWakeUpTrigger,
            Self::HonkAndFlash { .. } => CapabilityId::HonkAndFlash,
        }
    }

    pub fn requires_spin(&self) -> bool {
        matches!(self, Self::Lock | Self::Unlock)
    }

    /// Cached resources that are stale once this command succeeds.
    pub fn affected_resources(&self) -> &'static [ResourceKind] {
        match self {
            Self::Lock | Self::Unlock => &[ResourceKind::Access],
            Self::StartClimatization { .. }
            | Self::StopClimatization
            | Self::SetClimatizationSettings { .. }
            | Self::StartWindowHeating
            | Self::StopWindowHeating => &[ResourceKind::Climatisation],
            Self::StartCharging | Self::StopCharging | Self::SetChargingSettings { .. } => {
                &[ResourceKind::Charging]
            }
            Self::WakeUp => &ResourceKind::POLLED,
            Self::HonkAndFlash { .. } => &[],
        }
    }

    /// Parameter checks that need no vehicle data.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::StartClimatization {
                target_temperature_c: Some(t),
            }
            | Self::SetClimatizationSettings {
                target_temperature_c: t,
            } if !TARGET_TEMPERATURE_RANGE.contains(t) => Err(format!(
                "target temperature {t} °C is outside {}..={} °C",
                TARGET_TEMPERATURE_RANGE.start(),
                TARGET_TEMPERATURE_RANGE.end()
            )),
            Self::SetChargingSettings { target_soc_pct } if *target_soc_pct > 100 => {
                Err(format!("target SoC {target_soc_pct}% is above 100%"))
            }
            Self::HonkAndFlash { duration_secs, .. } if *duration_secs == 0 => {
                Err("honk/flash duration must be at least one second".into())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of a command. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandPhase {
    /// Submitted, vendor has not acknowledged yet.
    Pending,
    /// Vendor accepted and is executing.
    InProgress,
    Succeeded,
    Failed,
    TimedOut,
}

impl CommandPhase {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Succeeded | Self::Failed | Self::TimedOut => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }
}

/// Tracked state of one submitted command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub vin: String,
    pub kind: CommandKind,
    pub phase: CommandPhase,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vendor_request_id: Option<String>,
    pub error: Option<String>,
}

impl CommandRecord {
    pub fn new(vin: impl Into<String>, kind: CommandKind, now: DateTime<Utc>) -> Self {
        Self {
            id: CommandId::new(),
            vin: vin.into(),
            kind,
            phase: CommandPhase::Pending,
            submitted_at: now,
            updated_at: now,
            vendor_request_id: None,
            error: None,
        }
    }

    /// Move to `next`. Returns `false` and leaves the record untouched if
    /// that would go backwards or leave a terminal phase.
    pub fn advance(&mut self, next: CommandPhase, error: Option<String>, now: DateTime<Utc>) -> bool {
        if !self.phase.can_advance_to(next) {
            return false;
        }
        self.phase = next;
        self.error = error;
        self.updated_at = now;
        true
    }
}
