// ── Vehicle sub-states ──
//
// Each sub-state is independently present, unsupported, unavailable, or
// denied. "Not fetched yet" is its own variant so that hosts never mistake
// a missing capability for a reading that has not arrived.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A value together with when the car captured it and when we fetched it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading<T> {
    pub value: T,
    pub captured_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// Why a supported sub-state carries no value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unavailability {
    /// The vendor legitimately has nothing (car moving, sharing off, ...).
    NoData,
    /// The vendor sent a value outside the physically plausible range.
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubState<T> {
    NotFetched,
    /// The vehicle or account lacks the capability behind this value.
    Unsupported,
    Unavailable {
        reason: Unavailability,
        since: DateTime<Utc>,
    },
    /// The vendor refused the field (license, privacy mode).
    AccessDenied {
        code: Option<i64>,
        message: String,
        since: DateTime<Utc>,
    },
    Present(Reading<T>),
}

impl<T> Default for SubState<T> {
    fn default() -> Self {
        Self::NotFetched
    }
}

impl<T> SubState<T> {
    pub fn present(value: T, captured_at: Option<DateTime<Utc>>, fetched_at: DateTime<Utc>) -> Self {
        Self::Present(Reading {
            value,
            captured_at,
            fetched_at,
        })
    }

    pub fn no_data(since: DateTime<Utc>) -> Self {
        Self::Unavailable {
            reason: Unavailability::NoData,
            since,
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.reading().map(|r| &r.value)
    }

    pub fn reading(&self) -> Option<&Reading<T>> {
        match self {
            Self::Present(reading) => Some(reading),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Answered by the vendor at or after `cutoff`, either with a value or
    /// with a legitimate "no data".
    pub fn is_settled_since(&self, cutoff: DateTime<Utc>) -> bool {
        match self {
            Self::Present(reading) => reading.fetched_at >= cutoff,
            Self::Unavailable {
                reason: Unavailability::NoData,
                since,
            } => *since >= cutoff,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFetched => "not fetched",
            Self::Unsupported => "unsupported",
            Self::Unavailable { .. } => "unavailable",
            Self::AccessDenied { .. } => "access denied",
            Self::Present(_) => "present",
        }
    }
}

// ── Units ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[strum(to_string = "%")]
    Percent,
    #[strum(to_string = "km")]
    Kilometers,
    #[strum(to_string = "kW")]
    Kilowatts,
    #[strum(to_string = "km/h")]
    KilometersPerHour,
    #[strum(to_string = "°C")]
    Celsius,
}

/// A normalized measurement. `precision` is the step the value was rounded to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
    pub precision: f64,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit, precision: f64) -> Self {
        Self {
            value: (value / precision).round() * precision,
            unit,
            precision,
        }
    }

    fn decimals(&self) -> usize {
        if self.precision >= 1.0 {
            0
        } else if self.precision >= 0.1 {
            1
        } else {
            2
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*} {}", self.decimals(), self.value, self.unit)
    }
}

// ── Readings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OpenState {
    Open,
    Closed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DoorStatus {
    pub lock: LockState,
    pub open: OpenState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Doors {
    pub lock: LockState,
    pub open: OpenState,
    pub doors: BTreeMap<String, DoorStatus>,
    pub windows_open: Option<bool>,
}

impl Doors {
    pub fn is_secured(&self) -> bool {
        self.lock == LockState::Locked && self.open == OpenState::Closed
    }

    pub fn is_unsecured(&self) -> bool {
        self.lock == LockState::Unlocked
            || self.open == OpenState::Open
            || self.windows_open == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Battery {
    pub soc: Quantity,
    pub electric_range: Option<Quantity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChargingState {
    Off,
    ReadyForCharging,
    Charging,
    Conservation,
    Discharging,
    Error,
    Unsupported,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charging {
    pub state: ChargingState,
    pub charge_type: Option<String>,
    pub power: Option<Quantity>,
    pub rate: Option<Quantity>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlugConnection {
    Connected,
    Disconnected,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plug {
    pub connection: PlugConnection,
    pub lock: LockState,
    pub external_power: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeTarget {
    pub target_soc: Quantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClimatizationState {
    Off,
    Heating,
    Cooling,
    Ventilation,
    Unknown,
}

impl ClimatizationState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Heating | Self::Cooling | Self::Ventilation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Climatization {
    pub state: ClimatizationState,
    pub estimated_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateSettings {
    /// Always Celsius, rounded to half degrees.
    pub target_temperature: Quantity,
    pub unit_in_car: Option<TemperatureUnit>,
    pub without_external_power: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HeatingState {
    On,
    Off,
    /// The car reports the heater but not its state.
    Invalid,
    Unknown,
}

/// Front and rear window defrosters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowHeating {
    /// On if any window heats, invalid if none reports a usable state.
    pub state: HeatingState,
    pub windows: BTreeMap<String, HeatingState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Maintenance {
    pub inspection_due_days: Option<i64>,
    pub inspection_due_km: Option<i64>,
    pub oil_service_due_days: Option<i64>,
    pub oil_service_due_km: Option<i64>,
}

impl Maintenance {
    fn all_days(&self) -> impl Iterator<Item = i64> {
        [self.inspection_due_days, self.oil_service_due_days]
            .into_iter()
            .flatten()
    }

    fn all_km(&self) -> impl Iterator<Item = i64> {
        [self.inspection_due_km, self.oil_service_due_km]
            .into_iter()
            .flatten()
    }

    /// The vendor reports negative remaining days or km once a service is late.
    pub fn is_overdue(&self) -> bool {
        self.all_days().chain(self.all_km()).any(|left| left < 0)
    }

    pub fn is_due_within(&self, days: i64, km: i64) -> bool {
        self.all_days().any(|left| left <= days) || self.all_km().any(|left| left <= km)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub id: String,
    pub url: String,
}

// ── Aggregate ───────────────────────────────────────────────────────

/// Everything the connector knows about a vehicle's physical state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleState {
    pub doors: SubState<Doors>,
    pub battery: SubState<Battery>,
    pub charging: SubState<Charging>,
    pub plug: SubState<Plug>,
    pub charge_target: SubState<ChargeTarget>,
    pub climatization: SubState<Climatization>,
    pub climate_settings: SubState<ClimateSettings>,
    pub window_heating: SubState<WindowHeating>,
    pub odometer: SubState<Quantity>,
    pub range: SubState<Quantity>,
    pub maintenance: SubState<Maintenance>,
    pub position: SubState<Position>,
    pub images: SubState<Vec<ImageRef>>,
}

/// Replacement for exactly one sub-state.
#[derive(Debug, Clone, PartialEq)]
pub enum SubStateUpdate {
    Doors(SubState<Doors>),
    Battery(SubState<Battery>),
    Charging(SubState<Charging>),
    Plug(SubState<Plug>),
    ChargeTarget(SubState<ChargeTarget>),
    Climatization(SubState<Climatization>),
    ClimateSettings(SubState<ClimateSettings>),
    WindowHeating(SubState<WindowHeating>),
    Odometer(SubState<Quantity>),
    Range(SubState<Quantity>),
    Maintenance(SubState<Maintenance>),
    Position(SubState<Position>),
    Images(SubState<Vec<ImageRef>>),
}

impl VehicleState {
    pub fn apply(&mut self, update: SubStateUpdate) {
        match update {
            SubStateUpdate::Doors(s) => self.doors = s,
            SubStateUpdate::Battery(s) => self.battery = s,
            SubStateUpdate::Charging(s) => self.charging = s,
            SubStateUpdate::Plug(s) => self.plug = s,
            SubStateUpdate::ChargeTarget(s) => self.charge_target = s,
            SubStateUpdate::Climatization(s) => self.climatization = s,
            SubStateUpdate::ClimateSettings(s) => self.climate_settings = s,
            SubStateUpdate::WindowHeating(s) => self.window_heating = s,
            SubStateUpdate::Odometer(s) => self.odometer = s,
            SubStateUpdate::Range(s) => self.range = s,
            SubStateUpdate::Maintenance(s) => self.maintenance = s,
            SubStateUpdate::Position(s) => self.position = s,
            SubStateUpdate::Images(s) => self.images = s,
        }
    }

    /// Access-denied and settled checks over the sub-states a resource owns.
    pub(crate) fn resource_view(&self, kind: super::ResourceKind) -> ResourceView {
        use super::ResourceKind as K;

        fn view<T>(s: &SubState<T>) -> FieldView {
            FieldView {
                denied: s.is_access_denied(),
                settled_at: match s {
                    SubState::Present(r) => Some(r.fetched_at),
                    SubState::Unavailable {
                        reason: Unavailability::NoData,
                        since,
                    } => Some(*since),
                    _ => None,
                },
            }
        }

        let fields = match kind {
            K::Access => vec![view(&self.doors)],
            K::Charging => vec![
                view(&self.battery),
                view(&self.charging),
                view(&self.plug),
                view(&self.charge_target),
            ],
            K::Climatisation => vec![
                view(&self.climatization),
                view(&self.climate_settings),
                view(&self.window_heating),
            ],
            K::Measurements => vec![view(&self.odometer)],
            K::FuelStatus => vec![view(&self.range)],
            K::Maintenance => vec![view(&self.maintenance)],
            K::ParkingPosition => vec![view(&self.position)],
            K::Images => vec![view(&self.images)],
            K::VehicleList | K::Capabilities => Vec::new(),
        };
        ResourceView { fields }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldView {
    pub denied: bool,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResourceView {
    pub fields: Vec<FieldView>,
}

impl ResourceView {
    pub fn any_denied(&self) -> bool {
        self.fields.iter().any(|f| f.denied)
    }

    pub fn settled_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.fields
            .iter()
            .all(|f| f.settled_at.is_some_and(|at| at >= cutoff))
    }
}
