// ── Vendor-to-domain conversions ──
//
// Turns raw `vwlink_api` payloads into sub-state updates. Every numeric
// value is range-checked; an implausible value makes the whole sub-state
// unavailable instead of being clamped or stored. Per-field vendor errors
// become `AccessDenied`, a missing field becomes "no data".

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use vwlink_api::models::{
    AccessJob, AccessStatus, BatteryStatus, ChargingJob, ChargingSettings, ChargingStatus,
    ClimatisationJob, ClimatisationSettings, ClimatisationStatus, FuelStatusJob,
    HealthInspectionJob, MaintenanceStatus, MeasurementsJob, NaBatteryStatus, NaChargeSettings,
    NaChargeSummary, NaChargingStatus, NaClimateSettings, NaClimateStatusReport,
    NaClimateSummary, NaExteriorStatus, NaPlugStatus, NaVehicleReport, NamedStatus,
    OdometerStatus, ParkingPosition, PlugStatus, RangeStatus, RawCapability, StatusField,
    VehicleImage, WindowHeatingStatus,
};

use crate::model::{
    Battery, Capability, CapabilityId, ChargeTarget, Charging, ChargingState, ClimateSettings,
    Climatization, ClimatizationState, DoorStatus, Doors, HeatingState, ImageRef, LockState,
    Maintenance, OpenState, Plug, PlugConnection, Position, Quantity, ResourceKind, SubState,
    SubStateUpdate as U, TemperatureUnit, Unavailability, Unit, WindowHeating,
};

// ── Validation ──────────────────────────────────────────────────────

const SOC_PCT: RangeInclusive<f64> = 0.0..=100.0;
const LATITUDE: RangeInclusive<f64> = -90.0..=90.0;
const LONGITUDE: RangeInclusive<f64> = -180.0..=180.0;
const CHARGE_POWER_KW: RangeInclusive<f64> = 0.0..=500.0;
const CHARGE_RATE_KMPH: RangeInclusive<f64> = 0.0..=1000.0;
const TARGET_TEMPERATURE_C: RangeInclusive<f64> = 10.0..=35.0;
const ODOMETER_KM: RangeInclusive<f64> = 0.0..=2_000_000.0;
const RANGE_KM: RangeInclusive<f64> = 0.0..=2000.0;
const REMAINING_MIN: RangeInclusive<f64> = 0.0..=10_080.0;

const KM_PER_MILE: f64 = 1.609_344;

type Checked<T> = Result<T, Unavailability>;

fn checked(field: &'static str, value: f64, range: &RangeInclusive<f64>) -> Checked<f64> {
    if value.is_finite() && range.contains(&value) {
        Ok(value)
    } else {
        info!(
            target: "vwlink::validation",
            field,
            value,
            min = range.start(),
            max = range.end(),
            "discarding out-of-range value"
        );
        Err(Unavailability::OutOfRange { field, value })
    }
}

fn checked_opt(
    field: &'static str,
    value: Option<f64>,
    range: &RangeInclusive<f64>,
) -> Checked<Option<f64>> {
    value.map(|v| checked(field, v, range)).transpose()
}

fn required<T>(value: Option<T>) -> Checked<T> {
    value.ok_or(Unavailability::NoData)
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn after_minutes(from: DateTime<Utc>, minutes: f64) -> DateTime<Utc> {
    from + Duration::seconds((minutes * 60.0).round() as i64)
}

// ── Status fields ───────────────────────────────────────────────────

/// Raw values that carry the car's own capture timestamp.
trait Captured {
    fn captured_at(&self) -> DateTime<Utc>;
}

macro_rules! captured {
    ($($ty:ty),+ $(,)?) => {
        $(impl Captured for $ty {
            fn captured_at(&self) -> DateTime<Utc> {
                self.car_captured_timestamp
            }
        })+
    };
}

captured!(
    AccessStatus,
    BatteryStatus,
    ChargingStatus,
    ChargingSettings,
    PlugStatus,
    ClimatisationStatus,
    ClimatisationSettings,
    OdometerStatus,
    RangeStatus,
    MaintenanceStatus,
    WindowHeatingStatus,
    NaBatteryStatus,
    NaChargingStatus,
    NaChargeSettings,
    NaPlugStatus,
    NaClimateStatusReport,
    NaClimateSettings,
);

/// A payload block that is either missing or converts to a value.
fn block_state<R: Captured, T>(
    raw: Option<&R>,
    fetched_at: DateTime<Utc>,
    convert: impl FnOnce(&R) -> Checked<T>,
) -> SubState<T> {
    let Some(raw) = raw else {
        return SubState::no_data(fetched_at);
    };
    match convert(raw) {
        Ok(value) => SubState::present(value, Some(raw.captured_at()), fetched_at),
        Err(reason) => SubState::Unavailable {
            reason,
            since: fetched_at,
        },
    }
}

fn field_state<R: Captured, T>(
    field: Option<&StatusField<R>>,
    fetched_at: DateTime<Utc>,
    convert: impl FnOnce(&R) -> Checked<T>,
) -> SubState<T> {
    let Some(field) = field else {
        return SubState::no_data(fetched_at);
    };
    if let Some(err) = &field.error {
        return SubState::AccessDenied {
            code: err.code,
            message: err
                .message
                .clone()
                .or_else(|| err.info.clone())
                .unwrap_or_else(|| "refused by vendor".into()),
            since: fetched_at,
        };
    }
    block_state(field.value.as_ref(), fetched_at, convert)
}

// ── Access ──────────────────────────────────────────────────────────

fn has_flag(status: &NamedStatus, flag: &str) -> bool {
    status.status.iter().any(|s| s.eq_ignore_ascii_case(flag))
}

fn door_status(status: &NamedStatus) -> DoorStatus {
    let lock = if has_flag(status, "locked") {
        LockState::Locked
    } else if has_flag(status, "unlocked") {
        LockState::Unlocked
    } else {
        LockState::Unknown
    };
    let open = if has_flag(status, "open") {
        OpenState::Open
    } else if has_flag(status, "closed") {
        OpenState::Closed
    } else {
        OpenState::Unknown
    };
    DoorStatus { lock, open }
}

fn doors_from(raw: &AccessStatus) -> Doors {
    let doors: BTreeMap<String, DoorStatus> = raw
        .doors
        .iter()
        .filter(|d| !has_flag(d, "unsupported"))
        .map(|d| (d.name.clone(), door_status(d)))
        .collect();

    let lock = match raw.door_lock_status.as_deref() {
        Some("locked") => LockState::Locked,
        Some("unlocked") => LockState::Unlocked,
        _ => derived_lock(&doors),
    };
    let windows = raw
        .windows
        .iter()
        .filter(|w| !has_flag(w, "unsupported"))
        .map(|w| {
            if has_flag(w, "open") {
                OpenState::Open
            } else if has_flag(w, "closed") {
                OpenState::Closed
            } else {
                OpenState::Unknown
            }
        });

    Doors {
        lock,
        open: derived_open(&doors),
        windows_open: windows_open(windows),
        doors,
    }
}

fn derived_lock(doors: &BTreeMap<String, DoorStatus>) -> LockState {
    if doors.is_empty() {
        LockState::Unknown
    } else if doors.values().any(|d| d.lock == LockState::Unlocked) {
        LockState::Unlocked
    } else if doors.values().all(|d| d.lock == LockState::Locked) {
        LockState::Locked
    } else {
        LockState::Unknown
    }
}

fn derived_open(doors: &BTreeMap<String, DoorStatus>) -> OpenState {
    if doors.values().any(|d| d.open == OpenState::Open) {
        OpenState::Open
    } else if !doors.is_empty() && doors.values().all(|d| d.open == OpenState::Closed) {
        OpenState::Closed
    } else {
        OpenState::Unknown
    }
}

fn windows_open(windows: impl Iterator<Item = OpenState>) -> Option<bool> {
    let windows: Vec<OpenState> = windows.collect();
    if windows.contains(&OpenState::Open) {
        Some(true)
    } else if !windows.is_empty() && windows.iter().all(|w| *w == OpenState::Closed) {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn access_updates(job: Option<&AccessJob>, fetched_at: DateTime<Utc>) -> Vec<U> {
    let field = job.and_then(|j| j.access_status.as_ref());
    vec![U::Doors(field_state(field, fetched_at, |raw| Ok(doors_from(raw))))]
}

// ── Charging ────────────────────────────────────────────────────────

fn charging_state(raw: &str) -> ChargingState {
    match raw {
        "off" | "notReadyForCharging" => ChargingState::Off,
        "readyForCharging" | "chargePurposeReachedAndNotConservationCharging" => {
            ChargingState::ReadyForCharging
        }
        "conservation" | "chargePurposeReachedAndConservation" => ChargingState::Conservation,
        "charging" => ChargingState::Charging,
        "discharging" => ChargingState::Discharging,
        "error" => ChargingState::Error,
        "unsupported" => ChargingState::Unsupported,
        other => {
            info!(state = other, "unknown charging state");
            ChargingState::Unknown
        }
    }
}

fn battery_from(raw: &BatteryStatus) -> Checked<Battery> {
    let soc = checked("battery.soc", required(raw.current_soc_pct)?, &SOC_PCT)?;
    let range = checked_opt("battery.electric_range", raw.cruising_range_electric_km, &RANGE_KM)?;
    Ok(Battery {
        soc: Quantity::new(soc, Unit::Percent, 1.0),
        electric_range: range.map(|km| Quantity::new(km, Unit::Kilometers, 1.0)),
    })
}

fn charging_from(raw: &ChargingStatus) -> Checked<Charging> {
    let state = charging_state(required(raw.charging_state.as_deref())?);
    let power = checked_opt("charging.power", raw.charge_power_kw, &CHARGE_POWER_KW)?;
    let rate = checked_opt("charging.rate", raw.charge_rate_kmph, &CHARGE_RATE_KMPH)?;
    let remaining = checked_opt(
        "charging.remaining_minutes",
        raw.remaining_time_to_complete_min,
        &REMAINING_MIN,
    )?;
    Ok(Charging {
        state,
        charge_type: raw.charge_type.clone().filter(|t| t != "invalid"),
        power: power.map(|kw| Quantity::new(kw, Unit::Kilowatts, 0.1)),
        rate: rate.map(|kmph| Quantity::new(kmph, Unit::KilometersPerHour, 0.1)),
        estimated_completion: remaining
            .filter(|m| *m > 0.0)
            .map(|m| after_minutes(raw.car_captured_timestamp, m)),
    })
}

fn plug(connection: Option<&str>, lock: Option<&str>, power: Option<&str>) -> Checked<Plug> {
    let connection = match required(connection)?.to_ascii_lowercase().as_str() {
        "connected" => PlugConnection::Connected,
        "disconnected" => PlugConnection::Disconnected,
        _ => PlugConnection::Unknown,
    };
    let lock = match lock.map(str::to_ascii_lowercase).as_deref() {
        Some("locked") => LockState::Locked,
        Some("unlocked") => LockState::Unlocked,
        _ => LockState::Unknown,
    };
    let external_power = match power.map(str::to_ascii_lowercase).as_deref() {
        Some("available" | "ready" | "active") => Some(true),
        Some("unavailable") => Some(false),
        _ => None,
    };
    Ok(Plug {
        connection,
        lock,
        external_power,
    })
}

fn plug_from(raw: &PlugStatus) -> Checked<Plug> {
    plug(
        raw.plug_connection_state.as_deref(),
        raw.plug_lock_state.as_deref(),
        raw.external_power.as_deref(),
    )
}

fn charge_target_from(raw: &ChargingSettings) -> Checked<ChargeTarget> {
    let target = checked("charging.target_soc", required(raw.target_soc_pct)?, &SOC_PCT)?;
    Ok(ChargeTarget {
        target_soc: Quantity::new(target, Unit::Percent, 1.0),
    })
}

pub(crate) fn charging_updates(job: Option<&ChargingJob>, fetched_at: DateTime<Utc>) -> Vec<U> {
    vec![
        U::Battery(field_state(
            job.and_then(|j| j.battery_status.as_ref()),
            fetched_at,
            battery_from,
        )),
        U::Charging(field_state(
            job.and_then(|j| j.charging_status.as_ref()),
            fetched_at,
            charging_from,
        )),
        U::Plug(field_state(
            job.and_then(|j| j.plug_status.as_ref()),
            fetched_at,
            plug_from,
        )),
        U::ChargeTarget(field_state(
            job.and_then(|j| j.charging_settings.as_ref()),
            fetched_at,
            charge_target_from,
        )),
    ]
}

// ── Climatisation ───────────────────────────────────────────────────

fn climatization(
    state: Option<&str>,
    remaining_min: Option<f64>,
    captured_at: DateTime<Utc>,
) -> Checked<Climatization> {
    let state = match required(state)?.to_ascii_lowercase().as_str() {
        "off" => ClimatizationState::Off,
        "heating" => ClimatizationState::Heating,
        "cooling" => ClimatizationState::Cooling,
        "ventilation" => ClimatizationState::Ventilation,
        _ => ClimatizationState::Unknown,
    };
    let remaining = checked_opt("climatization.remaining_minutes", remaining_min, &REMAINING_MIN)?;
    Ok(Climatization {
        state,
        estimated_completion: remaining
            .filter(|m| *m > 0.0)
            .map(|m| after_minutes(captured_at, m)),
    })
}

fn climatization_from(raw: &ClimatisationStatus) -> Checked<Climatization> {
    climatization(
        raw.climatisation_state.as_deref(),
        raw.remaining_climatisation_time_min,
        raw.car_captured_timestamp,
    )
}

fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

fn temperature_unit(raw: Option<&str>) -> Option<TemperatureUnit> {
    // The vendor has shipped both spellings.
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("celsius") => Some(TemperatureUnit::Celsius),
        Some("farenheit" | "fahrenheit") => Some(TemperatureUnit::Fahrenheit),
        _ => None,
    }
}

fn climate_settings(
    celsius: f64,
    unit_in_car: Option<TemperatureUnit>,
    without_external_power: Option<bool>,
) -> Checked<ClimateSettings> {
    let celsius = checked(
        "climatization.target_temperature",
        celsius,
        &TARGET_TEMPERATURE_C,
    )?;
    Ok(ClimateSettings {
        target_temperature: Quantity::new(celsius, Unit::Celsius, 0.5),
        unit_in_car,
        without_external_power,
    })
}

fn climate_settings_from(raw: &ClimatisationSettings) -> Checked<ClimateSettings> {
    let celsius = match (raw.target_temperature_c, raw.target_temperature_f) {
        (Some(c), _) => c,
        (None, Some(f)) => fahrenheit_to_celsius(f),
        (None, None) => return Err(Unavailability::NoData),
    };
    climate_settings(
        celsius,
        temperature_unit(raw.unit_in_car.as_deref()),
        raw.climatisation_without_external_power,
    )
}

fn heating_state(raw: Option<&str>) -> HeatingState {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("on") => HeatingState::On,
        Some("off") => HeatingState::Off,
        Some("invalid") => HeatingState::Invalid,
        _ => HeatingState::Unknown,
    }
}

fn window_heating_from(raw: &WindowHeatingStatus) -> Checked<WindowHeating> {
    let windows: BTreeMap<String, HeatingState> = raw
        .window_heating_status
        .iter()
        .map(|w| {
            (
                w.window_location.clone(),
                heating_state(w.window_heating_state.as_deref()),
            )
        })
        .collect();
    if windows.is_empty() {
        return Err(Unavailability::NoData);
    }
    let state = if windows.values().any(|s| *s == HeatingState::On) {
        HeatingState::On
    } else if windows.values().all(|s| *s == HeatingState::Invalid) {
        HeatingState::Invalid
    } else {
        HeatingState::Off
    };
    Ok(WindowHeating { state, windows })
}

pub(crate) fn climatisation_updates(
    job: Option<&ClimatisationJob>,
    fetched_at: DateTime<Utc>,
) -> Vec<U> {
    vec![
        U::Climatization(field_state(
            job.and_then(|j| j.climatisation_status.as_ref()),
            fetched_at,
            climatization_from,
        )),
        U::ClimateSettings(field_state(
            job.and_then(|j| j.climatisation_settings.as_ref()),
            fetched_at,
            climate_settings_from,
        )),
        U::WindowHeating(field_state(
            job.and_then(|j| j.window_heating_status.as_ref()),
            fetched_at,
            window_heating_from,
        )),
    ]
}

// ── Measurements, range, maintenance ────────────────────────────────

pub(crate) fn measurements_updates(
    job: Option<&MeasurementsJob>,
    fetched_at: DateTime<Utc>,
) -> Vec<U> {
    let field = job.and_then(|j| j.odometer_status.as_ref());
    vec![U::Odometer(field_state(field, fetched_at, |raw| odometer(raw.odometer)))]
}

fn odometer(km: Option<f64>) -> Checked<Quantity> {
    let km = checked("odometer", required(km)?, &ODOMETER_KM)?;
    Ok(Quantity::new(km, Unit::Kilometers, 1.0))
}

fn total_range(km: Option<f64>) -> Checked<Quantity> {
    let km = checked("range.total", required(km)?, &RANGE_KM)?;
    Ok(Quantity::new(km, Unit::Kilometers, 1.0))
}

pub(crate) fn fuel_status_updates(job: Option<&FuelStatusJob>, fetched_at: DateTime<Utc>) -> Vec<U> {
    let field = job.and_then(|j| j.range_status.as_ref());
    vec![U::Range(field_state(field, fetched_at, |raw| total_range(raw.total_range_km)))]
}

pub(crate) fn maintenance_updates(
    job: Option<&HealthInspectionJob>,
    fetched_at: DateTime<Utc>,
) -> Vec<U> {
    let field = job.and_then(|j| j.maintenance_status.as_ref());
    vec![U::Maintenance(field_state(field, fetched_at, |raw| {
        let due = [
            raw.inspection_due_days,
            raw.inspection_due_km,
            raw.oil_service_due_days,
            raw.oil_service_due_km,
        ];
        if due.iter().all(Option::is_none) {
            return Err(Unavailability::NoData);
        }
        let maintenance = Maintenance {
            inspection_due_days: raw.inspection_due_days,
            inspection_due_km: raw.inspection_due_km,
            oil_service_due_days: raw.oil_service_due_days,
            oil_service_due_km: raw.oil_service_due_km,
        };
        Ok(maintenance)
    }))]
}

// ── North America ───────────────────────────────────────────────────

/// A value read from the NA status report, which has one timestamp for
/// the whole document.
fn report_state<T>(
    report: &NaVehicleReport,
    fetched_at: DateTime<Utc>,
    convert: impl FnOnce(&NaVehicleReport) -> Checked<T>,
) -> SubState<T> {
    match convert(report) {
        Ok(value) => SubState::present(value, report.captured_at(), fetched_at),
        Err(reason) => SubState::Unavailable {
            reason,
            since: fetched_at,
        },
    }
}

/// Map entries with a state string. `NOTAVAILABLE` and the numeric
/// timestamp entries are dropped.
fn na_states(map: &BTreeMap<String, serde_json::Value>) -> impl Iterator<Item = (&String, &str)> {
    map.iter()
        .filter_map(|(name, value)| Some((name, value.as_str()?)))
        .filter(|(_, state)| !state.eq_ignore_ascii_case("notavailable"))
}

fn na_open(state: &str) -> OpenState {
    match state.to_ascii_uppercase().as_str() {
        "OPEN" => OpenState::Open,
        "CLOSED" => OpenState::Closed,
        _ => OpenState::Unknown,
    }
}

fn na_doors_from(raw: &NaExteriorStatus) -> Checked<Doors> {
    let unknown = DoorStatus {
        lock: LockState::Unknown,
        open: OpenState::Unknown,
    };
    let mut doors: BTreeMap<String, DoorStatus> = BTreeMap::new();
    for (name, state) in na_states(&raw.door_status) {
        doors.entry(name.clone()).or_insert(unknown).open = na_open(state);
    }
    for (name, state) in na_states(&raw.door_lock_status) {
        let lock = match state.to_ascii_uppercase().as_str() {
            "LOCKED" => LockState::Locked,
            "UNLOCKED" => LockState::Unlocked,
            _ => LockState::Unknown,
        };
        doors.entry(name.clone()).or_insert(unknown).lock = lock;
    }
    let windows: Vec<OpenState> = na_states(&raw.window_status)
        .map(|(_, state)| na_open(state))
        .collect();

    if doors.is_empty() && windows.is_empty() && raw.secure.is_none() {
        return Err(Unavailability::NoData);
    }
    let lock = match raw.secure.as_deref() {
        Some(secure) if secure.eq_ignore_ascii_case("secure") => LockState::Locked,
        Some(_) => LockState::Unlocked,
        None => derived_lock(&doors),
    };
    Ok(Doors {
        lock,
        open: derived_open(&doors),
        windows_open: windows_open(windows.into_iter()),
        doors,
    })
}

/// `cruiseRangeUnits` is `KM` or miles.
fn na_range_km(report: &NaVehicleReport) -> Option<f64> {
    let power = report.power_status.as_ref()?;
    let range = power.cruise_range?;
    let in_km = power
        .cruise_range_units
        .as_deref()
        .is_some_and(|u| u.eq_ignore_ascii_case("km"));
    Some(if in_km { range } else { range * KM_PER_MILE })
}

/// Updates for every resource the NA status report serves.
pub(crate) fn na_report_updates(
    kind: ResourceKind,
    report: &NaVehicleReport,
    fetched_at: DateTime<Utc>,
) -> Vec<U> {
    match kind {
        ResourceKind::Access => vec![U::Doors(match &report.exterior_status {
            Some(exterior) => report_state(report, fetched_at, |_| na_doors_from(exterior)),
            None => SubState::no_data(fetched_at),
        })],
        ResourceKind::Measurements => vec![U::Odometer(report_state(report, fetched_at, |r| {
            odometer(r.current_mileage)
        }))],
        ResourceKind::FuelStatus => vec![U::Range(report_state(report, fetched_at, |r| {
            total_range(na_range_km(r))
        }))],
        ResourceKind::Maintenance => {
            maintenance_updates(report.vehicle_health_inspection.as_ref(), fetched_at)
        }
        _ => Vec::new(),
    }
}

fn na_charging_from(raw: &NaChargingStatus) -> Checked<Charging> {
    let state = match required(raw.current_charge_state.as_deref())? {
        "chargingHVBattery" => ChargingState::Charging,
        other => charging_state(other),
    };
    let power = checked_opt("charging.power", raw.charge_power, &CHARGE_POWER_KW)?;
    let remaining = checked_opt(
        "charging.remaining_minutes",
        raw.remaining_charging_time_to_complete,
        &REMAINING_MIN,
    )?;
    Ok(Charging {
        state,
        charge_type: raw.charge_type.clone().filter(|t| t != "invalid"),
        power: power.map(|kw| Quantity::new(kw, Unit::Kilowatts, 0.1)),
        rate: None,
        estimated_completion: remaining
            .filter(|m| *m > 0.0)
            .map(|m| after_minutes(raw.car_captured_timestamp, m)),
    })
}

pub(crate) fn na_charging_updates(summary: &NaChargeSummary, fetched_at: DateTime<Utc>) -> Vec<U> {
    vec![
        U::Battery(block_state(summary.battery_status.as_ref(), fetched_at, |raw| {
            let soc = checked("battery.soc", required(raw.current_soc_pct)?, &SOC_PCT)?;
            Ok(Battery {
                soc: Quantity::new(soc, Unit::Percent, 1.0),
                electric_range: None,
            })
        })),
        U::Charging(block_state(
            summary.charging_status.as_ref(),
            fetched_at,
            na_charging_from,
        )),
        U::Plug(block_state(summary.plug_status.as_ref(), fetched_at, |raw| {
            plug(
                raw.plug_connection_state.as_deref(),
                raw.plug_lock_state.as_deref(),
                raw.infrastructure_state.as_deref(),
            )
        })),
        U::ChargeTarget(block_state(summary.charge_settings.as_ref(), fetched_at, |raw| {
            let target = checked(
                "charging.target_soc",
                required(raw.target_soc_percentage)?,
                &SOC_PCT,
            )?;
            Ok(ChargeTarget {
                target_soc: Quantity::new(target, Unit::Percent, 1.0),
            })
        })),
    ]
}

fn na_climate_settings_from(raw: &NaClimateSettings) -> Checked<ClimateSettings> {
    let target = required(raw.target_temperature.as_ref())?;
    let value = required(target.temperature)?;
    let unit = temperature_unit(target.unit.as_deref());
    let celsius = if unit == Some(TemperatureUnit::Fahrenheit) {
        fahrenheit_to_celsius(value)
    } else {
        value
    };
    climate_settings(celsius, unit, raw.climatisation_without_external_power)
}

pub(crate) fn na_climatisation_updates(
    summary: &NaClimateSummary,
    fetched_at: DateTime<Utc>,
) -> Vec<U> {
    vec![
        U::Climatization(block_state(
            summary.climate_status_report.as_ref(),
            fetched_at,
            |raw| {
                climatization(
                    raw.climate_status_ind.as_deref(),
                    raw.remaining_climatisation_time_min,
                    raw.car_captured_timestamp,
                )
            },
        )),
        U::ClimateSettings(block_state(
            summary.climate_settings.as_ref(),
            fetched_at,
            na_climate_settings_from,
        )),
        U::WindowHeating(field_state(
            summary.window_heating_status.as_ref(),
            fetched_at,
            window_heating_from,
        )),
    ]
}

// ── Position & images ───────────────────────────────────────────────

fn position_from(raw: &ParkingPosition) -> Checked<Position> {
    let latitude = checked("position.latitude", required(raw.lat)?, &LATITUDE)?;
    let longitude = checked("position.longitude", required(raw.lon)?, &LONGITUDE)?;
    Ok(Position {
        latitude,
        longitude,
    })
}

/// `None` means the vendor reported that no position is available.
pub(crate) fn position_update(raw: Option<&ParkingPosition>, fetched_at: DateTime<Utc>) -> U {
    let Some(raw) = raw else {
        return U::Position(SubState::no_data(fetched_at));
    };
    U::Position(match position_from(raw) {
        Ok(position) => SubState::present(position, Some(raw.car_captured_timestamp), fetched_at),
        Err(reason) => SubState::Unavailable {
            reason,
            since: fetched_at,
        },
    })
}

pub(crate) fn images_update(raw: &[VehicleImage], fetched_at: DateTime<Utc>) -> U {
    if raw.is_empty() {
        return U::Images(SubState::no_data(fetched_at));
    }
    let images = raw.iter().cloned().map(ImageRef::from).collect();
    U::Images(SubState::present(images, None, fetched_at))
}

impl From<VehicleImage> for ImageRef {
    fn from(raw: VehicleImage) -> Self {
        Self {
            id: raw.id,
            url: raw.url,
        }
    }
}

// ── Whole-resource markers ──────────────────────────────────────────

/// State applied to every sub-state a resource owns.
#[derive(Debug, Clone)]
pub(crate) enum Blanket {
    Unsupported,
    Denied {
        message: String,
        since: DateTime<Utc>,
    },
}

impl Blanket {
    fn sub<T>(&self) -> SubState<T> {
        match self {
            Self::Unsupported => SubState::Unsupported,
            Self::Denied { message, since } => SubState::AccessDenied {
                code: None,
                message: message.clone(),
                since: *since,
            },
        }
    }
}

pub(crate) fn blanket_updates(kind: ResourceKind, blanket: &Blanket) -> Vec<U> {
    match kind {
        ResourceKind::Access => vec![U::Doors(blanket.sub())],
        ResourceKind::Charging => vec![
            U::Battery(blanket.sub()),
            U::Charging(blanket.sub()),
            U::Plug(blanket.sub()),
            U::ChargeTarget(blanket.sub()),
        ],
        ResourceKind::Climatisation => vec![
            U::Climatization(blanket.sub()),
            U::ClimateSettings(blanket.sub()),
            U::WindowHeating(blanket.sub()),
        ],
        ResourceKind::Measurements => vec![U::Odometer(blanket.sub())],
        ResourceKind::FuelStatus => vec![U::Range(blanket.sub())],
        ResourceKind::Maintenance => vec![U::Maintenance(blanket.sub())],
        ResourceKind::ParkingPosition => vec![U::Position(blanket.sub())],
        ResourceKind::Images => vec![U::Images(blanket.sub())],
        ResourceKind::VehicleList | ResourceKind::Capabilities => Vec::new(),
    }
}

// ── Capabilities ────────────────────────────────────────────────────

impl From<RawCapability> for Capability {
    fn from(raw: RawCapability) -> Self {
        Self {
            id: CapabilityId::parse(&raw.id),
            expires_at: raw.expiration_date,
            user_disabling_allowed: raw.user_disabling_allowed.unwrap_or(false),
            status_codes: raw.status,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use vwlink_api::models::SelectiveStatus;

    use super::*;

    fn status(value: serde_json::Value) -> SelectiveStatus {
        serde_json::from_value(value).unwrap()
    }

    fn now() -> DateTime<Utc> {
        "2026-03-01T10:05:00Z".parse().unwrap()
    }

    #[test]
    fn access_maps_doors_and_overall_state() {
        let raw = status(json!({
            "access": { "accessStatus": { "value": {
                "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                "doorLockStatus": "unlocked",
                "doors": [
                    { "name": "frontLeft", "status": ["unlocked", "closed"] },
                    { "name": "trunk", "status": ["locked", "open"] },
                    { "name": "rearRight", "status": ["unsupported"] }
                ],
                "windows": [{ "name": "frontLeft", "status": ["closed"] }]
            }}}
        }));
        let updates = access_updates(raw.access.as_ref(), now());
        let U::Doors(SubState::Present(reading)) = &updates[0] else {
            panic!("expected doors reading, got {updates:?}");
        };
        let doors = &reading.value;
        assert_eq!(doors.lock, LockState::Unlocked);
        assert_eq!(doors.open, OpenState::Open);
        assert_eq!(doors.doors.len(), 2);
        assert_eq!(doors.windows_open, Some(false));
        assert!(doors.is_unsecured());
        assert_eq!(reading.captured_at, Some("2026-03-01T10:00:00Z".parse().unwrap()));
    }

    #[test]
    fn charging_normalizes_and_keeps_field_errors() {
        let raw = status(json!({
            "charging": {
                "batteryStatus": { "value": {
                    "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                    "currentSOC_pct": 80.6,
                    "cruisingRangeElectric_km": 312
                }},
                "chargingStatus": { "value": {
                    "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                    "chargingState": "charging",
                    "chargePower_kW": 10.94,
                    "remainingChargingTimeToComplete_min": 90
                }},
                "chargingSettings": { "error": { "message": "forbidden", "code": 4111 } }
            }
        }));
        let updates = charging_updates(raw.charging.as_ref(), now());

        let U::Battery(SubState::Present(battery)) = &updates[0] else {
            panic!("expected battery, got {:?}", updates[0]);
        };
        assert!((battery.value.soc.value - 81.0).abs() < f64::EPSILON);

        let U::Charging(SubState::Present(charging)) = &updates[1] else {
            panic!("expected charging, got {:?}", updates[1]);
        };
        assert_eq!(charging.value.state, ChargingState::Charging);
        assert!((charging.value.power.unwrap().value - 10.9).abs() < 1e-9);
        assert_eq!(
            charging.value.estimated_completion,
            Some("2026-03-01T11:30:00Z".parse().unwrap())
        );

        // Plug missing from the payload entirely.
        assert!(matches!(
            updates[2],
            U::Plug(SubState::Unavailable {
                reason: Unavailability::NoData,
                ..
            })
        ));
        assert!(matches!(
            &updates[3],
            U::ChargeTarget(SubState::AccessDenied { code: Some(4111), .. })
        ));
    }

    #[test]
    fn out_of_range_soc_is_rejected_not_clamped() {
        let raw = status(json!({
            "charging": { "batteryStatus": { "value": {
                "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                "currentSOC_pct": 142
            }}}
        }));
        let updates = charging_updates(raw.charging.as_ref(), now());
        assert_eq!(
            updates[0],
            U::Battery(SubState::Unavailable {
                reason: Unavailability::OutOfRange {
                    field: "battery.soc",
                    value: 142.0
                },
                since: now(),
            })
        );
    }

    #[test]
    fn fahrenheit_settings_normalize_to_half_degree_celsius() {
        let raw = status(json!({
            "climatisation": { "climatisationSettings": { "value": {
                "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                "targetTemperature_F": 72,
                "unitInCar": "farenheit"
            }}}
        }));
        let updates = climatisation_updates(raw.climatisation.as_ref(), now());
        let U::ClimateSettings(SubState::Present(settings)) = &updates[1] else {
            panic!("expected settings, got {:?}", updates[1]);
        };
        assert!((settings.value.target_temperature.value - 22.0).abs() < f64::EPSILON);
        assert_eq!(settings.value.unit_in_car, Some(TemperatureUnit::Fahrenheit));
    }

    #[test]
    fn position_validates_coordinates() {
        let fetched = now();
        let ok = ParkingPosition {
            car_captured_timestamp: fetched,
            lat: Some(52.42),
            lon: Some(10.78),
        };
        assert!(matches!(
            position_update(Some(&ok), fetched),
            U::Position(SubState::Present(_))
        ));

        let bad = ParkingPosition {
            lat: Some(95.0),
            ..ok
        };
        assert!(matches!(
            position_update(Some(&bad), fetched),
            U::Position(SubState::Unavailable {
                reason: Unavailability::OutOfRange { field: "position.latitude", .. },
                ..
            })
        ));

        assert_eq!(
            position_update(None, fetched),
            U::Position(SubState::no_data(fetched))
        );
    }

    #[test]
    fn blanket_covers_every_owned_sub_state() {
        let updates = blanket_updates(ResourceKind::Charging, &Blanket::Unsupported);
        assert_eq!(updates.len(), 4);
        assert!(updates.iter().all(|u| matches!(
            u,
            U::Battery(SubState::Unsupported)
                | U::Charging(SubState::Unsupported)
                | U::Plug(SubState::Unsupported)
                | U::ChargeTarget(SubState::Unsupported)
        )));
    }

    #[test]
    fn unknown_capability_ids_survive_conversion() {
        let raw = RawCapability {
            id: "departureTimers".into(),
            expiration_date: None,
            user_disabling_allowed: Some(true),
            status: vec![1004],
        };
        let capability = Capability::from(raw);
        assert_eq!(capability.id, CapabilityId::Other("departureTimers".into()));
        assert!(!capability.is_active(now()));
    }
    #[test]
    fn window_heating_is_on_when_any_window_heats() {
        let raw = status(json!({
            "climatisation": { "windowHeatingStatus": { "value": {
                "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                "windowHeatingStatus": [
                    { "windowLocation": "front", "windowHeatingState": "off" },
                    { "windowLocation": "rear", "windowHeatingState": "on" }
                ]
            }}}
        }));
        let updates = climatisation_updates(raw.climatisation.as_ref(), now());
        let U::WindowHeating(SubState::Present(heating)) = &updates[2] else {
            panic!("expected window heating, got {:?}", updates[2]);
        };
        assert_eq!(heating.value.state, HeatingState::On);
        assert_eq!(heating.value.windows["front"], HeatingState::Off);

        let invalid = window_heating_from(&WindowHeatingStatus {
            car_captured_timestamp: now(),
            window_heating_status: serde_json::from_value(json!([
                { "windowLocation": "front", "windowHeatingState": "invalid" }
            ]))
            .unwrap(),
        })
        .unwrap();
        assert_eq!(invalid.state, HeatingState::Invalid);
    }

    #[test]
    fn na_report_maps_doors_range_and_odometer() {
        let report: NaVehicleReport = serde_json::from_value(json!({
            "clampStateTimestamp": 1_772_359_200_000_i64,
            "currentMileage": 20_500,
            "powerStatus": { "cruiseRange": 100, "cruiseRangeUnits": "MI" },
            "exteriorStatus": {
                "secure": "UNSECURE",
                "doorStatus": {
                    "frontLeft": "OPEN",
                    "rearLeft": "NOTAVAILABLE",
                    "doorStatusTimestamp": 1_772_359_200_000_i64
                },
                "doorLockStatus": { "frontLeft": "UNLOCKED" },
                "windowStatus": { "frontLeft": "CLOSED" }
            }
        }))
        .unwrap();

        let updates = na_report_updates(ResourceKind::Access, &report, now());
        let U::Doors(SubState::Present(doors)) = &updates[0] else {
            panic!("expected doors, got {updates:?}");
        };
        assert_eq!(doors.value.lock, LockState::Unlocked);
        assert_eq!(doors.value.open, OpenState::Open);
        assert_eq!(doors.value.doors.len(), 1);
        assert_eq!(doors.value.windows_open, Some(false));
        assert_eq!(doors.captured_at, Some("2026-03-01T10:00:00Z".parse().unwrap()));

        let updates = na_report_updates(ResourceKind::FuelStatus, &report, now());
        let U::Range(SubState::Present(range)) = &updates[0] else {
            panic!("expected range, got {updates:?}");
        };
        assert!((range.value.value - 161.0).abs() < f64::EPSILON);

        let updates = na_report_updates(ResourceKind::Measurements, &report, now());
        assert!(matches!(&updates[0], U::Odometer(SubState::Present(_))));
    }

    #[test]
    fn na_charge_summary_recognizes_hv_battery_charging() {
        let summary: NaChargeSummary = serde_json::from_value(json!({
            "batteryStatus": { "carCapturedTimestamp": 1_772_359_200_000_i64, "currentSOCPct": 55 },
            "chargingStatus": {
                "carCapturedTimestamp": 1_772_359_200_000_i64,
                "currentChargeState": "chargingHVBattery",
                "chargePower": 7.2,
                "remainingChargingTimeToComplete": 30
            },
            "plugStatus": {
                "carCapturedTimestamp": 1_772_359_200_000_i64,
                "plugConnectionState": "CONNECTED",
                "plugLockState": "LOCKED",
                "infrastructureState": "READY"
            }
        }))
        .unwrap();
        let updates = na_charging_updates(&summary, now());

        let U::Charging(SubState::Present(charging)) = &updates[1] else {
            panic!("expected charging, got {:?}", updates[1]);
        };
        assert_eq!(charging.value.state, ChargingState::Charging);
        assert_eq!(
            charging.value.estimated_completion,
            Some("2026-03-01T10:30:00Z".parse().unwrap())
        );
        let U::Plug(SubState::Present(plug)) = &updates[2] else {
            panic!("expected plug, got {:?}", updates[2]);
        };
        assert_eq!(plug.value.connection, PlugConnection::Connected);
        assert_eq!(plug.value.external_power, Some(true));
        assert_eq!(updates[3], U::ChargeTarget(SubState::no_data(now())));
    }

    #[test]
    fn na_climate_settings_convert_fahrenheit() {
        let summary: NaClimateSummary = serde_json::from_value(json!({
            "climateSettings": {
                "carCapturedTimestamp": 1_772_359_200_000_i64,
                "targetTemperature": { "temperature": 72, "unit": "fahrenheit" }
            }
        }))
        .unwrap();
        let updates = na_climatisation_updates(&summary, now());
        let U::ClimateSettings(SubState::Present(settings)) = &updates[1] else {
            panic!("expected settings, got {:?}", updates[1]);
        };
        assert!((settings.value.target_temperature.value - 22.0).abs() < f64::EPSILON);
        assert_eq!(updates[2], U::WindowHeating(SubState::no_data(now())));
    }
}
