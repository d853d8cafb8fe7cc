// Vendor payload types
//
// These mirror the JSON the cloud returns, field for field. Everything is
// optional because the vendor drops keys freely depending on vehicle
// generation and account license. Normalization into the vehicle model
// happens in vwlink-core.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{ "data": ... }` wrapper used by most endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

// ── Vehicles & capabilities ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVehicle {
    pub vin: String,
    pub nickname: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCapability {
    pub id: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub user_disabling_allowed: Option<bool>,
    #[serde(default)]
    pub status: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityList {
    #[serde(default)]
    pub capabilities: Vec<RawCapability>,
}

// ── Selective status ─────────────────────────────────────────────────

/// One status field: either a value or a vendor error, never both.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusField<T> {
    pub value: Option<T>,
    pub error: Option<FieldError>,
}

/// Per-field error, typically a missing license or a privacy setting.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub message: Option<String>,
    pub code: Option<i64>,
    pub group: Option<i64>,
    pub info: Option<String>,
}

/// Response of `selectivestatus?jobs=...`. Only requested jobs are present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectiveStatus {
    pub access: Option<AccessJob>,
    pub charging: Option<ChargingJob>,
    pub climatisation: Option<ClimatisationJob>,
    pub measurements: Option<MeasurementsJob>,
    pub fuel_status: Option<FuelStatusJob>,
    pub vehicle_health_inspection: Option<HealthInspectionJob>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessJob {
    pub access_status: Option<StatusField<AccessStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    pub overall_status: Option<String>,
    pub door_lock_status: Option<String>,
    #[serde(default)]
    pub doors: Vec<NamedStatus>,
    #[serde(default)]
    pub windows: Vec<NamedStatus>,
}

/// A door or window with its status flags (`locked`, `closed`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct NamedStatus {
    pub name: String,
    #[serde(default)]
    pub status: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingJob {
    pub battery_status: Option<StatusField<BatteryStatus>>,
    pub charging_status: Option<StatusField<ChargingStatus>>,
    pub charging_settings: Option<StatusField<ChargingSettings>>,
    pub plug_status: Option<StatusField<PlugStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(rename = "currentSOC_pct")]
    pub current_soc_pct: Option<f64>,
    #[serde(rename = "cruisingRangeElectric_km")]
    pub cruising_range_electric_km: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    pub charging_state: Option<String>,
    pub charge_type: Option<String>,
    #[serde(rename = "chargePower_kW")]
    pub charge_power_kw: Option<f64>,
    #[serde(rename = "chargeRate_kmph")]
    pub charge_rate_kmph: Option<f64>,
    #[serde(rename = "remainingChargingTimeToComplete_min")]
    pub remaining_time_to_complete_min: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSettings {
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(rename = "targetSOC_pct")]
    pub target_soc_pct: Option<f64>,
    pub max_charge_current_ac: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlugStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    pub plug_connection_state: Option<String>,
    pub plug_lock_state: Option<String>,
    pub external_power: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimatisationJob {
    pub climatisation_status: Option<StatusField<ClimatisationStatus>>,
    pub climatisation_settings: Option<StatusField<ClimatisationSettings>>,
    pub window_heating_status: Option<StatusField<WindowHeatingStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimatisationStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    pub climatisation_state: Option<String>,
    #[serde(rename = "remainingClimatisationTime_min")]
    pub remaining_climatisation_time_min: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimatisationSettings {
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(rename = "targetTemperature_C")]
    pub target_temperature_c: Option<f64>,
    #[serde(rename = "targetTemperature_F")]
    pub target_temperature_f: Option<f64>,
    pub unit_in_car: Option<String>,
    pub climatisation_without_external_power: Option<bool>,
}

/// Shared by both regions: the North American climate summary embeds the
/// same block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowHeatingStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub window_heating_status: Vec<WindowHeating>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowHeating {
    pub window_location: String,
    pub window_heating_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementsJob {
    pub odometer_status: Option<StatusField<OdometerStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdometerStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    pub odometer: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelStatusJob {
    pub range_status: Option<StatusField<RangeStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(rename = "totalRange_km")]
    pub total_range_km: Option<f64>,
    pub car_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInspectionJob {
    pub maintenance_status: Option<StatusField<MaintenanceStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatus {
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(rename = "inspectionDue_days")]
    pub inspection_due_days: Option<i64>,
    #[serde(rename = "inspectionDue_km")]
    pub inspection_due_km: Option<i64>,
    #[serde(rename = "oilServiceDue_days")]
    pub oil_service_due_days: Option<i64>,
    #[serde(rename = "oilServiceDue_km")]
    pub oil_service_due_km: Option<i64>,
}

// ── Parking position & images ────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingPosition {
    pub car_captured_timestamp: DateTime<Utc>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleImage {
    pub id: String,
    pub url: String,
    pub file_name: Option<String>,
}

// ── North America ────────────────────────────────────────────────────
//
// The NA backend has its own status endpoints with flatter payloads and
// millisecond epoch timestamps. Some responses come wrapped in `data`,
// some do not.

/// Body that may or may not be wrapped in `{ "data": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MaybeData<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> MaybeData<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NaGarage {
    #[serde(default)]
    pub vehicles: Vec<NaGarageVehicle>,
}

/// Garage entry. Capabilities and the preview image come inline instead of
/// from separate endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaGarageVehicle {
    pub vin: String,
    /// Id used in every NA status path in place of the VIN.
    pub vehicle_id: String,
    pub vehicle_nick_name: Option<String>,
    pub model_name: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<RawCapability>,
    #[serde(rename = "representativeImgURLComplete")]
    pub representative_img_url: Option<String>,
}

/// Response of `rvs/v1/vehicle/{vehicleId}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaVehicleReport {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub clamp_state_timestamp: Option<DateTime<Utc>>,
    /// Misspelled by the vendor.
    #[serde(rename = "instrumentCluserTime")]
    pub instrument_cluster_time: Option<DateTime<Utc>>,
    pub power_status: Option<NaPowerStatus>,
    pub current_mileage: Option<f64>,
    pub exterior_status: Option<NaExteriorStatus>,
    pub vehicle_health_inspection: Option<HealthInspectionJob>,
}

impl NaVehicleReport {
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.clamp_state_timestamp.or(self.instrument_cluster_time)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaPowerStatus {
    pub cruise_range: Option<f64>,
    /// `KM`, anything else is miles.
    pub cruise_range_units: Option<String>,
    pub fuel_percent_remaining: Option<f64>,
}

/// Door, lock and window maps keyed by position (`frontLeft`, ...). The
/// maps also carry timestamp entries with numeric values, which is why the
/// values stay untyped here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaExteriorStatus {
    #[serde(default)]
    pub door_status: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub door_lock_status: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub window_status: BTreeMap<String, serde_json::Value>,
    pub secure: Option<String>,
}

/// Response of `ev/v1/vehicle/{vehicleId}/climate/summary`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaClimateSummary {
    pub climate_status_report: Option<NaClimateStatusReport>,
    pub climate_settings: Option<NaClimateSettings>,
    pub window_heating_status: Option<StatusField<WindowHeatingStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaClimateStatusReport {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub car_captured_timestamp: DateTime<Utc>,
    pub climate_status_ind: Option<String>,
    pub remaining_climatisation_time_min: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaClimateSettings {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub car_captured_timestamp: DateTime<Utc>,
    pub target_temperature: Option<NaTemperature>,
    pub climatisation_without_external_power: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NaTemperature {
    pub temperature: Option<f64>,
    /// `celsius` or `fahrenheit`.
    pub unit: Option<String>,
}

/// Response of `ev/v1/vehicle/{vehicleId}/charge/summary`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaChargeSummary {
    pub battery_status: Option<NaBatteryStatus>,
    pub charging_status: Option<NaChargingStatus>,
    pub charge_settings: Option<NaChargeSettings>,
    pub plug_status: Option<NaPlugStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaBatteryStatus {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(rename = "currentSOCPct")]
    pub current_soc_pct: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaChargingStatus {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub car_captured_timestamp: DateTime<Utc>,
    pub current_charge_state: Option<String>,
    pub charge_type: Option<String>,
    /// Kilowatts.
    pub charge_power: Option<f64>,
    /// Minutes.
    pub remaining_charging_time_to_complete: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaChargeSettings {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub car_captured_timestamp: DateTime<Utc>,
    #[serde(rename = "targetSOCPercentage")]
    pub target_soc_percentage: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaPlugStatus {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub car_captured_timestamp: DateTime<Utc>,
    pub plug_connection_state: Option<String>,
    pub plug_lock_state: Option<String>,
    pub infrastructure_state: Option<String>,
}
