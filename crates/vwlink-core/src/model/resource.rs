use std::fmt;

use serde::Serialize;

use super::capability::CapabilityId;

/// One independently fetched and cached vendor resource.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    VehicleList,
    Capabilities,
    Images,
    Access,
    Charging,
    Climatisation,
    Measurements,
    FuelStatus,
    Maintenance,
    ParkingPosition,
}

impl ResourceKind {
    /// Resources re-fetched every cycle once their window lapses.
    pub const POLLED: [Self; 7] = [
        Self::Access,
        Self::Charging,
        Self::Climatisation,
        Self::Measurements,
        Self::FuelStatus,
        Self::Maintenance,
        Self::ParkingPosition,
    ];

    /// Everything a vehicle cycle asks for after capabilities.
    pub const PER_CYCLE: [Self; 8] = [
        Self::Access,
        Self::Charging,
        Self::Climatisation,
        Self::Measurements,
        Self::FuelStatus,
        Self::Maintenance,
        Self::ParkingPosition,
        Self::Images,
    ];

    /// `selectivestatus` job name, for resources served by that endpoint.
    pub fn status_job(self) -> Option<&'static str> {
        match self {
            Self::Access => Some("access"),
            Self::Charging => Some("charging"),
            Self::Climatisation => Some("climatisation"),
            Self::Measurements => Some("measurements"),
            Self::FuelStatus => Some("fuelStatus"),
            Self::Maintenance => Some("vehicleHealthInspection"),
            _ => None,
        }
    }

    /// Capability that must be active before the resource is requested.
    pub fn capability(self) -> Option<CapabilityId> {
        match self {
            Self::Access => Some(CapabilityId::Access),
            Self::Charging => Some(CapabilityId::Charging),
            Self::Climatisation => Some(CapabilityId::Climatisation),
            Self::Measurements => Some(CapabilityId::Measurements),
            Self::FuelStatus => Some(CapabilityId::FuelStatus),
            Self::Maintenance => Some(CapabilityId::VehicleHealthInspection),
            Self::ParkingPosition => Some(CapabilityId::ParkingPosition),
            Self::VehicleList | Self::Capabilities | Self::Images => None,
        }
    }

    /// Fetched once per vehicle lifetime unless invalidated.
    pub fn is_static(self) -> bool {
        matches!(self, Self::Capabilities | Self::Images)
    }
}

/// Cache key: the vehicle (or the account, for the vehicle list) plus the
/// resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub vin: Option<String>,
    pub kind: ResourceKind,
}

impl ResourceKey {
    pub fn account(kind: ResourceKind) -> Self {
        Self { vin: None, kind }
    }

    pub fn vehicle(vin: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            vin: Some(vin.into()),
            kind,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.vin {
            Some(vin) => write!(f, "{vin}/{}", self.kind),
            None => write!(f, "account/{}", self.kind),
        }
    }
}
