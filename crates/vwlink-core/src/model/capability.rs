// ── Capability domain types ──

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use strum::EnumString;

/// Vendor status codes that switch a capability off: deactivated, not yet
/// licensed, disabled by the user, missing operation.
pub const INACTIVE_STATUS_CODES: [i64; 4] = [1001, 1003, 1004, 1007];

/// Vendor capability identifier. Ids this crate does not act on are kept
/// verbatim in [`CapabilityId::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum CapabilityId {
    Access,
    Charging,
    Climatisation,
    Measurements,
    FuelStatus,
    VehicleHealthInspection,
    ParkingPosition,
    HonkAndFlash,
    VehicleWakeUpTrigger,
    #[strum(default)]
    Other(String),
}

impl CapabilityId {
    pub fn parse(id: &str) -> Self {
        Self::from_str(id).unwrap_or_else(|_| Self::Other(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Access => "access",
            Self::Charging => "charging",
            Self::Climatisation => "climatisation",
            Self::Measurements => "measurements",
            Self::FuelStatus => "fuelStatus",
            Self::VehicleHealthInspection => "vehicleHealthInspection",
            Self::ParkingPosition => "parkingPosition",
            Self::HonkAndFlash => "honkAndFlash",
            Self::VehicleWakeUpTrigger => "vehicleWakeUpTrigger",
            Self::Other(id) => id,
        }
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CapabilityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One licensed feature of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_disabling_allowed: bool,
    pub status_codes: Vec<i64>,
}

impl Capability {
    /// Inactive capabilities gate exactly like absent ones.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let expired = self.expires_at.is_some_and(|at| at <= now);
        let switched_off = self
            .status_codes
            .iter()
            .any(|code| INACTIVE_STATUS_CODES.contains(code));
        !expired && !switched_off
    }
}

/// Capabilities of one vehicle, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    by_id: BTreeMap<CapabilityId, Capability>,
}

impl CapabilitySet {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            by_id: capabilities.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn get(&self, id: &CapabilityId) -> Option<&Capability> {
        self.by_id.get(id)
    }

    pub fn is_active(&self, id: &CapabilityId, now: DateTime<Utc>) -> bool {
        self.by_id.get(id).is_some_and(|c| c.is_active(now))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.by_id.values())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn capability(id: &str, codes: Vec<i64>, expires_at: Option<DateTime<Utc>>) -> Capability {
        Capability {
            id: CapabilityId::parse(id),
            expires_at,
            user_disabling_allowed: false,
            status_codes: codes,
        }
    }

    #[test]
    fn parses_known_and_preserves_unknown_ids() {
        assert_eq!(CapabilityId::parse("honkAndFlash"), CapabilityId::HonkAndFlash);
        assert_eq!(
            CapabilityId::parse("vehicleWakeUpTrigger"),
            CapabilityId::VehicleWakeUpTrigger
        );
        let other = CapabilityId::parse("batteryChargingCare");
        assert_eq!(other, CapabilityId::Other("batteryChargingCare".into()));
        assert_eq!(other.to_string(), "batteryChargingCare");
    }

    #[test]
    fn status_codes_and_expiry_deactivate() {
        let now = Utc::now();
        assert!(capability("access", vec![], None).is_active(now));
        assert!(!capability("access", vec![1004], None).is_active(now));
        assert!(capability("access", vec![2001], None).is_active(now));
        assert!(!capability("access", vec![], Some(now - Duration::days(1))).is_active(now));
        assert!(capability("access", vec![], Some(now + Duration::days(1))).is_active(now));
    }

    #[test]
    fn set_lookup_treats_missing_as_inactive() {
        let now = Utc::now();
        let set = CapabilitySet::new([capability("charging", vec![], None)]);
        assert!(set.is_active(&CapabilityId::Charging, now));
        assert!(!set.is_active(&CapabilityId::ParkingPosition, now));
    }
}
