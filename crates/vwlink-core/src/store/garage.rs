// ── Garage reconciliation ──
//
// Applies a fresh vehicle list to the store: new vehicles are added,
// known ones keep their synced state, vanished ones are removed.

use std::collections::BTreeSet;

use vwlink_api::models::RawVehicle;

use super::DataStore;
use crate::model::Vehicle;

/// What a garage refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GarageChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl DataStore {
    /// Upsert every listed vehicle, then prune the ones no longer listed.
    ///
    /// Upsert-then-prune keeps subscribers from seeing a transient empty
    /// garage.
    pub(crate) fn apply_garage<'a>(
        &self,
        listed: impl IntoIterator<Item = &'a RawVehicle>,
    ) -> GarageChange {
        let mut change = GarageChange::default();
        let mut seen = BTreeSet::new();

        for raw in listed {
            seen.insert(raw.vin.clone());
            match self.vehicle(&raw.vin) {
                Some(known) if known.nickname == raw.nickname && known.model == raw.model => {}
                Some(_) => {
                    self.update_vehicle(&raw.vin, |v| {
                        v.nickname.clone_from(&raw.nickname);
                        v.model.clone_from(&raw.model);
                    });
                }
                None => {
                    self.vehicles.upsert(Vehicle::discovered(
                        raw.vin.clone(),
                        raw.nickname.clone(),
                        raw.model.clone(),
                    ));
                    change.added.push(raw.vin.clone());
                }
            }
        }

        for vin in self.vehicles.keys() {
            if !seen.contains(&vin) {
                self.vehicles.remove(&vin);
                change.removed.push(vin);
            }
        }
        change
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::SyncPhase;

    fn raw(vin: &str, nickname: Option<&str>) -> RawVehicle {
        RawVehicle {
            vin: vin.into(),
            nickname: nickname.map(Into::into),
            model: Some("ID.3".into()),
        }
    }

    #[test]
    fn reconcile_adds_keeps_and_removes() {
        let store = DataStore::new();
        let first = store.apply_garage(&[raw("A", None), raw("B", None)]);
        assert_eq!(first.added, vec!["A", "B"]);
        assert!(first.removed.is_empty());

        store.update_vehicle("A", |v| v.sync.phase = SyncPhase::Fetching);

        let second = store.apply_garage(&[raw("A", Some("Daily"))]);
        assert!(second.added.is_empty());
        assert_eq!(second.removed, vec!["B"]);

        let a = store.vehicle("A").unwrap();
        assert_eq!(a.nickname.as_deref(), Some("Daily"));
        assert_eq!(a.sync.phase, SyncPhase::Fetching);
        assert_eq!(store.vins(), vec!["A"]);
    }
}
