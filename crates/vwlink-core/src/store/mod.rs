// ── Central reactive store ──
//
// Vehicles and command records, each in a reactive collection. Every
// mutation publishes a fresh snapshot to subscribers.

mod collection;
mod garage;

use std::sync::Arc;

use tokio::sync::watch;

pub(crate) use collection::{Collection, Keyed};
pub(crate) use garage::GarageChange;

use crate::model::{CommandId, CommandRecord, Vehicle};

/// Terminal command records kept for inspection before the oldest are dropped.
const COMMAND_HISTORY: usize = 100;

impl Keyed for Vehicle {
    type Key = String;

    fn key(&self) -> String {
        self.vin.clone()
    }
}

impl Keyed for CommandRecord {
    type Key = CommandId;

    fn key(&self) -> CommandId {
        self.id
    }
}

/// Everything the connector has observed, shared by all background tasks.
pub struct DataStore {
    pub(crate) vehicles: Collection<Vehicle>,
    pub(crate) commands: Collection<CommandRecord>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            vehicles: Collection::new(),
            commands: Collection::new(),
        }
    }

    // ── Vehicles ─────────────────────────────────────────────────────

    pub fn vehicle(&self, vin: &str) -> Option<Arc<Vehicle>> {
        self.vehicles.get(vin)
    }

    pub fn vins(&self) -> Vec<String> {
        self.vehicles.keys()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicles_snapshot(&self) -> Arc<Vec<Arc<Vehicle>>> {
        self.vehicles.snapshot()
    }

    pub fn subscribe_vehicles(&self) -> watch::Receiver<Arc<Vec<Arc<Vehicle>>>> {
        self.vehicles.subscribe()
    }

    /// Mutate one vehicle as a single published change.
    pub(crate) fn update_vehicle<F>(&self, vin: &str, f: F) -> Option<Arc<Vehicle>>
    where
        F: FnOnce(&mut Vehicle),
    {
        self.vehicles.update(vin, f)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn command(&self, id: CommandId) -> Option<Arc<CommandRecord>> {
        self.commands.get(&id)
    }

    pub fn commands_snapshot(&self) -> Arc<Vec<Arc<CommandRecord>>> {
        self.commands.snapshot()
    }

    pub fn subscribe_commands(&self) -> watch::Receiver<Arc<Vec<Arc<CommandRecord>>>> {
        self.commands.subscribe()
    }

    pub(crate) fn insert_command(&self, record: CommandRecord) {
        self.commands.upsert(record);
        self.prune_commands();
    }

    pub(crate) fn update_command<F>(&self, id: CommandId, f: F) -> Option<Arc<CommandRecord>>
    where
        F: FnOnce(&mut CommandRecord),
    {
        self.commands.update(&id, f)
    }

    fn prune_commands(&self) {
        let mut finished: Vec<Arc<CommandRecord>> = self
            .commands
            .snapshot()
            .iter()
            .filter(|r| r.phase.is_terminal())
            .cloned()
            .collect();
        if finished.len() <= COMMAND_HISTORY {
            return;
        }
        finished.sort_by_key(|r| r.updated_at);
        let excess = finished.len() - COMMAND_HISTORY;
        for record in finished.iter().take(excess) {
            self.commands.remove(&record.id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::model::{CommandKind, CommandPhase};

    #[test]
    fn terminal_commands_are_pruned_oldest_first() {
        let store = DataStore::new();
        let start = Utc::now();
        let mut first = None;
        for i in 0..=COMMAND_HISTORY {
            let at = start + Duration::seconds(i64::try_from(i).unwrap());
            let mut record = CommandRecord::new("VIN", CommandKind::WakeUp, at);
            record.advance(CommandPhase::Succeeded, None, at);
            first.get_or_insert(record.id);
            store.insert_command(record);
        }
        let pending = CommandRecord::new("VIN", CommandKind::Lock, start);
        let pending_id = pending.id;
        store.insert_command(pending);

        assert_eq!(store.commands_snapshot().len(), COMMAND_HISTORY + 1);
        assert!(store.command(first.unwrap()).is_none());
        assert!(store.command(pending_id).is_some());
    }
}
