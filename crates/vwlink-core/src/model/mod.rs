// ── Domain model ──
//
// Canonical types the connector exposes to hosts. Vendor payloads are
// turned into these by `convert`.

pub mod capability;
pub mod command;
pub mod composite;
pub mod resource;
pub mod state;
pub mod vehicle;

pub use capability::{Capability, CapabilityId, CapabilitySet};
pub use command::{CommandId, CommandKind, CommandPhase, CommandRecord};
pub use composite::{Composite, ConnectionState, HealthState, VehicleCondition};
pub use resource::{ResourceKey, ResourceKind};
pub use state::{
    Battery, ChargeTarget, Charging, ChargingState, ClimateSettings, Climatization,
    ClimatizationState, DoorStatus, Doors, HeatingState, ImageRef, LockState, Maintenance,
    OpenState, Plug, PlugConnection, Position, Quantity, Reading, SubState, SubStateUpdate,
    TemperatureUnit, Unit, Unavailability, VehicleState, WindowHeating,
};
pub use vehicle::{ResourceHealth, SyncPhase, SyncStatus, Vehicle};
