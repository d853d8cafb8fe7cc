//! Synchronization engine between `vwlink-api` and hosts (CLI, services).
//!
//! This crate owns the domain model and everything that keeps it current:
//!
//! - **[`Connector`]**: Facade for one account. [`start()`](Connector::start)
//!   authenticates, discovers vehicles and spawns one synchronization task
//!   per vehicle. [`Connector::oneshot()`](Connector::oneshot) runs a single
//!   interaction without background loops.
//!
//! - **[`RequestCache`]**: Freshness-windowed cache with per-key
//!   single-flight, so concurrent pollers never duplicate a vendor call.
//!
//! - **[`aggregate`]**: Pure, ordered rule tables that derive connection,
//!   health and overall condition from the sub-states of one vehicle.
//!
//! - **[`DataStore`]** / **[`VehicleStream`]**: Reactive storage of vehicles
//!   and command records; every change is published as a new snapshot.
//!
//! - **Commands**: [`Connector::submit`] checks preconditions before any
//!   network call, then tracks the vendor request through
//!   [`CommandHandle`] until it succeeds, fails or times out.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod connector;
mod convert;
pub mod dispatcher;
pub mod error;
mod fetch;
pub mod model;
pub mod store;
pub mod stream;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregate::AggregationPolicy;
pub use cache::{Freshness, RequestCache};
pub use config::ConnectorConfig;
pub use connector::{Connector, ConnectorState};
pub use dispatcher::CommandHandle;
pub use error::{AuthError, CommandError, CoreError, FailureScope, FetchError, TransientError};
pub use store::DataStore;
pub use stream::{CommandStream, SnapshotStream, VehicleStream};
pub use sync::AccountStatus;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Battery, Capability, CapabilityId, CapabilitySet, ChargeTarget, Charging, ChargingState,
    ClimateSettings, Climatization, ClimatizationState, CommandId, CommandKind, CommandPhase,
    CommandRecord, Composite, ConnectionState, DoorStatus, Doors, HealthState, HeatingState,
    ImageRef, LockState, Maintenance, OpenState, Plug, PlugConnection, Position, Quantity,
    Reading, ResourceHealth, ResourceKey, ResourceKind, SubState, SubStateUpdate, SyncPhase,
    SyncStatus, TemperatureUnit, Unavailability, Unit, Vehicle, VehicleCondition, VehicleState,
    WindowHeating,
};

// Vendor-side types hosts need to build a configuration.
pub use vwlink_api::{
    Credentials, Endpoints, FileTokenStore, MemoryTokenStore, Region, Spin, TlsMode, TokenStore,
    TransportConfig,
};
