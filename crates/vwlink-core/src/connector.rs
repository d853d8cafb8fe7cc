// ── Connector ──
//
// Full lifecycle for one account: authentication, vehicle discovery,
// one synchronization task per vehicle, command dispatch, and reactive
// access to everything the store holds.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vwlink_api::{Session, VehicleClient};

use crate::cache::RequestCache;
use crate::config::ConnectorConfig;
use crate::dispatcher::{CommandHandle, Dispatcher};
use crate::error::{CommandError, CoreError, FetchError};
use crate::fetch::Fetchers;
use crate::model::{CommandId, CommandKind, CommandRecord, Vehicle};
use crate::store::DataStore;
use crate::stream::{CommandStream, VehicleStream};
use crate::sync::{AccountStatus, CycleOutcome, SyncEngine, vehicle_loop, wait_next};

/// Connection to the vendor as a whole, independent of any one vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectorState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last login or vehicle list refresh failed.
    Error,
}

struct VehicleTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Entry point for hosts.
///
/// Cheaply cloneable via `Arc<ConnectorInner>`. Call
/// [`start()`](Self::start) to authenticate and begin background
/// synchronization, or use [`oneshot()`](Self::oneshot) for a single
/// request-response interaction.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    engine: Arc<SyncEngine>,
    dispatcher: Dispatcher,
    running: AtomicBool,
    state: watch::Sender<ConnectorState>,
    cancel: CancellationToken,
    /// Child token for the current run. Cancelled on stop, replaced on
    /// start, so a connector can be restarted.
    cancel_child: Mutex<CancellationToken>,
    vehicle_tasks: Mutex<HashMap<String, VehicleTask>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Connector {
    /// Build a connector. Does not contact the vendor.
    pub fn new(config: ConnectorConfig) -> Result<Self, CoreError> {
        let mut session = Session::new(
            config.credentials.clone(),
            config.endpoints.clone(),
            &config.transport,
        )?;
        if let Some(store) = &config.token_store {
            session = session.with_token_store(Arc::clone(store));
        }
        let client = VehicleClient::new(Arc::new(session));
        let fetchers = Fetchers::new(client, RequestCache::new());
        let store = Arc::new(DataStore::new());
        let engine = Arc::new(SyncEngine::new(fetchers, store, config));
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(ConnectorInner {
                dispatcher: Dispatcher::new(Arc::clone(&engine)),
                engine,
                running: AtomicBool::new(false),
                state: watch::channel(ConnectorState::Disconnected).0,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                vehicle_tasks: Mutex::new(HashMap::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        self.inner.engine.config()
    }

    pub fn store(&self) -> &Arc<DataStore> {
        self.inner.engine.store()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate, discover vehicles and start one loop per vehicle plus
    /// the garage loop.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.running.load(Ordering::Acquire) {
            return Ok(());
        }
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        self.set_state(ConnectorState::Connecting);
        if let Err(e) = self.connect().await {
            self.set_state(ConnectorState::Error);
            return Err(e);
        }
        self.set_state(ConnectorState::Connected);

        self.inner.running.store(true, Ordering::Release);
        {
            let mut tasks = self.inner.vehicle_tasks.lock().await;
            for vin in self.store().vins() {
                let task = spawn_vehicle(&self.inner.engine, &vin, &child);
                tasks.insert(vin, task);
            }
        }
        {
            let connector = self.clone();
            let cancel = child.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(garage_loop(connector, cancel)));
        }

        info!(
            vehicles = self.store().vehicle_count(),
            interval_secs = self.interval().as_secs(),
            "connector started"
        );
        Ok(())
    }

    /// Signal every loop and command poll to stop, then wait for them.
    ///
    /// Work already talking to the vendor finishes its current call first.
    pub async fn stop(&self) {
        self.inner.cancel_child.lock().await.cancel();
        self.inner.running.store(false, Ordering::Release);

        // The garage loop first, so it cannot hand over more tasks. Locks are
        // released before awaiting because that loop takes them too.
        self.join_background().await;
        let vehicle_tasks: Vec<VehicleTask> = self
            .inner
            .vehicle_tasks
            .lock()
            .await
            .drain()
            .map(|(_, task)| task)
            .collect();
        for task in vehicle_tasks {
            let _ = task.handle.await;
        }
        self.join_background().await;

        self.inner.dispatcher.join().await;
        self.set_state(ConnectorState::Disconnected);
        info!("connector stopped");
    }

    async fn connect(&self) -> Result<(), CoreError> {
        self.authenticate().await?;
        self.inner.engine.refresh_garage().await?;
        Ok(())
    }

    fn set_state(&self, next: ConnectorState) {
        self.inner.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "connector state changed");
            *current = next;
            true
        });
    }

    async fn join_background(&self) {
        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Log in again with the stored credentials.
    ///
    /// Clears a consent or credential block once the user has fixed it on
    /// the vendor side; paused loops resume immediately.
    pub async fn reauthenticate(&self) -> Result<(), CoreError> {
        self.authenticate().await
    }

    async fn authenticate(&self) -> Result<(), CoreError> {
        let session = self.inner.engine.fetchers().client().session();
        match session.authenticate().await {
            Ok(()) => {
                self.inner.engine.set_account(AccountStatus::Active);
                Ok(())
            }
            Err(e) => {
                let err = FetchError::from(e);
                if let FetchError::Auth(auth) = &err {
                    self.inner.engine.block_on(auth);
                }
                Err(err.into())
            }
        }
    }

    /// One-shot: authenticate, discover vehicles, run `f`, stop.
    ///
    /// No background loops run; use [`refresh_vehicle`](Self::refresh_vehicle)
    /// inside `f` to synchronize on demand.
    pub async fn oneshot<F, Fut, T>(config: ConnectorConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Connector) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let connector = Connector::new(config)?;
        connector.connect().await?;
        let result = f(connector.clone()).await;
        connector.stop().await;
        result
    }

    // ── Interval ─────────────────────────────────────────────────────

    pub fn interval(&self) -> Duration {
        self.inner.engine.interval()
    }

    /// Change the polling interval. Running loops pick it up without a
    /// restart.
    pub fn set_interval(&self, interval: Duration) -> Result<(), CoreError> {
        if interval.is_zero() {
            return Err(CoreError::Config {
                message: "polling interval must be greater than zero".into(),
            });
        }
        self.inner.engine.set_interval(interval);
        Ok(())
    }

    // ── Synchronization on demand ───────────────────────────────────

    /// Run one synchronization cycle for `vin` now and return the result.
    pub async fn refresh_vehicle(&self, vin: &str) -> Result<Arc<Vehicle>, CoreError> {
        let report = self.inner.engine.run_cycle(vin).await;
        match report.outcome {
            CycleOutcome::Applied { .. } => {
                self.vehicle(vin).ok_or_else(|| CoreError::VehicleNotFound {
                    vin: vin.to_owned(),
                })
            }
            CycleOutcome::Aborted(err) => Err(err.into()),
            CycleOutcome::AccountPaused => Err(CoreError::AccountPaused),
            CycleOutcome::UnknownVehicle => Err(CoreError::VehicleNotFound {
                vin: vin.to_owned(),
            }),
        }
    }

    /// Refresh the vehicle list now, starting or stopping vehicle loops
    /// when the connector is running.
    pub async fn refresh_garage(&self) -> Result<Arc<Vec<Arc<Vehicle>>>, CoreError> {
        self.sync_garage().await?;
        Ok(self.vehicles_snapshot())
    }

    async fn sync_garage(&self) -> Result<(), CoreError> {
        let change = self.inner.engine.refresh_garage().await?;
        if !self.inner.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let child = self.inner.cancel_child.lock().await.clone();
        let mut tasks = self.inner.vehicle_tasks.lock().await;
        for vin in &change.removed {
            if let Some(task) = tasks.remove(vin) {
                task.cancel.cancel();
                self.inner.task_handles.lock().await.push(task.handle);
            }
        }
        for vin in change.added {
            let task = spawn_vehicle(&self.inner.engine, &vin, &child);
            tasks.insert(vin, task);
        }
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Submit a command and return a handle that tracks it.
    pub async fn submit(&self, vin: &str, kind: CommandKind) -> Result<CommandHandle, CoreError> {
        let cancel = self.inner.cancel_child.lock().await.clone();
        self.inner.dispatcher.submit(vin, kind, cancel).await
    }

    /// Submit a command and wait for its terminal phase.
    pub async fn execute(&self, vin: &str, kind: CommandKind) -> Result<CommandRecord, CoreError> {
        let handle = self.submit(vin, kind).await?;
        Ok(handle.wait().await?)
    }

    /// Check the configured S-PIN with the vendor.
    pub async fn verify_spin(&self) -> Result<(), CoreError> {
        let client = self.inner.engine.fetchers().client();
        let spin = client.session().spin().ok_or(CommandError::PinRequired)?;
        client.verify_spin(spin).await?;
        debug!("S-PIN verified");
        Ok(())
    }

    // ── State observation ────────────────────────────────────────────

    /// Current [`ConnectorState`], updated on start, stop and every
    /// vehicle list refresh.
    pub fn connector_state(&self) -> watch::Receiver<ConnectorState> {
        self.inner.state.subscribe()
    }

    pub fn account_status(&self) -> watch::Receiver<AccountStatus> {
        self.inner.engine.subscribe_account()
    }

    pub fn vehicles(&self) -> VehicleStream {
        VehicleStream::new(self.store().subscribe_vehicles())
    }

    pub fn vehicle(&self, vin: &str) -> Option<Arc<Vehicle>> {
        self.store().vehicle(vin)
    }

    pub fn vehicles_snapshot(&self) -> Arc<Vec<Arc<Vehicle>>> {
        self.store().vehicles_snapshot()
    }

    pub fn commands(&self) -> CommandStream {
        CommandStream::new(self.store().subscribe_commands())
    }

    pub fn command(&self, id: CommandId) -> Result<Arc<CommandRecord>, CoreError> {
        self.store()
            .command(id)
            .ok_or_else(|| CoreError::CommandNotFound { id: id.to_string() })
    }
}

fn spawn_vehicle(engine: &Arc<SyncEngine>, vin: &str, parent: &CancellationToken) -> VehicleTask {
    let cancel = parent.child_token();
    let handle = tokio::spawn(vehicle_loop(
        Arc::clone(engine),
        vin.to_owned(),
        cancel.clone(),
    ));
    VehicleTask { cancel, handle }
}

/// Refresh the vehicle list every interval.
async fn garage_loop(connector: Connector, cancel: CancellationToken) {
    let mut interval_rx = connector.inner.engine.subscribe_interval();
    loop {
        if !wait_next(Instant::now(), &mut interval_rx, None, &cancel).await {
            break;
        }
        if !connector.inner.engine.account_status().is_active() {
            continue;
        }
        match connector.sync_garage().await {
            Ok(()) => connector.set_state(ConnectorState::Connected),
            Err(e) => {
                connector.set_state(ConnectorState::Error);
                warn!(error = %e, "garage refresh failed");
            }
        }
    }
}
