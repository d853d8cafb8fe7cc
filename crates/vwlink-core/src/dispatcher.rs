// ── Command dispatcher ──
//
// Pending → InProgress → {Succeeded, Failed, TimedOut}. Preconditions are
// checked before any network call. Submissions are serialized per vehicle;
// each accepted command is then polled by its own task until it resolves
// or the maximum wait runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vwlink_api::{CommandAck, CommandRequest, RemoteStatus};

use crate::error::{CommandError, CoreError, FailureScope, FetchError};
use crate::model::{CommandId, CommandKind, CommandPhase, CommandRecord, Vehicle};
use crate::sync::SyncEngine;

// ── CommandHandle ───────────────────────────────────────────────────

/// Tracks one submitted command until it reaches a terminal phase.
pub struct CommandHandle {
    id: CommandId,
    receiver: watch::Receiver<Arc<Vec<Arc<CommandRecord>>>>,
    cancel: CancellationToken,
}

impl CommandHandle {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Latest record for this command.
    pub fn current(&self) -> Option<Arc<CommandRecord>> {
        find(&self.receiver.borrow(), self.id)
    }

    /// Wait for the terminal phase.
    ///
    /// `Failed` and `TimedOut` come back as [`CommandError`]s; stopping the
    /// connector first yields [`CommandError::Cancelled`].
    pub async fn wait(mut self) -> Result<CommandRecord, CommandError> {
        loop {
            let record = find(&self.receiver.borrow_and_update(), self.id);
            match record {
                Some(record) if record.phase.is_terminal() => return outcome(&record),
                Some(_) => {}
                None => return Err(CommandError::Cancelled),
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(CommandError::Cancelled),
                changed = self.receiver.changed() => {
                    if changed.is_err() {
                        return Err(CommandError::Cancelled);
                    }
                }
            }
        }
    }
}

fn find(records: &[Arc<CommandRecord>], id: CommandId) -> Option<Arc<CommandRecord>> {
    records.iter().find(|r| r.id == id).cloned()
}

fn outcome(record: &CommandRecord) -> Result<CommandRecord, CommandError> {
    match record.phase {
        CommandPhase::Succeeded => Ok(record.clone()),
        CommandPhase::TimedOut => Err(CommandError::TimedOut {
            waited_secs: u64::try_from((record.updated_at - record.submitted_at).num_seconds())
                .unwrap_or(0),
        }),
        _ => Err(CommandError::VendorRejected {
            message: record
                .error
                .clone()
                .unwrap_or_else(|| "command failed".into()),
        }),
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

pub(crate) struct Dispatcher {
    engine: Arc<SyncEngine>,
    /// One submission at a time per vehicle.
    submit_locks: DashMap<String, Arc<Mutex<()>>>,
    polls: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            submit_locks: DashMap::new(),
            polls: Mutex::new(Vec::new()),
        }
    }

    /// Validate, submit and start tracking a command.
    ///
    /// Every precondition is checked before the vendor is contacted.
    pub async fn submit(
        &self,
        vin: &str,
        kind: CommandKind,
        cancel: CancellationToken,
    ) -> Result<CommandHandle, CoreError> {
        let store = self.engine.store();
        let vehicle = store.vehicle(vin).ok_or_else(|| CoreError::VehicleNotFound {
            vin: vin.to_owned(),
        })?;
        if !self.engine.account_status().is_active() {
            return Err(CoreError::AccountPaused);
        }
        let request = self.prepare(&vehicle, &kind)?;
        let name = kind.name();

        let record = CommandRecord::new(vin, kind, Utc::now());
        let id = record.id;
        let receiver = store.subscribe_commands();
        store.insert_command(record);
        store.update_vehicle(vin, |v| {
            v.in_flight_commands.insert(id);
        });
        info!(vin, command = %id, kind = name, "submitting command");

        let ack = {
            let lock = self.submit_lock(vin);
            let _serialized = lock.lock().await;
            self.engine
                .fetchers()
                .client()
                .submit_command(vin, &request)
                .await
        };

        match ack {
            Err(e) => {
                let err = FetchError::from(e);
                if let FetchError::Auth(auth) = &err {
                    self.engine.block_on(auth);
                }
                warn!(vin, command = %id, error = %err, "command submission failed");
                finish(&self.engine, id, CommandPhase::Failed, Some(err.to_string()));
                return Err(match err {
                    FetchError::Auth(auth) => CoreError::Auth(auth),
                    other => CommandError::VendorRejected {
                        message: other.to_string(),
                    }
                    .into(),
                });
            }
            Ok(CommandAck { request_id: None }) => {
                advance(&self.engine, id, CommandPhase::InProgress, None, None);
                finish(&self.engine, id, CommandPhase::Succeeded, None);
            }
            Ok(CommandAck {
                request_id: Some(request_id),
            }) => {
                advance(
                    &self.engine,
                    id,
                    CommandPhase::InProgress,
                    Some(request_id.clone()),
                    None,
                );
                let job = PollJob {
                    id,
                    vin: vin.to_owned(),
                    request_id,
                    poll_interval: self.engine.config().command_poll_interval,
                    max_wait: self.engine.config().command_timeout,
                };
                let handle = tokio::spawn(poll_command(
                    Arc::clone(&self.engine),
                    job,
                    cancel.clone(),
                ));
                let mut polls = self.polls.lock().await;
                polls.retain(|h| !h.is_finished());
                polls.push(handle);
            }
        }

        Ok(CommandHandle {
            id,
            receiver,
            cancel,
        })
    }

    /// Wait for every poll task to observe cancellation.
    pub async fn join(&self) {
        let mut polls = self.polls.lock().await;
        for handle in polls.drain(..) {
            let _ = handle.await;
        }
    }

    fn submit_lock(&self, vin: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.submit_locks
                .entry(vin.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Check preconditions and build the vendor request.
    fn prepare(&self, vehicle: &Vehicle, kind: &CommandKind) -> Result<CommandRequest, CommandError> {
        kind.validate()
            .map_err(|message| CommandError::InvalidParameter { message })?;

        let capability = kind.required_capability();
        if !vehicle.capabilities.is_active(&capability, Utc::now()) {
            return Err(CommandError::CapabilityMissing { capability });
        }

        let session = self.engine.fetchers().client().session();
        if kind.requires_spin() && session.spin().is_none() {
            return Err(CommandError::PinRequired);
        }
        let spin = || session.spin().cloned().ok_or(CommandError::PinRequired);

        Ok(match kind {
            CommandKind::Lock => CommandRequest::Lock { spin: spin()? },
            CommandKind::Unlock => CommandRequest::Unlock { spin: spin()? },
            CommandKind::StartClimatization {
                target_temperature_c,
            } => CommandRequest::StartClimatisation {
                target_temperature_c: *target_temperature_c,
            },
            CommandKind::StopClimatization => CommandRequest::StopClimatisation,
            CommandKind::SetClimatizationSettings {
                target_temperature_c,
            } => CommandRequest::ClimatisationSettings {
                target_temperature_c: *target_temperature_c,
            },
            CommandKind::StartCharging => CommandRequest::StartCharging,
            CommandKind::StopCharging => CommandRequest::StopCharging,
            CommandKind::SetChargingSettings { target_soc_pct } => {
                CommandRequest::ChargingSettings {
                    target_soc_pct: *target_soc_pct,
                }
            }
            CommandKind::StartWindowHeating => CommandRequest::WindowHeating { start: true },
            CommandKind::StopWindowHeating => CommandRequest::WindowHeating { start: false },
            CommandKind::WakeUp => CommandRequest::WakeUp,
            CommandKind::HonkAndFlash {
                honk,
                duration_secs,
            } => {
                let position = vehicle.state.position.value().ok_or_else(|| {
                    CommandError::PreconditionFailed {
                        message: "honk and flash needs a known parking position".into(),
                    }
                })?;
                CommandRequest::HonkAndFlash {
                    honk: *honk,
                    duration_secs: *duration_secs,
                    latitude: position.latitude,
                    longitude: position.longitude,
                }
            }
        })
    }
}

// ── Record transitions ──────────────────────────────────────────────

fn advance(
    engine: &SyncEngine,
    id: CommandId,
    phase: CommandPhase,
    vendor_request_id: Option<String>,
    error: Option<String>,
) -> bool {
    let mut moved = false;
    engine.store().update_command(id, |record| {
        moved = record.advance(phase, error, Utc::now());
        if moved && vendor_request_id.is_some() {
            record.vendor_request_id = vendor_request_id;
        }
    });
    moved
}

/// Move a command to a terminal phase and release the vehicle.
fn finish(engine: &SyncEngine, id: CommandId, phase: CommandPhase, error: Option<String>) {
    if !advance(engine, id, phase, None, error) {
        return;
    }
    let Some(record) = engine.store().command(id) else {
        return;
    };
    engine.store().update_vehicle(&record.vin, |v| {
        v.in_flight_commands.remove(&id);
    });

    if phase == CommandPhase::Succeeded {
        for kind in record.kind.affected_resources() {
            engine.fetchers().invalidate(&record.vin, *kind);
        }
    }
    info!(vin = %record.vin, command = %id, %phase, "command finished");
}

// ── Polling ─────────────────────────────────────────────────────────

struct PollJob {
    id: CommandId,
    vin: String,
    request_id: String,
    poll_interval: Duration,
    max_wait: Duration,
}

/// Poll the vendor until the command resolves, the wait runs out, or the
/// connector stops. Each poll call runs to completion before cancellation
/// is observed.
async fn poll_command(engine: Arc<SyncEngine>, job: PollJob, cancel: CancellationToken) {
    let deadline = Instant::now() + job.max_wait;
    let client = engine.fetchers().client().clone();

    loop {
        let now = Instant::now();
        if now >= deadline {
            warn!(vin = %job.vin, command = %job.id, "command timed out");
            finish(&engine, job.id, CommandPhase::TimedOut, None);
            return;
        }

        let pause = job.poll_interval.min(deadline - now);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(command = %job.id, "command poll cancelled");
                return;
            }
            () = tokio::time::sleep(pause) => {}
        }

        match client.command_status(&job.vin, &job.request_id).await {
            Ok(RemoteStatus::Succeeded) => {
                finish(&engine, job.id, CommandPhase::Succeeded, None);
                return;
            }
            Ok(RemoteStatus::Failed { reason }) => {
                finish(&engine, job.id, CommandPhase::Failed, Some(reason));
                return;
            }
            Ok(RemoteStatus::Queued | RemoteStatus::InProgress) => {
                debug!(command = %job.id, "command still running");
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    command = %job.id,
                    request = %job.request_id,
                    "vendor no longer knows the request"
                );
                finish(
                    &engine,
                    job.id,
                    CommandPhase::Failed,
                    Some(format!("request {} is unknown to the vendor", job.request_id)),
                );
                return;
            }
            Err(e) => {
                let err = FetchError::from(e);
                if err.scope() == FailureScope::Account {
                    if let FetchError::Auth(auth) = &err {
                        engine.block_on(auth);
                    }
                    finish(&engine, job.id, CommandPhase::Failed, Some(err.to_string()));
                    return;
                }
                warn!(command = %job.id, error = %err, "command status poll failed");
            }
        }
    }
}
