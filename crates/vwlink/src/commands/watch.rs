//! Long-running watch: synchronize in the background and print changes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use vwlink_core::{AccountStatus, Composite, Connector, ConnectorConfig, Vehicle};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util::sub_state;

/// What a printed line reflects; a vehicle is printed again only when this
/// changes.
#[derive(PartialEq)]
struct Seen {
    attempt: Option<DateTime<Utc>>,
    composite: Composite,
}

fn line(v: &Vehicle, color: bool) -> String {
    let at = v.sync.last_attempt.map_or_else(
        || "-".into(),
        |at| at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    format!(
        "{at}  {}  {:<16}  {:<18}  {}",
        v.vin,
        output::paint_connection(v.composite.connection, color),
        output::paint_condition(v.composite.condition, color),
        sub_state(&v.state.battery, |b| b.soc.to_string()),
    )
}

fn report_account(status: &AccountStatus) {
    match status {
        AccountStatus::ConsentRequired { consent_url, .. } => eprintln!(
            "account paused: accept the vendor terms at {}",
            consent_url.as_deref().unwrap_or("the vendor portal")
        ),
        AccountStatus::InvalidCredentials { message } => {
            eprintln!("account paused: {message}");
        }
        AccountStatus::Active | AccountStatus::SignedOut => {}
    }
}

fn print_changes(
    snapshot: &[Arc<Vehicle>],
    seen: &mut HashMap<String, Seen>,
    only: Option<&str>,
    global: &GlobalOpts,
    color: bool,
) -> Result<(), CliError> {
    for vehicle in snapshot {
        if only.is_some_and(|vin| vin != vehicle.vin) || vehicle.sync.last_attempt.is_none() {
            continue;
        }
        let now = Seen {
            attempt: vehicle.sync.last_attempt,
            composite: vehicle.composite,
        };
        if seen.get(&vehicle.vin) == Some(&now) {
            continue;
        }
        seen.insert(vehicle.vin.clone(), now);

        let out = match global.output {
            OutputFormat::Table => line(vehicle, color),
            OutputFormat::Json | OutputFormat::JsonCompact => {
                serde_json::to_string(vehicle.as_ref())?
            }
        };
        output::print_output(&out, global.quiet);
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    config: ConnectorConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let connector = Connector::new(config)?;
    connector.start().await?;
    if let Some(ref vin) = args.vin {
        if connector.vehicle(vin).is_none() {
            connector.stop().await;
            return Err(CliError::NotFound {
                resource_type: "vehicle".into(),
                identifier: vin.clone(),
                list_command: "vehicles".into(),
            });
        }
    }
    if !global.quiet {
        eprintln!(
            "watching {} vehicle(s) every {}s, Ctrl-C to stop",
            connector.store().vehicle_count(),
            connector.interval().as_secs()
        );
    }

    let color = output::should_color(global.color);
    let mut vehicles = connector.vehicles();
    let mut account = connector.account_status();
    let mut seen: HashMap<String, Seen> = HashMap::new();

    let result = loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            changed = account.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                report_account(&account.borrow_and_update());
            }
            snapshot = vehicles.changed() => {
                let Some(snapshot) = snapshot else {
                    break Ok(());
                };
                if let Err(e) = print_changes(&snapshot, &mut seen, args.vin.as_deref(), global, color) {
                    break Err(e);
                }
            }
        }
    };

    connector.stop().await;
    result
}
