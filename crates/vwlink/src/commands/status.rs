//! One-shot vehicle status handler.

use vwlink_core::{Connector, ConnectorConfig, Maintenance, Vehicle};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util::{since, sub_state};

fn maintenance_summary(m: &Maintenance) -> String {
    let part = |label: &str, days: Option<i64>, km: Option<i64>| match (days, km) {
        (None, None) => None,
        (Some(d), None) => Some(format!("{label} in {d} d")),
        (None, Some(k)) => Some(format!("{label} in {k} km")),
        (Some(d), Some(k)) => Some(format!("{label} in {d} d / {k} km")),
    };
    [
        part("inspection", m.inspection_due_days, m.inspection_due_km),
        part("oil service", m.oil_service_due_days, m.oil_service_due_km),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(", ")
}

/// Multi-line detail view of one vehicle.
pub fn detail(v: &Vehicle, color: bool) -> String {
    let s = &v.state;
    [
        format!("VIN:          {}", v.vin),
        format!("Name:         {}", v.nickname.as_deref().unwrap_or("-")),
        format!("Model:        {}", v.model.as_deref().unwrap_or("-")),
        format!(
            "Connection:   {}",
            output::paint_connection(v.composite.connection, color)
        ),
        format!(
            "Condition:    {}",
            output::paint_condition(v.composite.condition, color)
        ),
        format!(
            "Health:       {}",
            output::paint_health(v.composite.health, color)
        ),
        format!(
            "Doors:        {}",
            sub_state(&s.doors, |d| format!("{}, {}", d.lock, d.open))
        ),
        format!(
            "Battery:      {}",
            sub_state(&s.battery, |b| match &b.electric_range {
                Some(range) => format!("{} ({range})", b.soc),
                None => b.soc.to_string(),
            })
        ),
        format!(
            "Charging:     {}",
            sub_state(&s.charging, |c| match &c.power {
                Some(power) => format!("{} at {power}", c.state),
                None => c.state.to_string(),
            })
        ),
        format!(
            "Plug:         {}",
            sub_state(&s.plug, |p| format!("{}, {}", p.connection, p.lock))
        ),
        format!(
            "Charge limit: {}",
            sub_state(&s.charge_target, |t| t.target_soc.to_string())
        ),
        format!(
            "Climate:      {}",
            sub_state(&s.climatization, |c| c.state.to_string())
        ),
        format!(
            "Target temp:  {}",
            sub_state(&s.climate_settings, |c| c.target_temperature.to_string())
        ),
        format!(
            "Defrost:      {}",
            sub_state(&s.window_heating, |w| w.state.to_string())
        ),
        format!("Odometer:     {}", sub_state(&s.odometer, ToString::to_string)),
        format!("Range:        {}", sub_state(&s.range, ToString::to_string)),
        format!(
            "Maintenance:  {}",
            sub_state(&s.maintenance, maintenance_summary)
        ),
        format!(
            "Position:     {}",
            sub_state(&s.position, |p| format!("{:.5}, {:.5}", p.latitude, p.longitude))
        ),
        format!("Last sync:    {}", since(v.sync.last_success)),
    ]
    .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    config: ConnectorConfig,
    vin: String,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let vehicle = Connector::oneshot(config, |connector| async move {
        connector.refresh_vehicle(&vin).await
    })
    .await?;

    let color = output::should_color(global.color);
    let out = output::render_single(global.output, vehicle.as_ref(), |v| detail(v, color))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
