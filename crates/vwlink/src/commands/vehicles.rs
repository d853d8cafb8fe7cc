//! Vehicle list handler.

use std::sync::Arc;

use tabled::Tabled;
use vwlink_core::{Connector, ConnectorConfig, Vehicle};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct VehicleRow {
    #[tabled(rename = "VIN")]
    vin: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
}

impl From<&Arc<Vehicle>> for VehicleRow {
    fn from(v: &Arc<Vehicle>) -> Self {
        Self {
            vin: v.vin.clone(),
            name: v.nickname.clone().unwrap_or_default(),
            model: v.model.clone().unwrap_or_default(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(config: ConnectorConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let vehicles =
        Connector::oneshot(config, |connector| async move { connector.refresh_garage().await })
            .await?;

    let out = output::render_list(global.output, vehicles.as_slice(), |v| VehicleRow::from(v))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
