//! Remote command handlers: lock, unlock, climatisation, window heating,
//! charging, wake.

use vwlink_core::{CommandKind, CommandRecord, Connector, ConnectorConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

fn detail(record: &CommandRecord) -> String {
    let mut lines = vec![
        format!("Command: {}", record.kind.name()),
        format!("VIN:     {}", record.vin),
        format!("Result:  {}", record.phase),
    ];
    if let Some(ref request) = record.vendor_request_id {
        lines.push(format!("Request: {request}"));
    }
    let took = (record.updated_at - record.submitted_at).num_seconds();
    lines.push(format!("Took:    {took}s"));
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

/// Run one cycle so capabilities and position are known, then submit the
/// command and wait for its outcome.
pub async fn handle(
    config: ConnectorConfig,
    vin: String,
    kind: CommandKind,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    tracing::debug!(%vin, command = kind.name(), "submitting command");
    let record = Connector::oneshot(config, |connector| async move {
        connector.refresh_vehicle(&vin).await?;
        connector.execute(&vin, kind).await
    })
    .await?;

    let out = output::render_single(global.output, &record, detail)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
