//! Output formatting: table and JSON.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! JSON uses serde.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use vwlink_core::{ConnectionState, HealthState, VehicleCondition};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

pub fn paint_connection(state: ConnectionState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        ConnectionState::Online => text.green().to_string(),
        ConnectionState::PartiallyOnline | ConnectionState::Degraded => text.yellow().to_string(),
        ConnectionState::Offline => text.red().to_string(),
        ConnectionState::Unknown => text.dimmed().to_string(),
    }
}

pub fn paint_condition(condition: VehicleCondition, color: bool) -> String {
    let text = condition.to_string();
    if !color {
        return text;
    }
    match condition {
        VehicleCondition::Secured => text.green().to_string(),
        VehicleCondition::Charging | VehicleCondition::Climatizing => text.cyan().to_string(),
        VehicleCondition::Unsecured | VehicleCondition::AttentionRequired => {
            text.yellow().to_string()
        }
        VehicleCondition::Unreachable => text.red().to_string(),
        VehicleCondition::Unknown => text.dimmed().to_string(),
    }
}

pub fn paint_health(health: HealthState, color: bool) -> String {
    let text = health.to_string();
    if !color {
        return text;
    }
    match health {
        HealthState::Ok => text.green().to_string(),
        HealthState::ServiceDue => text.yellow().to_string(),
        HealthState::ServiceOverdue => text.red().to_string(),
        HealthState::Unknown | HealthState::Unsupported => text.dimmed().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item detail views don't use `Tabled` derive.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}
