//! Command dispatch: bridges CLI args -> connector calls -> output formatting.

pub mod control;
pub mod spin;
pub mod status;
pub mod util;
pub mod vehicles;
pub mod watch;

use vwlink_core::{CommandKind, ConnectorConfig};

use crate::cli::{
    ChargingCommand, ClimateCommand, Command, GlobalOpts, SpinCommand, WindowHeatingCommand,
};
use crate::error::CliError;

/// Dispatch a vendor-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: ConnectorConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Vehicles => vehicles::handle(config, global).await,
        Command::Status(args) => status::handle(config, args.vin, global).await,
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Lock(args) => control::handle(config, args.vin, CommandKind::Lock, global).await,
        Command::Unlock(args) => {
            control::handle(config, args.vin, CommandKind::Unlock, global).await
        }
        Command::Climate(args) => {
            let (vin, kind) = match args.command {
                ClimateCommand::Start { vin, temperature } => (
                    vin,
                    CommandKind::StartClimatization {
                        target_temperature_c: temperature,
                    },
                ),
                ClimateCommand::Stop { vin } => (vin, CommandKind::StopClimatization),
            };
            control::handle(config, vin, kind, global).await
        }
        Command::WindowHeating(args) => {
            let (vin, kind) = match args.command {
                WindowHeatingCommand::Start { vin } => (vin, CommandKind::StartWindowHeating),
                WindowHeatingCommand::Stop { vin } => (vin, CommandKind::StopWindowHeating),
            };
            control::handle(config, vin, kind, global).await
        }
        Command::Charging(args) => {
            let (vin, kind) = match args.command {
                ChargingCommand::Start { vin } => (vin, CommandKind::StartCharging),
                ChargingCommand::Stop { vin } => (vin, CommandKind::StopCharging),
            };
            control::handle(config, vin, kind, global).await
        }
        Command::Wake(args) => control::handle(config, args.vin, CommandKind::WakeUp, global).await,
        Command::Spin(args) => match args.command {
            SpinCommand::Verify => spin::verify(config, global).await,
        },
        // Completions are handled before dispatch
        Command::Completions(_) => unreachable!(),
    }
}
