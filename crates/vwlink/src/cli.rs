//! Clap derive structures for the `vwlink` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vwlink -- read and control Volkswagen vehicles from the command line
#[derive(Debug, Parser)]
#[command(
    name = "vwlink",
    version,
    about = "Read and control Volkswagen vehicles from the command line",
    long_about = "Talks to the Volkswagen connected-car cloud on behalf of your account.\n\n\
        Lists vehicles, shows their state, watches them change, and sends\n\
        remote commands such as lock, climatisation or charging.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "VWLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "VWLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VWLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the vehicles on the account
    #[command(alias = "ls")]
    Vehicles,

    /// Fetch and show the current state of one vehicle
    #[command(alias = "st")]
    Status(VinArg),

    /// Keep synchronizing and print every change until interrupted
    Watch(WatchArgs),

    /// Lock the vehicle (needs the S-PIN)
    Lock(VinArg),

    /// Unlock the vehicle (needs the S-PIN)
    Unlock(VinArg),

    /// Start or stop climatisation
    #[command(alias = "climatisation")]
    Climate(ClimateArgs),

    /// Start or stop the window defrosters
    WindowHeating(WindowHeatingArgs),

    /// Start or stop charging
    Charging(ChargingArgs),

    /// Wake the vehicle so it reports fresh data
    Wake(VinArg),

    /// S-PIN operations
    Spin(SpinArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct VinArg {
    /// Vehicle identification number
    pub vin: String,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show this vehicle
    pub vin: Option<String>,

    /// Polling interval in seconds (overrides the profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

// ── Climate ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ClimateArgs {
    #[command(subcommand)]
    pub command: ClimateCommand,
}

#[derive(Debug, Subcommand)]
pub enum ClimateCommand {
    /// Start climatisation
    Start {
        /// Vehicle identification number
        vin: String,

        /// Target temperature in °C (15.5-30, rounded to 0.5)
        #[arg(long, short = 't')]
        temperature: Option<f64>,
    },

    /// Stop climatisation
    Stop {
        /// Vehicle identification number
        vin: String,
    },
}

// ── Window heating ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WindowHeatingArgs {
    #[command(subcommand)]
    pub command: WindowHeatingCommand,
}

#[derive(Debug, Subcommand)]
pub enum WindowHeatingCommand {
    /// Start heating the front and rear windows
    Start {
        /// Vehicle identification number
        vin: String,
    },

    /// Stop window heating
    Stop {
        /// Vehicle identification number
        vin: String,
    },
}

// ── Charging ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ChargingArgs {
    #[command(subcommand)]
    pub command: ChargingCommand,
}

#[derive(Debug, Subcommand)]
pub enum ChargingCommand {
    /// Start charging
    Start {
        /// Vehicle identification number
        vin: String,
    },

    /// Stop charging
    Stop {
        /// Vehicle identification number
        vin: String,
    },
}

// ── S-PIN ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SpinArgs {
    #[command(subcommand)]
    pub command: SpinCommand,
}

#[derive(Debug, Subcommand)]
pub enum SpinCommand {
    /// Check the configured S-PIN with the vendor
    Verify,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
