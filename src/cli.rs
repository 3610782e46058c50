use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nvfand: GPU fan control daemon for NVIDIA boards
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML settings file (default: /etc/nvfand/settings.yml)
    #[arg(short = 's', long = "settings", global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the reconciliation loop until SIGTERM or SIGINT
    Daemon {
        /// Detach from the terminal
        #[arg(short = 'd', long = "daemonize", default_value = "false")]
        daemonize: bool,
    },

    /// Pin fans at a fixed speed
    Set {
        /// Speed in percent (30-100)
        #[arg(value_parser = clap::value_parser!(u32).range(30..=100))]
        speed: u32,

        /// Only this GPU (default: all)
        #[arg(short = 'g', long = "gpu")]
        gpu: Option<u32>,
    },

    /// Return every GPU to driver-controlled fans
    Auto,

    /// Fan curve management
    Curve {
        #[command(subcommand)]
        action: CurveAction,
    },

    /// List detected GPUs
    List,

    /// Show temperature, telemetry and mode of every GPU
    Status,

    /// Interactive dashboard
    Console,
}

impl Command {
    /// Only the daemon logs to syslog; other commands report on the terminal.
    pub fn logs_to_syslog(&self) -> bool {
        matches!(self, Command::Daemon { .. })
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CurveAction {
    /// Put every GPU in curve mode
    Enable,

    /// Add or replace one curve point
    Set {
        /// Temperature in °C (0-100)
        #[arg(value_parser = clap::value_parser!(i32).range(0..=100))]
        temp: i32,

        /// Fan speed in percent (0-100)
        #[arg(value_parser = clap::value_parser!(i32).range(0..=100))]
        speed: i32,
    },

    /// Print the stored curve
    Show,

    /// Replace the stored curve with the preset
    Reset,

    /// Edit the curve interactively
    Edit,
}
