//! CLI argument parsing

use cc2500_core::config::{parse_number, parse_speed};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u16
fn parse_u16(s: &str) -> Result<u16, String> {
    let n = parse_number(s)?;
    u16::try_from(n).map_err(|_| format!("value out of range: {}", s))
}

/// Parse a string as a hex or decimal u8
fn parse_u8(s: &str) -> Result<u8, String> {
    let n = parse_number(s)?;
    u8::try_from(n).map_err(|_| format!("value out of range: {}", s))
}

#[derive(Parser)]
#[command(name = "cc2500")]
#[command(author, version, about = "cc2500 radio transceiver SPI driver", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Driver configuration file (TOML format)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub driver: DriverArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the configuration file values
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DriverArgs {
    /// SPI bus number of the controller
    #[arg(long, global = true, value_parser = parse_u16)]
    pub bus: Option<u16>,

    /// Chip select line
    #[arg(long, global = true, value_parser = parse_u8)]
    pub chip_select: Option<u8>,

    /// Maximum clock speed (e.g. 1000000, "500 kHz", "4MHz")
    #[arg(long, global = true, value_parser = parse_speed)]
    pub speed: Option<u32>,

    /// SPI clock mode (0-3)
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub mode: Option<u8>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the driver on a simulated bus, read the status node, unload
    Status {
        /// Bus numbers with a registered controller (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "1", value_parser = parse_u16)]
        controllers: Vec<u16>,

        /// Pre-register the target slot as owned by this driver name
        #[arg(long)]
        occupied_by: Option<String>,

        /// Number of reads from the same open file
        #[arg(long, default_value = "2")]
        reads: u32,

        /// Bytes requested per read
        #[arg(long, default_value = "1024")]
        count: usize,
    },

    /// Print the effective driver configuration
    Config,
}
