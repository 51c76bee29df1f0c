//! cc2500 - SPI driver for the cc2500 radio transceiver
//!
//! The driver core lives in `cc2500-core`. This binary loads it against the
//! simulated bus and device-node subsystems from `cc2500-sim`, which is
//! enough to watch the attach protocol, the status node and teardown work
//! end to end.

mod cli;
mod commands;

use cc2500_core::bus::SpiMode;
use cc2500_core::DriverConfig;
use clap::Parser;
use cli::{Cli, Commands, DriverArgs};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = load_config(cli.config.as_deref(), &cli.driver)?;

    match cli.command {
        Commands::Status {
            controllers,
            occupied_by,
            reads,
            count,
        } => commands::status::run_status(
            config,
            &commands::status::StatusArgs {
                controllers,
                occupied_by,
                reads,
                count,
            },
        ),
        Commands::Config => {
            commands::config::print_config(&config);
            Ok(())
        }
    }
}

/// Load the configuration file (if any) and apply command line overrides
fn load_config(
    path: Option<&Path>,
    args: &DriverArgs,
) -> Result<DriverConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => {
            let config = DriverConfig::from_toml_file(path)?;
            log::info!("Loaded configuration from {:?}", path);
            config
        }
        None => DriverConfig::default(),
    };

    if let Some(bus) = args.bus {
        config.bus_num = bus;
    }
    if let Some(cs) = args.chip_select {
        config.chip_select = cs;
    }
    if let Some(speed) = args.speed {
        config.max_speed_hz = speed;
    }
    if let Some(mode) = args.mode {
        config.mode = SpiMode::from_clock_mode(mode)
            .ok_or_else(|| format!("Invalid SPI mode: {} (must be 0-3)", mode))?;
    }

    config.validate()?;
    Ok(config)
}
