//! Status command implementation
//!
//! Builds a simulated bus with the requested controllers, loads the driver,
//! reads the status node through the same path an open(2)/read(2) would take
//! and unloads again.

use std::error::Error;
use std::sync::Arc;

use cc2500_core::bus::SpiBus;
use cc2500_core::node::CharDevRegistry;
use cc2500_core::{Cc2500Module, DriverConfig, Signal};
use cc2500_sim::{SimNodes, SimSpiBus};

/// Options for [`run_status`]
#[derive(Debug, Clone)]
pub struct StatusArgs {
    /// Bus numbers that get a controller
    pub controllers: Vec<u16>,
    /// Driver already owning the target slot
    pub occupied_by: Option<String>,
    /// Number of reads from one open file
    pub reads: u32,
    /// Bytes requested per read
    pub count: usize,
}

/// Load, read and unload the driver
pub fn run_status(config: DriverConfig, args: &StatusArgs) -> Result<(), Box<dyn Error>> {
    let bus = Arc::new(SimSpiBus::with_controllers(&args.controllers));
    let nodes = Arc::new(SimNodes::new());

    if let Some(owner) = &args.occupied_by {
        match bus.claim_slot(config.bus_num, config.chip_select, owner) {
            Some(name) => log::info!("Slot {} pre-claimed by {}", name, owner),
            None => log::warn!(
                "Could not pre-claim SPI{}.{} for {}",
                config.bus_num,
                config.chip_select,
                owner
            ),
        }
    }

    let node_name = config.name.clone();
    let module = Cc2500Module::load(
        config,
        Arc::clone(&bus) as Arc<dyn SpiBus>,
        Arc::clone(&nodes) as Arc<dyn CharDevRegistry>,
    )?;
    println!("Loaded /dev/{} ({})", node_name, module.devt());

    let fops = nodes
        .lookup(&node_name)
        .ok_or_else(|| format!("device node /dev/{} not found", node_name))?;
    let signal = Signal::new();
    let mut file = fops.open(&signal)?;

    for i in 1..=args.reads {
        let mut out = Vec::new();
        let n = file.read(Some(&mut out), args.count, &signal)?;
        if n == 0 {
            println!("read {}: end of file", i);
        } else {
            print!("read {}: {}", i, String::from_utf8_lossy(&out));
            if !out.ends_with(b"\n") {
                println!();
            }
        }
    }
    drop(file);

    module.unload();
    println!("Unloaded {}", node_name);
    Ok(())
}
