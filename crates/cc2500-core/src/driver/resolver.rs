//! Bus attachment
//!
//! Claims the configured chip-select slot for this driver: if nothing is
//! registered there, a new device is added with the driver name as its
//! modalias; if the slot is already taken by this driver, nothing happens;
//! if another driver owns it, the claim fails.

use std::sync::Arc;

use crate::bus::{device_name, SpiBus, SpiDeviceDescriptor, SpiMode};
use crate::config::DriverConfig;
use crate::error::AttachError;

/// Where to attach and with which electrical parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachParams {
    /// Bus number of the controller
    pub bus_num: u16,
    /// Chip select line
    pub chip_select: u8,
    /// Maximum clock speed in Hz
    pub max_speed_hz: u32,
    /// SPI mode word
    pub mode: SpiMode,
    /// Word size in bits
    pub bits_per_word: u8,
}

impl From<&DriverConfig> for AttachParams {
    fn from(config: &DriverConfig) -> Self {
        Self {
            bus_num: config.bus_num,
            chip_select: config.chip_select,
            max_speed_hz: config.max_speed_hz,
            mode: config.mode,
            bits_per_word: config.bits_per_word,
        }
    }
}

/// Claim the slot described by `params` for `driver_name`
///
/// The name comparison against an existing owner is a snapshot of the
/// registry at lookup time; the owner may change right after.
pub fn attach(
    bus: &dyn SpiBus,
    driver_name: &str,
    params: &AttachParams,
) -> Result<(), AttachError> {
    let Some(master) = bus.busnum_to_master(params.bus_num) else {
        log::error!("{}: no controller for spi bus {}", driver_name, params.bus_num);
        log::error!("{}: is the controller driver loaded?", driver_name);
        return Err(AttachError::ControllerNotFound {
            bus_num: params.bus_num,
        });
    };

    let mut spi = SpiDeviceDescriptor::new(Arc::clone(&master));
    spi.chip_select = params.chip_select;

    let name = device_name(&master, params.chip_select);
    // `master` is released when it goes out of scope, on every path below.

    if let Some(existing) = bus.find_device_by_name(&name) {
        drop(spi);

        return match existing.bound_driver() {
            Some(owner) if owner != driver_name => {
                log::error!("{}: driver [{}] already registered for {}", driver_name, owner, name);
                Err(AttachError::AddressConflict {
                    owner: owner.to_string(),
                    device: name,
                })
            }
            _ => {
                log::info!("{}: {} already registered, reusing it", driver_name, name);
                Ok(())
            }
        };
    }

    spi.max_speed_hz = params.max_speed_hz;
    spi.mode = params.mode;
    spi.bits_per_word = params.bits_per_word;
    spi.irq = None;
    spi.modalias = driver_name.to_string();

    match bus.add_device(spi) {
        Ok(()) => {
            log::info!(
                "{}: added {} ({} Hz, mode {}, {} bits)",
                driver_name,
                name,
                params.max_speed_hz,
                params.mode.clock_mode(),
                params.bits_per_word
            );
            Ok(())
        }
        Err(rejected) => {
            let error = rejected.error;
            drop(rejected.device);
            log::error!("{}: adding {} failed: {}", driver_name, name, error);
            Err(AttachError::RegistrationFailed {
                device: name,
                source: error,
            })
        }
    }
}
