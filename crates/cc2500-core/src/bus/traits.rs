//! SPI bus trait definitions

use std::sync::Arc;

use super::types::{BusError, SpiController, SpiDevice, SpiDeviceDescriptor};
use crate::error::Result;
use crate::sync::Signal;

/// A registry entry found by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusDeviceEntry {
    /// Canonical device name
    pub name: String,
    /// Name of the driver bound to the device, if any
    pub driver: Option<String>,
}

impl BusDeviceEntry {
    /// The bound driver name, treating an empty name as no driver
    pub fn bound_driver(&self) -> Option<&str> {
        self.driver.as_deref().filter(|name| !name.is_empty())
    }
}

/// A descriptor the bus refused to register
///
/// The descriptor comes back to the caller, who is responsible for
/// releasing it.
#[derive(Debug)]
pub struct Rejected {
    /// The descriptor that was not registered
    pub device: SpiDeviceDescriptor,
    /// Why the bus refused it
    pub error: BusError,
}

/// Callbacks the bus invokes on a registered driver
///
/// `probe` and `remove` may run on any thread, concurrently with each other
/// and with file operations on the driver.
pub trait SpiDriver: Send + Sync {
    /// Name devices are matched against (their `modalias`)
    fn name(&self) -> &str;

    /// A device matching this driver was bound
    fn probe(&self, spi: Arc<SpiDevice>, signal: &Signal) -> Result<()>;

    /// A bound device is being unbound
    fn remove(&self, spi: &Arc<SpiDevice>, signal: &Signal) -> Result<()>;
}

/// The SPI bus subsystem
///
/// Implementations own controllers, devices and driver bindings. Adding a
/// device whose `modalias` names a registered driver binds it (calls
/// `probe`); registering a driver binds every unbound device naming it;
/// unregistering either side unbinds (calls `remove`). Implementations must
/// not hold internal locks while invoking driver callbacks.
pub trait SpiBus: Send + Sync {
    /// Look up a controller by bus number, taking a reference on it
    fn busnum_to_master(&self, bus_num: u16) -> Option<Arc<SpiController>>;

    /// Look up a registered device by canonical name
    fn find_device_by_name(&self, name: &str) -> Option<BusDeviceEntry>;

    /// Register a device, binding it to a matching driver
    fn add_device(&self, device: SpiDeviceDescriptor)
        -> std::result::Result<(), Box<Rejected>>;

    /// Unregister a device by canonical name, unbinding it first
    fn unregister_device(&self, name: &str);

    /// Register a driver and bind it to matching devices
    fn register_driver(&self, driver: Arc<dyn SpiDriver>) -> std::result::Result<(), BusError>;

    /// Unregister a driver, unbinding it from all its devices
    fn unregister_driver(&self, name: &str);
}
