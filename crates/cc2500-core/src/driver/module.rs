//! Module load and unload
//!
//! Load order: device number range and cdev, then class and device node,
//! then the SPI driver, then the bus slot claim. A failing step undoes the
//! steps before it in reverse order, so a failed load leaves nothing behind.
//! Unload is the mirror image and never fails.

use std::sync::Arc;

use super::device::Cc2500;
use super::fops::OpenFile;
use super::resolver::{attach, AttachParams};
use crate::bus::{SpiBus, SpiDriver};
use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::node::{CharDevRegistry, ClassId, DevT, FileOperations};
use crate::sync::Signal;

/// A loaded cc2500 driver
///
/// Dropping the module unloads it.
pub struct Cc2500Module {
    config: DriverConfig,
    device: Arc<Cc2500>,
    bus: Arc<dyn SpiBus>,
    nodes: Arc<dyn CharDevRegistry>,
    devt: DevT,
    class: ClassId,
}

impl Cc2500Module {
    /// Load the driver against the given bus and device-node subsystems
    pub fn load(
        config: DriverConfig,
        bus: Arc<dyn SpiBus>,
        nodes: Arc<dyn CharDevRegistry>,
    ) -> Result<Self> {
        if let Err(e) = config.validate() {
            log::error!("{}: {}", config.name, e);
            return Err(Error::InvalidArgument);
        }

        let device = Arc::new(Cc2500::new(&config));

        let devt = init_cdev(nodes.as_ref(), &device)?;

        let class = match init_class(nodes.as_ref(), devt, device.name()) {
            Ok(class) => class,
            Err(e) => {
                teardown_cdev(nodes.as_ref(), devt);
                return Err(e);
            }
        };

        if let Err(e) = init_spi(bus.as_ref(), &device, &config) {
            teardown_class(nodes.as_ref(), class, devt);
            teardown_cdev(nodes.as_ref(), devt);
            return Err(e);
        }

        log::info!(
            "{}: loaded, node {} on spi{}.{}",
            config.name,
            devt,
            config.bus_num,
            config.chip_select
        );

        Ok(Self {
            config,
            device,
            bus,
            nodes,
            devt,
            class,
        })
    }

    /// Unload the driver
    pub fn unload(self) {
        drop(self);
    }

    /// The driver instance
    pub fn device(&self) -> &Arc<Cc2500> {
        &self.device
    }

    /// Effective configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Device number of the status node
    pub fn devt(&self) -> DevT {
        self.devt
    }

    /// Open the status node directly
    pub fn open(&self, signal: &Signal) -> Result<OpenFile> {
        Arc::clone(&self.device).open(signal)
    }
}

impl Drop for Cc2500Module {
    fn drop(&mut self) {
        let name = self.device.name().to_string();

        // Unbinding runs remove(), which takes the handle lock; it must not
        // be held here.
        match self.device.bound_device(&Signal::new()) {
            Ok(Some(spi)) => self.bus.unregister_device(&spi),
            Ok(None) => log::debug!("{}: no device bound at unload", name),
            Err(e) => log::warn!("{}: cannot inspect bound device: {}", name, e),
        }

        self.bus.unregister_driver(&name);
        teardown_class(self.nodes.as_ref(), self.class, self.devt);
        teardown_cdev(self.nodes.as_ref(), self.devt);

        if self.device.release_buffer() {
            log::debug!("{}: status buffer freed", name);
        }

        log::info!("{}: unloaded", name);
    }
}

impl std::fmt::Debug for Cc2500Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cc2500Module")
            .field("config", &self.config)
            .field("devt", &self.devt)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

fn init_cdev(nodes: &dyn CharDevRegistry, device: &Arc<Cc2500>) -> Result<DevT> {
    let name = device.name();

    let devt = nodes.alloc_chrdev_region(1, name).map_err(|e| {
        log::error!("{}: alloc_chrdev_region failed: {}", name, e);
        Error::DeviceNode(e)
    })?;

    let fops: Arc<dyn FileOperations> = Arc::clone(device) as Arc<dyn FileOperations>;
    if let Err(e) = nodes.cdev_add(devt, fops) {
        log::error!("{}: cdev_add failed: {}", name, e);
        nodes.unregister_chrdev_region(devt, 1);
        return Err(Error::DeviceNode(e));
    }

    Ok(devt)
}

fn teardown_cdev(nodes: &dyn CharDevRegistry, devt: DevT) {
    nodes.cdev_del(devt);
    nodes.unregister_chrdev_region(devt, 1);
}

fn init_class(nodes: &dyn CharDevRegistry, devt: DevT, name: &str) -> Result<ClassId> {
    let class = nodes.class_create(name).map_err(|e| {
        log::error!("{}: class_create failed: {}", name, e);
        Error::DeviceNode(e)
    })?;

    if let Err(e) = nodes.device_create(class, devt, name) {
        log::error!("{}: device_create({}) failed: {}", name, name, e);
        nodes.class_destroy(class);
        return Err(Error::DeviceNode(e));
    }

    Ok(class)
}

fn teardown_class(nodes: &dyn CharDevRegistry, class: ClassId, devt: DevT) {
    nodes.device_destroy(class, devt);
    nodes.class_destroy(class);
}

fn init_spi(bus: &dyn SpiBus, device: &Arc<Cc2500>, config: &DriverConfig) -> Result<()> {
    let name = device.name();

    let driver: Arc<dyn SpiDriver> = Arc::clone(device) as Arc<dyn SpiDriver>;
    bus.register_driver(driver).map_err(|e| {
        log::error!("{}: spi driver registration failed: {}", name, e);
        Error::DriverRegistration(e)
    })?;

    if let Err(e) = attach(bus, name, &AttachParams::from(config)) {
        log::error!("{}: attaching to the bus failed", name);
        bus.unregister_driver(name);
        return Err(e.into());
    }

    Ok(())
}
