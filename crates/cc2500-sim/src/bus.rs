//! In-memory SPI bus subsystem
//!
//! Keeps controllers, devices and drivers in maps and binds devices to
//! drivers by modalias, the way the kernel's SPI core does. Driver callbacks
//! always run with the internal lock released.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cc2500_core::bus::{
    device_name, BusDeviceEntry, BusError, Rejected, SpiBus, SpiController, SpiDevice,
    SpiDeviceDescriptor, SpiDriver,
};
use cc2500_core::Signal;

struct DeviceSlot {
    device: Arc<SpiDevice>,
    bound: Option<String>,
}

#[derive(Default)]
struct BusState {
    controllers: BTreeMap<u16, Arc<SpiController>>,
    devices: BTreeMap<String, DeviceSlot>,
    drivers: BTreeMap<String, Arc<dyn SpiDriver>>,
    fail_add_device: Option<i32>,
    fail_register_driver: Option<i32>,
}

/// Simulated SPI bus subsystem
#[derive(Default)]
pub struct SimSpiBus {
    state: Mutex<BusState>,
    signal: Signal,
}

impl SimSpiBus {
    /// Create a bus with no controllers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with controllers for the given bus numbers
    pub fn with_controllers(bus_nums: &[u16]) -> Self {
        let bus = Self::new();
        for &n in bus_nums {
            bus.add_controller(n);
        }
        bus
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a controller for `bus_num`
    pub fn add_controller(&self, bus_num: u16) -> Arc<SpiController> {
        let ctlr = Arc::new(SpiController::new(bus_num));
        self.state().controllers.insert(bus_num, Arc::clone(&ctlr));
        log::debug!("sim: added controller {}", ctlr.dev_name());
        ctlr
    }

    /// Drop the bus's reference on a controller
    ///
    /// Devices on it stay registered but lose their master once every other
    /// reference is gone.
    pub fn remove_controller(&self, bus_num: u16) {
        if self.state().controllers.remove(&bus_num).is_some() {
            log::debug!("sim: removed controller spi{}", bus_num);
        }
    }

    /// Number of strong references on a controller, including the bus's own
    pub fn controller_refs(&self, bus_num: u16) -> Option<usize> {
        self.state()
            .controllers
            .get(&bus_num)
            .map(Arc::strong_count)
    }

    /// Register a device at `bus_num.chip_select` already bound to `driver`
    ///
    /// Stands in for a slot claimed by some other driver, e.g. from board
    /// setup. Returns the canonical name, or `None` if the controller is
    /// missing or the slot is taken.
    pub fn claim_slot(&self, bus_num: u16, chip_select: u8, driver: &str) -> Option<String> {
        let mut state = self.state();
        let ctlr = Arc::clone(state.controllers.get(&bus_num)?);
        let name = device_name(&ctlr, chip_select);
        if state.devices.contains_key(&name) {
            return None;
        }

        let mut desc = SpiDeviceDescriptor::new(ctlr);
        desc.chip_select = chip_select;
        desc.modalias = driver.to_string();
        state.devices.insert(
            name.clone(),
            DeviceSlot {
                device: Arc::new(desc.into_device()),
                bound: Some(driver.to_string()),
            },
        );
        Some(name)
    }

    /// Canonical names of all registered devices
    pub fn device_names(&self) -> Vec<String> {
        self.state().devices.keys().cloned().collect()
    }

    /// Registered device, if any
    pub fn device(&self, name: &str) -> Option<Arc<SpiDevice>> {
        self.state()
            .devices
            .get(name)
            .map(|slot| Arc::clone(&slot.device))
    }

    /// Driver bound to the named device
    pub fn bound_driver(&self, name: &str) -> Option<String> {
        self.state()
            .devices
            .get(name)
            .and_then(|slot| slot.bound.clone())
    }

    /// Names of registered drivers
    pub fn driver_names(&self) -> Vec<String> {
        self.state().drivers.keys().cloned().collect()
    }

    /// Make every subsequent `add_device` fail with `code`
    pub fn fail_add_device(&self, code: i32) {
        self.state().fail_add_device = Some(code);
    }

    /// Make every subsequent `register_driver` fail with `code`
    pub fn fail_register_driver(&self, code: i32) {
        self.state().fail_register_driver = Some(code);
    }

    /// Signal passed to driver callbacks; raise it to interrupt them
    pub fn callback_signal(&self) -> &Signal {
        &self.signal
    }

    fn bind(&self, name: &str, device: Arc<SpiDevice>, driver: &Arc<dyn SpiDriver>) {
        match driver.probe(device, &self.signal) {
            Ok(()) => {
                if let Some(slot) = self.state().devices.get_mut(name) {
                    slot.bound = Some(driver.name().to_string());
                }
                log::debug!("sim: bound {} to {}", name, driver.name());
            }
            Err(e) => log::warn!("sim: probe of {} by {} failed: {}", name, driver.name(), e),
        }
    }

    fn unbind(&self, device: &Arc<SpiDevice>, driver: &Arc<dyn SpiDriver>) {
        if let Err(e) = driver.remove(device, &self.signal) {
            log::warn!("sim: remove of {} by {} failed: {}", device.name(), driver.name(), e);
        }
    }
}

impl SpiBus for SimSpiBus {
    fn busnum_to_master(&self, bus_num: u16) -> Option<Arc<SpiController>> {
        self.state().controllers.get(&bus_num).cloned()
    }

    fn find_device_by_name(&self, name: &str) -> Option<BusDeviceEntry> {
        self.state().devices.get(name).map(|slot| BusDeviceEntry {
            name: name.to_string(),
            driver: slot.bound.clone(),
        })
    }

    fn add_device(&self, device: SpiDeviceDescriptor) -> Result<(), Box<Rejected>> {
        let name = device.name();
        let mut state = self.state();

        if state.devices.contains_key(&name) {
            return Err(Box::new(Rejected {
                device,
                error: BusError::AlreadyExists(name),
            }));
        }
        if let Some(code) = state.fail_add_device {
            return Err(Box::new(Rejected {
                device,
                error: BusError::Rejected(code),
            }));
        }

        let device = Arc::new(device.into_device());
        let driver = state.drivers.get(device.modalias()).cloned();
        state.devices.insert(
            name.clone(),
            DeviceSlot {
                device: Arc::clone(&device),
                bound: None,
            },
        );
        drop(state);

        log::debug!("sim: added device {}", device);
        if let Some(driver) = driver {
            self.bind(&name, device, &driver);
        }
        Ok(())
    }

    fn unregister_device(&self, name: &str) {
        let Some(slot) = self.state().devices.remove(name) else {
            log::warn!("sim: unregister of unknown device {}", name);
            return;
        };

        let driver = slot
            .bound
            .as_ref()
            .and_then(|bound| self.state().drivers.get(bound).cloned());
        if let Some(driver) = driver {
            self.unbind(&slot.device, &driver);
        }
        log::debug!("sim: removed device {}", name);
    }

    fn register_driver(&self, driver: Arc<dyn SpiDriver>) -> Result<(), BusError> {
        let name = driver.name().to_string();
        let mut state = self.state();

        if state.drivers.contains_key(&name) {
            return Err(BusError::DriverExists(name));
        }
        if let Some(code) = state.fail_register_driver {
            return Err(BusError::Rejected(code));
        }

        state.drivers.insert(name.clone(), Arc::clone(&driver));
        let matching: Vec<(String, Arc<SpiDevice>)> = state
            .devices
            .iter()
            .filter(|(_, slot)| {
                slot.device.modalias() == name
                    && slot.bound.as_deref().map_or(true, |bound| bound == name)
            })
            .map(|(dev_name, slot)| (dev_name.clone(), Arc::clone(&slot.device)))
            .collect();
        drop(state);

        log::debug!("sim: registered driver {}", name);
        for (dev_name, device) in matching {
            self.bind(&dev_name, device, &driver);
        }
        Ok(())
    }

    fn unregister_driver(&self, name: &str) {
        let mut state = self.state();
        let Some(driver) = state.drivers.remove(name) else {
            log::warn!("sim: unregister of unknown driver {}", name);
            return;
        };

        let mut bound = Vec::new();
        for slot in state.devices.values_mut() {
            if slot.bound.as_deref() == Some(name) {
                slot.bound = None;
                bound.push(Arc::clone(&slot.device));
            }
        }
        drop(state);

        for device in &bound {
            self.unbind(device, &driver);
        }
        log::debug!("sim: unregistered driver {}", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts callbacks
    struct Probe {
        name: &'static str,
        probed: AtomicUsize,
        removed: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                probed: AtomicUsize::new(0),
                removed: AtomicUsize::new(0),
            })
        }
    }

    impl SpiDriver for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self, _spi: Arc<SpiDevice>, _signal: &Signal) -> cc2500_core::Result<()> {
            self.probed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn remove(&self, _spi: &Arc<SpiDevice>, _signal: &Signal) -> cc2500_core::Result<()> {
            self.removed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn descriptor(bus: &SimSpiBus, bus_num: u16, cs: u8, modalias: &str) -> SpiDeviceDescriptor {
        let mut desc = SpiDeviceDescriptor::new(bus.busnum_to_master(bus_num).unwrap());
        desc.chip_select = cs;
        desc.modalias = modalias.to_string();
        desc
    }

    #[test]
    fn test_add_device_binds_registered_driver() {
        let bus = SimSpiBus::with_controllers(&[1]);
        let drv = Probe::new("cc2500");
        bus.register_driver(drv.clone()).unwrap();

        bus.add_device(descriptor(&bus, 1, 1, "cc2500")).unwrap();
        assert_eq!(drv.probed.load(Ordering::SeqCst), 1);
        assert_eq!(bus.bound_driver("spi1.1").as_deref(), Some("cc2500"));

        bus.unregister_device("spi1.1");
        assert_eq!(drv.removed.load(Ordering::SeqCst), 1);
        assert!(bus.device_names().is_empty());
    }

    #[test]
    fn test_register_driver_binds_existing_device() {
        let bus = SimSpiBus::with_controllers(&[1]);
        bus.add_device(descriptor(&bus, 1, 1, "cc2500")).unwrap();
        assert_eq!(bus.bound_driver("spi1.1"), None);

        let drv = Probe::new("cc2500");
        bus.register_driver(drv.clone()).unwrap();
        assert_eq!(drv.probed.load(Ordering::SeqCst), 1);

        bus.unregister_driver("cc2500");
        assert_eq!(drv.removed.load(Ordering::SeqCst), 1);
        assert_eq!(bus.bound_driver("spi1.1"), None);
        assert_eq!(bus.device_names(), vec!["spi1.1".to_string()]);
    }

    #[test]
    fn test_duplicate_device_is_rejected() {
        let bus = SimSpiBus::with_controllers(&[0]);
        bus.add_device(descriptor(&bus, 0, 0, "a")).unwrap();
        let rejected = bus.add_device(descriptor(&bus, 0, 0, "b")).unwrap_err();
        assert_eq!(rejected.error, BusError::AlreadyExists("spi0.0".into()));
        assert_eq!(rejected.device.modalias, "b");
    }

    #[test]
    fn test_claimed_slot_reports_owner() {
        let bus = SimSpiBus::with_controllers(&[1]);
        assert_eq!(bus.claim_slot(1, 1, "spidev").as_deref(), Some("spi1.1"));
        assert_eq!(bus.claim_slot(1, 1, "other"), None);
        assert_eq!(bus.claim_slot(2, 0, "spidev"), None);

        let entry = bus.find_device_by_name("spi1.1").unwrap();
        assert_eq!(entry.bound_driver(), Some("spidev"));
    }

    #[test]
    fn test_controller_refs_track_devices() {
        let bus = SimSpiBus::with_controllers(&[1]);
        assert_eq!(bus.controller_refs(1), Some(1));
        // Devices hold only weak references once registered
        bus.add_device(descriptor(&bus, 1, 1, "cc2500")).unwrap();
        assert_eq!(bus.controller_refs(1), Some(1));

        let dev = bus.device("spi1.1").unwrap();
        assert!(dev.master().is_some());
        bus.remove_controller(1);
        assert!(dev.master().is_none());
        assert_eq!(bus.controller_refs(1), None);
    }
}
